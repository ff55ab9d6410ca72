// THEORY:
// All tunable behaviour lives in plain configuration structs, one per stage,
// each with a `Default` that reproduces the empirically tuned constants the
// dataset generator has always used. `SynthConfig` aggregates them so a whole
// run can be described by one JSON document; every field is optional in that
// document thanks to `#[serde(default)]`.

use crate::error::{SynthError, SynthResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Threshold sweep bounds for the gradient-based sky detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyDetectorConfig {
    pub min_gradient_threshold: i64,
    pub max_gradient_threshold: i64,
    /// Nominal spacing; only used to derive the number of sweep steps.
    pub step: i64,
    /// Evaluate thresholds on the rayon pool instead of sequentially.
    pub parallel: bool,
}

impl Default for SkyDetectorConfig {
    fn default() -> Self {
        Self {
            min_gradient_threshold: 5,
            max_gradient_threshold: 600,
            step: 5,
            parallel: true,
        }
    }
}

impl SkyDetectorConfig {
    pub fn validate(&self) -> SynthResult<()> {
        if self.step <= 0 {
            return Err(SynthError::invalid_parameter(format!(
                "sweep step must be positive, got {}",
                self.step
            )));
        }
        if self.max_gradient_threshold < self.min_gradient_threshold {
            return Err(SynthError::invalid_parameter(format!(
                "max gradient threshold {} is below min {}",
                self.max_gradient_threshold, self.min_gradient_threshold
            )));
        }
        Ok(())
    }
}

/// Parameters for the depth-estimation sky detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthSkyConfig {
    /// Raw network output is scaled by `255 / scale_divisor`.
    pub scale_divisor: f32,
    /// Scaled depth values inside `[min_threshold, max_threshold]` are ground.
    pub min_threshold: i32,
    pub max_threshold: i32,
    /// Drop every sky component except the largest one.
    pub keep_largest_component: bool,
}

impl Default for DepthSkyConfig {
    fn default() -> Self {
        Self {
            scale_divisor: 40.0,
            min_threshold: 60,
            max_threshold: 170,
            keep_largest_component: true,
        }
    }
}

/// Iterative solver settings for gradient-domain cloning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoissonConfig {
    pub max_iterations: usize,
    /// Stop once the largest per-sweep update falls below this (in 0..255 units).
    pub tolerance: f32,
    /// Successive over-relaxation factor, in (0, 2).
    pub relaxation: f32,
}

impl Default for PoissonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 0.01,
            relaxation: 1.9,
        }
    }
}

/// Parameters for building one set (one smoke source over one background source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetConfig {
    /// Horizontal resize factor applied to smoke frames.
    pub fx: f64,
    /// Vertical resize factor applied to smoke frames.
    pub fy: f64,
    pub opacity: f64,
    /// Keep every `smoke_speed`-th smoke frame.
    pub smoke_speed: usize,
    /// Number of leading smoke frames to drop.
    pub smoke_offset: usize,
    pub train: bool,
    pub save_mask: bool,
    pub save_bbox: bool,
    pub size_max_bg: u32,
    pub size_max_smoke: u32,
    /// Intensity above which a smoke pixel counts as smoke.
    pub brightness_threshold: f64,
    pub placement_attempts: usize,
}

impl Default for SetConfig {
    fn default() -> Self {
        Self {
            fx: 0.3,
            fy: 0.2,
            opacity: 0.8,
            smoke_speed: 5,
            smoke_offset: 20,
            train: true,
            save_mask: false,
            save_bbox: false,
            size_max_bg: 1280,
            size_max_smoke: 1280,
            brightness_threshold: 50.0,
            placement_attempts: 32,
        }
    }
}

impl SetConfig {
    pub fn validate(&self) -> SynthResult<()> {
        if !(self.fx > 0.0 && self.fy > 0.0) {
            return Err(SynthError::invalid_parameter(format!(
                "resize factors must be positive, got fx={} fy={}",
                self.fx, self.fy
            )));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(SynthError::invalid_parameter(format!(
                "opacity must lie in [0, 1], got {}",
                self.opacity
            )));
        }
        if self.smoke_speed == 0 {
            return Err(SynthError::invalid_parameter("smoke_speed must be at least 1"));
        }
        if self.size_max_bg == 0 || self.size_max_smoke == 0 {
            return Err(SynthError::invalid_parameter("maximum frame size must be positive"));
        }
        Ok(())
    }
}

/// Which sky detector a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkyDetectorKind {
    #[default]
    Gradient,
    Depth,
}

/// Top-level configuration for a dataset generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub detector: SkyDetectorKind,
    pub sky: SkyDetectorConfig,
    pub depth: DepthSkyConfig,
    pub poisson: PoissonConfig,
    pub set: SetConfig,
    /// Number of sets built concurrently.
    pub workers: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            detector: SkyDetectorKind::default(),
            sky: SkyDetectorConfig::default(),
            depth: DepthSkyConfig::default(),
            poisson: PoissonConfig::default(),
            set: SetConfig::default(),
            workers: num_cpus::get(),
        }
    }
}

impl SynthConfig {
    pub fn from_json_str(json: &str) -> SynthResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> SynthResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> SynthResult<()> {
        self.sky.validate()?;
        self.set.validate()?;
        if self.workers == 0 {
            return Err(SynthError::invalid_parameter("workers must be at least 1"));
        }
        if !(self.poisson.relaxation > 0.0 && self.poisson.relaxation < 2.0) {
            return Err(SynthError::invalid_parameter(format!(
                "relaxation must lie in (0, 2), got {}",
                self.poisson.relaxation
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_constants() {
        let config = SynthConfig::default();
        assert_eq!(config.sky.min_gradient_threshold, 5);
        assert_eq!(config.sky.max_gradient_threshold, 600);
        assert_eq!(config.sky.step, 5);
        assert_eq!(config.depth.min_threshold, 60);
        assert_eq!(config.depth.max_threshold, 170);
        assert_eq!(config.set.brightness_threshold, 50.0);
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = SynthConfig::from_json_str(
            r#"{ "detector": "depth", "set": { "opacity": 0.5 }, "workers": 2 }"#,
        )
        .expect("valid config");
        assert_eq!(config.detector, SkyDetectorKind::Depth);
        assert_eq!(config.set.opacity, 0.5);
        assert_eq!(config.set.smoke_speed, 5);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(SynthConfig::from_json_str(r#"{ "set": { "opacity": 1.5 } }"#).is_err());
        assert!(SynthConfig::from_json_str(r#"{ "sky": { "step": 0 } }"#).is_err());
        assert!(
            SynthConfig::from_json_str(
                r#"{ "sky": { "min_gradient_threshold": 10, "max_gradient_threshold": 5 } }"#
            )
            .is_err()
        );
        assert!(matches!(
            SynthConfig::from_json_str("{ not json"),
            Err(SynthError::Config(_))
        ));
    }
}
