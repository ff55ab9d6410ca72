// THEORY:
// The `sky_detector` module decides where the sky is. Smoke composited into the
// sky looks fake, so every placement downstream is bounded by the mask this
// module produces.
//
// The classical detector runs an energy-maximizing threshold sweep:
// 1.  Compute the gradient map of the frame once.
// 2.  Build an explicit list of thresholds. With N = (max - min) / step + 1
//     steps, threshold k (1-based) is
//       min + floor((max - min) / N - 1) * (k - 1)
//     For the defaults (5, 600, 5) that is 5, 8, 11, ..., 362: the sweep does
//     not span the nominal range, and that is the tuned behaviour.
// 3.  Map every threshold to (boundary -> energy score). Each evaluation is a
//     pure function of (gradient map, threshold), so the map runs on the rayon
//     pool when `parallel` is set.
// 4.  Reduce to the strictly greatest score, ties going to the lowest index.
//     The reducer is associative and order-independent, so parallel and
//     sequential sweeps select the same boundary. A winner whose score is not
//     strictly positive is rejected: no threshold separated the frame.
// 5.  Fill the winning boundary into a `SkyMask`.
//
// Alternative detectors (see `depth_sky`) plug in behind the same `SkyDetector`
// trait and are chosen by configuration.

use crate::config::SkyDetectorConfig;
use crate::core_modules::boundary::{Boundary, SkyMask, boundary_extractor};
use crate::core_modules::frame::{Frame, validate_frame};
use crate::core_modules::gradient::{GradientField, GradientMap};
use crate::core_modules::region_stats::{EnergyScore, energy_scorer};
use crate::error::{SynthError, SynthResult};
use rayon::prelude::*;
use std::cmp::Ordering;
use tracing::debug;

/// Anything that can split a frame into sky and non-sky.
pub trait SkyDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> SynthResult<SkyMask>;
}

/// One evaluated point of the sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepCandidate {
    /// 0-based position in the threshold list.
    pub index: usize,
    pub threshold: f64,
    pub score: EnergyScore,
}

/// Picks the better of two candidates: higher score, then lower index.
fn better(a: SweepCandidate, b: SweepCandidate) -> SweepCandidate {
    match a.score.total_cmp(b.score) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal => {
            if a.index <= b.index { a } else { b }
        }
    }
}

/// Accepts the sweep winner only when its score is strictly positive.
fn accept(winner: Option<SweepCandidate>) -> SynthResult<SweepCandidate> {
    winner
        .filter(|c| !c.score.is_degenerate() && c.score.value() > 0.0)
        .ok_or(SynthError::NoBoundaryFound)
}

/// The thresholds a sweep evaluates, in ascending `k`.
pub fn threshold_schedule(config: &SkyDetectorConfig) -> SynthResult<Vec<f64>> {
    config.validate()?;
    let span = config.max_gradient_threshold - config.min_gradient_threshold;
    let steps = span / config.step + 1;
    let increment = span.div_euclid(steps) - 1;
    Ok((1..=steps)
        .map(|k| (config.min_gradient_threshold + increment * (k - 1)) as f64)
        .collect())
}

/// Gradient-sweep sky detector.
#[derive(Debug, Clone, Default)]
pub struct GradientSkyDetector {
    config: SkyDetectorConfig,
}

impl GradientSkyDetector {
    pub fn new(config: SkyDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SkyDetectorConfig {
        &self.config
    }

    fn evaluate(frame: &Frame, gradient: &GradientMap, index: usize, threshold: f64) -> SweepCandidate {
        let boundary = boundary_extractor::extract(gradient, threshold);
        SweepCandidate {
            index,
            threshold,
            score: energy_scorer::score_boundary(frame, &boundary),
        }
    }

    /// Evaluates every threshold and returns the winning candidate, or `None`
    /// when the schedule is empty.
    pub fn sweep(&self, frame: &Frame, gradient: &GradientMap) -> SynthResult<Option<SweepCandidate>> {
        let thresholds = threshold_schedule(&self.config)?;
        let winner = if self.config.parallel {
            thresholds
                .par_iter()
                .enumerate()
                .map(|(i, &t)| Self::evaluate(frame, gradient, i, t))
                .reduce_with(better)
        } else {
            thresholds
                .iter()
                .enumerate()
                .map(|(i, &t)| Self::evaluate(frame, gradient, i, t))
                .reduce(better)
        };
        Ok(winner)
    }

    /// The boundary with the greatest energy over the sweep.
    pub fn optimal_boundary(&self, frame: &Frame) -> SynthResult<Boundary> {
        validate_frame(frame)?;
        if frame.width() <= 1 || frame.height() <= 1 {
            return Err(SynthError::invalid_image(format!(
                "frame too small for sky detection ({}x{})",
                frame.width(),
                frame.height()
            )));
        }

        let gradient = GradientField::compute(frame)?;
        let winner = accept(self.sweep(frame, &gradient)?)?;

        debug!(
            threshold = winner.threshold,
            index = winner.index,
            score = winner.score.value(),
            "sky sweep selected boundary"
        );
        Ok(boundary_extractor::extract(&gradient, winner.threshold))
    }
}

impl SkyDetector for GradientSkyDetector {
    fn detect(&self, frame: &Frame) -> SynthResult<SkyMask> {
        Ok(self.optimal_boundary(frame)?.to_sky_mask())
    }
}
