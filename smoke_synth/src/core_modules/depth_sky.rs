// THEORY:
// The `depth_sky` module is the learned alternative to the gradient sweep. A
// monocular depth network (external, behind the `DepthEstimator` trait) says
// how far every pixel is; the sky is whatever falls outside a band of
// plausible ground depths.
//
// Steps:
// 1.  Ask the estimator for a raw per-pixel prediction.
// 2.  Scale it by 255 / `scale_divisor` and truncate to an integer level, so the
//     band thresholds live on a 0..255-like scale.
// 3.  Pixels with a level inside [min_threshold, max_threshold] are ground;
//     everything else (far away, or implausibly close) is sky.
// 4.  Optionally keep only the largest 4-connected sky component. Burned-in
//     text, logos and overlays produce small isolated "sky" islands; the real
//     sky is one large region.
// 5.  Collapse to a boundary (first ground row per column) and fill it, so the
//     result obeys the same column-monotonic contract as the gradient detector.

use crate::config::DepthSkyConfig;
use crate::core_modules::boundary::{Boundary, SkyMask};
use crate::core_modules::filter::Plane;
use crate::core_modules::frame::{Frame, validate_frame};
use crate::core_modules::mask::Mask;
use crate::core_modules::sky_detector::SkyDetector;
use crate::error::{SynthError, SynthResult};
use tracing::debug;

/// External per-pixel depth predictor (a pretrained network in practice).
pub trait DepthEstimator: Send + Sync {
    /// Raw prediction, one value per pixel, same dimensions as `frame`.
    fn estimate(&self, frame: &Frame) -> SynthResult<Plane>;
}

/// Sky detector driven by a depth estimate.
pub struct DepthSkyDetector<E: DepthEstimator> {
    estimator: E,
    config: DepthSkyConfig,
}

impl<E: DepthEstimator> DepthSkyDetector<E> {
    pub fn new(estimator: E, config: DepthSkyConfig) -> Self {
        Self { estimator, config }
    }

    /// Raw sky classification, before component filtering and boundary collapse.
    pub fn classify(&self, depth: &Plane) -> Mask {
        let scale = 255.0 / self.config.scale_divisor;
        Mask::from_fn(depth.width() as u32, depth.height() as u32, |x, y| {
            let level = (depth.get(x as usize, y as usize) * scale as f64) as i64;
            level < self.config.min_threshold as i64 || level > self.config.max_threshold as i64
        })
    }
}

impl<E: DepthEstimator> SkyDetector for DepthSkyDetector<E> {
    fn detect(&self, frame: &Frame) -> SynthResult<SkyMask> {
        validate_frame(frame)?;
        let depth = self.estimator.estimate(frame)?;
        if depth.width() != frame.width() as usize || depth.height() != frame.height() as usize {
            return Err(SynthError::DepthEstimation(format!(
                "estimator returned {}x{} for a {}x{} frame",
                depth.width(),
                depth.height(),
                frame.width(),
                frame.height()
            )));
        }

        let mut sky = self.classify(&depth);
        if self.config.keep_largest_component {
            sky = keep_largest_component(&sky);
        }
        Ok(boundary_from_mask(&sky).to_sky_mask())
    }
}

/// Clears every true cell outside the largest 4-connected true component.
pub fn keep_largest_component(mask: &Mask) -> Mask {
    let (w, h) = (mask.width(), mask.height());
    let mut visited = Mask::new(w, h);
    let mut largest: Vec<(u32, u32)> = Vec::new();
    let mut components = 0usize;

    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y) || visited.get(x, y) {
                continue;
            }
            components += 1;

            // Depth-first flood fill from this seed.
            let mut region = Vec::new();
            let mut stack = vec![(x, y)];
            visited.set(x, y, true);
            while let Some((cx, cy)) = stack.pop() {
                region.push((cx, cy));
                for (dx, dy) in [(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
                    let nx = cx as i64 + dx;
                    let ny = cy as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    if mask.get(nx, ny) && !visited.get(nx, ny) {
                        visited.set(nx, ny, true);
                        stack.push((nx, ny));
                    }
                }
            }
            if region.len() > largest.len() {
                largest = region;
            }
        }
    }

    if components > 1 {
        debug!(components, kept = largest.len(), "dropped small sky components");
    }
    let mut kept = Mask::new(w, h);
    for (x, y) in largest {
        kept.set(x, y, true);
    }
    kept
}

/// Per column, the first non-sky row (the height when the column is all sky).
pub fn boundary_from_mask(sky: &Mask) -> Boundary {
    let rows = (0..sky.width())
        .map(|x| (0..sky.height()).find(|&y| !sky.get(x, y)).unwrap_or(sky.height()))
        .collect();
    Boundary::new(rows, sky.height())
}
