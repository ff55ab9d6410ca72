// THEORY:
// The `compositor` module writes a smoke patch into a background frame. Two
// strategies sit behind one `Compositor` trait and are run side by side for
// every frame pair, so a dataset carries both looks for the same placement.
//
// Key principles:
// 1.  **Footprint in background coordinates**: whatever the strategy, the
//     returned `OccupancyMask` is sized to the background and true only where
//     smoke was written. The label writer never sees patch-local coordinates.
// 2.  **Flat alpha**: the patch is softened with a 7x7 box filter; its
//     smoothed luma drives both the footprint (luma > threshold) and a
//     per-pixel alpha `1 - opacity * luma / max_luma`. Dark areas of the patch
//     leave the background visible, bright areas replace it.
// 3.  **Seamless cloning**: inside the thresholded (unsmoothed) footprint the
//     output solves a discrete Poisson equation, matching the patch's
//     gradients while taking its boundary values from the background. The
//     solver is successive over-relaxation on the 4-neighbour Laplacian, one
//     independent system per channel (solved on the rayon pool).
// 4.  **Bounds are checked, never clipped**: a patch that does not fit at the
//     requested offset is a `PatchOutOfBounds` error, not a partial paste.

use crate::config::PoissonConfig;
use crate::core_modules::filter::box_filter_rgb;
use crate::core_modules::frame::{Frame, intensity, validate_frame};
use crate::core_modules::mask::{Mask, OccupancyMask};
use crate::core_modules::placement::PlacementOffset;
use crate::error::{SynthError, SynthResult};

/// Side of the box filter used to soften flat-alpha patches.
pub const SMOOTHING_KERNEL: usize = 7;
/// Patch luma above which a pixel counts as smoke.
pub const DEFAULT_BRIGHTNESS_THRESHOLD: f64 = 50.0;

/// A blended frame and the footprint of the smoke written into it.
#[derive(Debug, Clone)]
pub struct Composite {
    pub image: Frame,
    pub mask: OccupancyMask,
}

/// A blending strategy.
pub trait Compositor: Send + Sync {
    /// Short identifier used in output file names.
    fn name(&self) -> &'static str;

    fn blend(&self, background: &Frame, patch: &Frame, offset: PlacementOffset) -> SynthResult<Composite>;
}

fn check_bounds(background: &Frame, patch: &Frame, offset: PlacementOffset) -> SynthResult<()> {
    validate_frame(background)?;
    validate_frame(patch)?;
    if !offset.fits(patch.width(), patch.height(), background.width(), background.height()) {
        return Err(SynthError::PatchOutOfBounds {
            dx: offset.dx,
            dy: offset.dy,
            patch_width: patch.width(),
            patch_height: patch.height(),
            width: background.width(),
            height: background.height(),
        });
    }
    Ok(())
}

/// Box-filtered alpha blending.
#[derive(Debug, Clone)]
pub struct FlatAlphaCompositor {
    /// In [0, 1]; 0 leaves the background untouched.
    pub opacity: f64,
    pub brightness_threshold: f64,
}

impl FlatAlphaCompositor {
    pub fn new(opacity: f64) -> Self {
        Self {
            opacity,
            brightness_threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
        }
    }
}

impl Compositor for FlatAlphaCompositor {
    fn name(&self) -> &'static str {
        "flat_alpha"
    }

    fn blend(&self, background: &Frame, patch: &Frame, offset: PlacementOffset) -> SynthResult<Composite> {
        check_bounds(background, patch, offset)?;
        let smoothed = box_filter_rgb(patch, SMOOTHING_KERNEL);
        let max_luma = smoothed.pixels().map(intensity).fold(0.0f64, f64::max);

        let mut image = background.clone();
        let mut mask = Mask::new(background.width(), background.height());
        if max_luma <= 0.0 {
            return Ok(Composite { image, mask });
        }

        for (x, y, smoke) in smoothed.enumerate_pixels() {
            let luma = intensity(smoke);
            let (bx, by) = (offset.dx + x, offset.dy + y);
            if luma > self.brightness_threshold {
                mask.set(bx, by, true);
            }
            let alpha = 1.0 - self.opacity * luma / max_luma;
            let dst = image.get_pixel_mut(bx, by);
            for c in 0..3 {
                let blended = dst.0[c] as f64 * alpha + smoke.0[c] as f64 * (1.0 - alpha);
                dst.0[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(Composite { image, mask })
    }
}

/// Gradient-domain (Poisson) cloning.
#[derive(Debug, Clone)]
pub struct SeamlessCompositor {
    pub config: PoissonConfig,
    pub brightness_threshold: f64,
}

impl SeamlessCompositor {
    pub fn new(config: PoissonConfig) -> Self {
        Self {
            config,
            brightness_threshold: DEFAULT_BRIGHTNESS_THRESHOLD,
        }
    }
}

impl Default for SeamlessCompositor {
    fn default() -> Self {
        Self::new(PoissonConfig::default())
    }
}

impl Compositor for SeamlessCompositor {
    fn name(&self) -> &'static str {
        "seamless"
    }

    fn blend(&self, background: &Frame, patch: &Frame, offset: PlacementOffset) -> SynthResult<Composite> {
        check_bounds(background, patch, offset)?;
        let local = Mask::from_fn(patch.width(), patch.height(), |x, y| {
            intensity(patch.get_pixel(x, y)) > self.brightness_threshold
        });

        let mut mask = Mask::new(background.width(), background.height());
        if local.is_clear() {
            return Ok(Composite {
                image: background.clone(),
                mask,
            });
        }
        mask.paste(&local, offset.dx, offset.dy);
        let image = poisson_solver::clone_into(background, patch, &local, offset, &self.config);
        Ok(Composite { image, mask })
    }
}

pub mod poisson_solver {
    use super::*;
    use rayon::prelude::*;
    use tracing::debug;

    const NEIGHBOURS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

    /// One unknown of the linear system.
    struct Unknown {
        /// Background coordinates.
        x: u32,
        y: u32,
        /// Neighbours that lie inside the background.
        degree: f32,
        /// Indices of neighbours that are themselves unknowns.
        coupled: Vec<usize>,
        /// Neighbours outside the region whose background value is fixed.
        fixed: Vec<(u32, u32)>,
        /// Neighbours inside the patch, for the guidance term, in patch coordinates.
        guided: Vec<(u32, u32)>,
    }

    /// Solves the Poisson equation over `local` (patch coordinates) and returns
    /// the background with the solution written into the region.
    pub fn clone_into(
        background: &Frame,
        patch: &Frame,
        local: &Mask,
        offset: PlacementOffset,
        config: &PoissonConfig,
    ) -> Frame {
        let (pw, ph) = (patch.width(), patch.height());
        let (bw, bh) = (background.width() as i64, background.height() as i64);

        let mut index = vec![usize::MAX; (pw as usize) * (ph as usize)];
        let mut unknowns = Vec::new();
        for y in 0..ph {
            for x in 0..pw {
                if local.get(x, y) {
                    index[(y * pw + x) as usize] = unknowns.len();
                    unknowns.push((x, y));
                }
            }
        }

        let system: Vec<Unknown> = unknowns
            .iter()
            .map(|&(lx, ly)| {
                let (x, y) = (offset.dx + lx, offset.dy + ly);
                let mut unknown = Unknown {
                    x,
                    y,
                    degree: 0.0,
                    coupled: Vec::with_capacity(4),
                    fixed: Vec::with_capacity(4),
                    guided: Vec::with_capacity(4),
                };
                for (dx, dy) in NEIGHBOURS {
                    let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                    if nx < 0 || ny < 0 || nx >= bw || ny >= bh {
                        continue;
                    }
                    unknown.degree += 1.0;
                    let (nlx, nly) = (lx as i64 + dx, ly as i64 + dy);
                    let in_patch = nlx >= 0 && nly >= 0 && nlx < pw as i64 && nly < ph as i64;
                    if in_patch {
                        unknown.guided.push((nlx as u32, nly as u32));
                        let j = index[(nly as u32 * pw + nlx as u32) as usize];
                        if j != usize::MAX {
                            unknown.coupled.push(j);
                            continue;
                        }
                    }
                    unknown.fixed.push((nx as u32, ny as u32));
                }
                unknown
            })
            .collect();

        let channels: Vec<Vec<f32>> = (0..3)
            .into_par_iter()
            .map(|c| solve_channel(background, patch, offset, &system, c, config))
            .collect();

        let mut out = background.clone();
        for (i, unknown) in system.iter().enumerate() {
            let px = out.get_pixel_mut(unknown.x, unknown.y);
            for c in 0..3 {
                px.0[c] = channels[c][i].round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }

    fn solve_channel(
        background: &Frame,
        patch: &Frame,
        offset: PlacementOffset,
        system: &[Unknown],
        channel: usize,
        config: &PoissonConfig,
    ) -> Vec<f32> {
        let source = |x: u32, y: u32| patch.get_pixel(x, y).0[channel] as f32;

        // Right-hand side: fixed boundary values plus the source guidance field.
        let rhs: Vec<f32> = system
            .iter()
            .map(|u| {
                let (lx, ly) = (u.x - offset.dx, u.y - offset.dy);
                let boundary: f32 = u
                    .fixed
                    .iter()
                    .map(|&(x, y)| background.get_pixel(x, y).0[channel] as f32)
                    .sum();
                let guidance: f32 = u.guided.iter().map(|&(x, y)| source(lx, ly) - source(x, y)).sum();
                boundary + guidance
            })
            .collect();

        let mut f: Vec<f32> = system
            .iter()
            .map(|u| background.get_pixel(u.x, u.y).0[channel] as f32)
            .collect();

        let omega = config.relaxation;
        let mut iterations = 0;
        for _ in 0..config.max_iterations {
            iterations += 1;
            let mut max_delta = 0.0f32;
            for (i, u) in system.iter().enumerate() {
                if u.degree == 0.0 {
                    continue;
                }
                let coupled: f32 = u.coupled.iter().map(|&j| f[j]).sum();
                let target = (coupled + rhs[i]) / u.degree;
                let delta = omega * (target - f[i]);
                f[i] += delta;
                max_delta = max_delta.max(delta.abs());
            }
            if max_delta < config.tolerance {
                break;
            }
        }
        debug!(channel, iterations, unknowns = system.len(), "poisson solve finished");
        f
    }
}
