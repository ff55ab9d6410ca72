// THEORY:
// The `placement` module picks where a smoke patch goes. Smoke rises from the
// landscape, so the anchor row is drawn from the band above the first ground
// row of the chosen column; the patch then extends downward over the horizon
// instead of floating in open sky.
//
// Key principles:
// 1.  **Column first**: `dx` is uniform over the full width. The row range
//     depends on that column only.
// 2.  **Bounded row**: `dy` is uniform in `[0, dy_max - 1]` where `dy_max` is
//     the first non-sky row of column `dx`. A column that has no sky at all
//     (`dy_max == 0`) yields `dy = 0`; that answer is valid but degenerate.
//     `sample_fitting` treats any anchor on row 0 as a miss, so a fitted patch
//     always has at least one sky row above it.
// 3.  **Bounded retries**: `sample_fitting` re-draws at most `attempts` times
//     and then fails with `NoPlacementFound`. It never loops unboundedly.

use crate::core_modules::boundary::SkyMask;
use crate::error::{SynthError, SynthResult};
use rand::Rng;
use tracing::debug;

/// Top-left corner at which a smoke patch is inserted into a background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlacementOffset {
    pub dx: u32,
    pub dy: u32,
}

impl PlacementOffset {
    pub fn new(dx: u32, dy: u32) -> Self {
        Self { dx, dy }
    }

    /// True when a `patch_width`x`patch_height` patch anchored here lies fully
    /// inside a `width`x`height` background.
    pub fn fits(&self, patch_width: u32, patch_height: u32, width: u32, height: u32) -> bool {
        self.dx as u64 + patch_width as u64 <= width as u64
            && self.dy as u64 + patch_height as u64 <= height as u64
    }
}

pub struct PlacementSampler;

impl PlacementSampler {
    /// One draw: the column's first ground row bounds the anchor row.
    /// A column with no sky returns `dy = 0`.
    pub fn sample<R: Rng>(mask: &SkyMask, rng: &mut R) -> PlacementOffset {
        let (offset, _) = Self::draw(mask, rng);
        offset
    }

    /// Re-draws until the anchor is below the top row and the patch fits,
    /// giving up after `attempts` draws.
    pub fn sample_fitting<R: Rng>(
        mask: &SkyMask,
        patch_width: u32,
        patch_height: u32,
        attempts: usize,
        rng: &mut R,
    ) -> SynthResult<PlacementOffset> {
        for attempt in 0..attempts {
            let (offset, dy_max) = Self::draw(mask, rng);
            if offset.dy > 0 && offset.fits(patch_width, patch_height, mask.width(), mask.height()) {
                return Ok(offset);
            }
            debug!(attempt, dx = offset.dx, dy = offset.dy, dy_max, "placement rejected");
        }
        Err(SynthError::NoPlacementFound { attempts })
    }

    /// Unconstrained draw used when no sky mask is available: `dx` over the
    /// width, `dy` over the height, both leaving room for the patch.
    pub fn sample_anywhere<R: Rng>(
        width: u32,
        height: u32,
        patch_width: u32,
        patch_height: u32,
        rng: &mut R,
    ) -> SynthResult<PlacementOffset> {
        if patch_width > width || patch_height > height {
            return Err(SynthError::NoPlacementFound { attempts: 0 });
        }
        Ok(PlacementOffset {
            dx: rng.random_range(0..=width - patch_width),
            dy: rng.random_range(0..=height - patch_height),
        })
    }

    fn draw<R: Rng>(mask: &SkyMask, rng: &mut R) -> (PlacementOffset, u32) {
        let dx = rng.random_range(0..mask.width());
        // `boundary.row` is the first non-sky row, or the height for an all-sky column.
        let dy_max = mask.boundary().row(dx);
        let dy = if dy_max == 0 { 0 } else { rng.random_range(0..dy_max) };
        (PlacementOffset { dx, dy }, dy_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::boundary::Boundary;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn samples_stay_in_sky_band_and_cover_width() {
        let (w, h) = (64u32, 40u32);
        let mask = Boundary::flat(w, h / 2, h).to_sky_mask();
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = vec![0usize; w as usize];
        for _ in 0..10_000 {
            let offset = PlacementSampler::sample(&mask, &mut rng);
            assert!(offset.dy <= h / 2 - 1, "dy {} out of band", offset.dy);
            seen[offset.dx as usize] += 1;
        }
        // ~156 expected per column.
        assert!(seen.iter().all(|&n| n > 80), "uneven dx coverage: {seen:?}");
    }

    #[test]
    fn column_without_sky_gives_zero_row() {
        let mask = Boundary::flat(5, 0, 8).to_sky_mask();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(PlacementSampler::sample(&mask, &mut rng).dy, 0);
        }
    }

    #[test]
    fn fitting_sample_respects_patch_and_gives_up() {
        // Sky only in columns 0..4.
        let mut rows = vec![0u32; 20];
        rows[..4].fill(6);
        let mask = Boundary::new(rows, 12).to_sky_mask();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let offset = PlacementSampler::sample_fitting(&mask, 3, 4, 256, &mut rng)
                .expect("sky columns exist");
            assert!(offset.dx < 4 && (1..6).contains(&offset.dy));
            assert!(offset.fits(3, 4, 20, 12));
        }

        let no_sky = Boundary::flat(20, 0, 12).to_sky_mask();
        assert!(matches!(
            PlacementSampler::sample_fitting(&no_sky, 3, 4, 10, &mut rng),
            Err(SynthError::NoPlacementFound { attempts: 10 })
        ));
    }

    #[test]
    fn fitting_sample_never_anchors_on_top_row() {
        // One sky row: every draw lands on row 0.
        let thin = Boundary::flat(20, 1, 12).to_sky_mask();
        let mut rng = StdRng::seed_from_u64(6);
        assert!(matches!(
            PlacementSampler::sample_fitting(&thin, 3, 4, 50, &mut rng),
            Err(SynthError::NoPlacementFound { attempts: 50 })
        ));

        let two_rows = Boundary::flat(20, 2, 12).to_sky_mask();
        for _ in 0..100 {
            let offset = PlacementSampler::sample_fitting(&two_rows, 3, 4, 256, &mut rng).expect("row 1 is open");
            assert_eq!(offset.dy, 1);
        }
    }

    #[test]
    fn anywhere_keeps_patch_inside() {
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..500 {
            let offset = PlacementSampler::sample_anywhere(30, 20, 10, 20, &mut rng).expect("fits");
            assert!(offset.fits(10, 20, 30, 20));
            assert_eq!(offset.dy, 0);
        }
        assert!(PlacementSampler::sample_anywhere(30, 20, 31, 1, &mut rng).is_err());
    }
}
