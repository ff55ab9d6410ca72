// THEORY:
// The `region_stats` module scores how well a candidate horizon separates a
// frame into two visually coherent regions. It is the objective function the
// sky detector maximizes.
//
// Key principles:
// 1.  **Second-order color statistics**: each side of the partition is
//     summarized by the mean and the (population) covariance of its RGB
//     values. A clean sky or a clean stretch of ground has a tight color
//     distribution and a small covariance determinant; a region that
//     straddles the horizon mixes two distributions and its determinant
//     grows sharply along the direction joining them.
// 2.  **Empirical energy**: with sky weight y = 2,
//       J = 1 / (y*det(S_sky) + det(S_ground) + y*det(V_sky) + det(V_ground))
//     where V is the eigenvector matrix of S. The formula is tuned, not
//     derived; it is reproduced as is because changing it changes which
//     horizon wins.
// 3.  **Degenerate partitions lose**: if either side is empty the partition
//     gets `EnergyScore::DEGENERATE`, strictly below every real score.

use nalgebra::{Matrix3, SymmetricEigen};
use std::cmp::Ordering;

/// Weight of the sky terms in the energy function.
pub const SKY_WEIGHT: f64 = 2.0;

/// Mean color and population covariance of one side of a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStatistics {
    pub count: usize,
    pub mean: [f64; 3],
    pub covariance: Matrix3<f64>,
}

impl RegionStatistics {
    /// Statistics of a set of color vectors; `None` when the set is empty.
    pub fn from_colors(colors: impl IntoIterator<Item = [f64; 3]>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = [0.0f64; 3];
        let mut sum_outer = [[0.0f64; 3]; 3];

        for c in colors {
            count += 1;
            for i in 0..3 {
                sum[i] += c[i];
                for j in i..3 {
                    sum_outer[i][j] += c[i] * c[j];
                }
            }
        }
        if count == 0 {
            return None;
        }

        let n = count as f64;
        let mean = [sum[0] / n, sum[1] / n, sum[2] / n];
        let mut covariance = Matrix3::zeros();
        for i in 0..3 {
            for j in i..3 {
                let c = sum_outer[i][j] / n - mean[i] * mean[j];
                covariance[(i, j)] = c;
                covariance[(j, i)] = c;
            }
        }
        Some(Self { count, mean, covariance })
    }

    pub fn covariance_determinant(&self) -> f64 {
        self.covariance.determinant()
    }

    /// Determinant of the eigenvector matrix of the covariance.
    ///
    /// Eigenvectors are only defined up to sign, so each one is oriented with
    /// its largest-magnitude component positive before taking the determinant.
    /// That makes the value a deterministic function of the covariance.
    pub fn eigenvector_determinant(&self) -> f64 {
        let mut vectors = SymmetricEigen::new(self.covariance).eigenvectors;
        for mut column in vectors.column_iter_mut() {
            let dominant = column
                .iter()
                .copied()
                .max_by(|a, b| a.abs().partial_cmp(&b.abs()).unwrap_or(Ordering::Equal))
                .unwrap_or(0.0);
            if dominant < 0.0 {
                column.neg_mut();
            }
        }
        vectors.determinant()
    }
}

/// Separability of a sky/ground partition; larger is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyScore(f64);

impl EnergyScore {
    /// Score of a partition with an empty side.
    pub const DEGENERATE: EnergyScore = EnergyScore(f64::NEG_INFINITY);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_degenerate(self) -> bool {
        self.0 == f64::NEG_INFINITY || self.0.is_nan()
    }

    /// Total order used by the sweep: degenerate (and NaN) scores sort first.
    pub fn total_cmp(self, other: EnergyScore) -> Ordering {
        match (self.is_degenerate(), other.is_degenerate()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.0.total_cmp(&other.0),
        }
    }
}

pub mod energy_scorer {
    use super::*;
    use crate::core_modules::boundary::{Boundary, SkyMask};
    use crate::core_modules::frame::{Frame, color_vector};
    use crate::core_modules::mask::Mask;

    /// Sky mask of `frame` under `boundary`.
    pub fn partition(boundary: &Boundary) -> SkyMask {
        boundary.to_sky_mask()
    }

    /// Statistics of the pixels where `mask` is true and where it is false,
    /// in that order.
    pub fn statistics(
        frame: &Frame,
        mask: &Mask,
    ) -> (Option<RegionStatistics>, Option<RegionStatistics>) {
        let inside = frame
            .enumerate_pixels()
            .filter(|(x, y, _)| mask.get(*x, *y))
            .map(|(_, _, p)| color_vector(p));
        let outside = frame
            .enumerate_pixels()
            .filter(|(x, y, _)| !mask.get(*x, *y))
            .map(|(_, _, p)| color_vector(p));
        (
            RegionStatistics::from_colors(inside),
            RegionStatistics::from_colors(outside),
        )
    }

    pub fn score(sky: &RegionStatistics, ground: &RegionStatistics) -> EnergyScore {
        let denominator = (SKY_WEIGHT * sky.covariance_determinant()
            + ground.covariance_determinant())
            + (SKY_WEIGHT * sky.eigenvector_determinant() + ground.eigenvector_determinant());
        EnergyScore(1.0 / denominator)
    }

    /// Partition, gather statistics and score in one step.
    pub fn score_boundary(frame: &Frame, boundary: &Boundary) -> EnergyScore {
        let sky_mask = partition(boundary);
        match statistics(frame, sky_mask.as_mask()) {
            (Some(sky), Some(ground)) => score(&sky, &ground),
            _ => EnergyScore::DEGENERATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::energy_scorer::*;
    use super::*;
    use crate::core_modules::boundary::Boundary;
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Noisy blue-ish sky over noisy green-ish ground, horizon at `horizon`.
    fn noisy_landscape(width: u32, height: u32, horizon: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(width, height, |_, y| {
            let base: [u8; 3] = if y < horizon { [120, 170, 230] } else { [50, 110, 40] };
            let mut px = [0u8; 3];
            for c in 0..3 {
                px[c] = base[c] + rng.random_range(0..21u8);
            }
            Rgb(px)
        })
    }

    #[test]
    fn statistics_of_known_colors() {
        let stats = RegionStatistics::from_colors([[0.0, 0.0, 0.0], [2.0, 4.0, 0.0]])
            .expect("non-empty");
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, [1.0, 2.0, 0.0]);
        // Population covariance: var(r) = 1, var(g) = 4, cov(r, g) = 2.
        assert!((stats.covariance[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((stats.covariance[(1, 1)] - 4.0).abs() < 1e-12);
        assert!((stats.covariance[(0, 1)] - 2.0).abs() < 1e-12);
        assert!((stats.covariance[(1, 0)] - 2.0).abs() < 1e-12);
        assert!(stats.covariance_determinant().abs() < 1e-9);
        assert!(RegionStatistics::from_colors(std::iter::empty()).is_none());
    }

    #[test]
    fn eigenvector_determinant_is_unit_and_stable() {
        let stats = RegionStatistics::from_colors([
            [10.0, 3.0, 7.0],
            [12.0, 9.0, 1.0],
            [4.0, 5.0, 6.0],
            [8.0, 1.0, 2.0],
        ])
        .expect("non-empty");
        let d = stats.eigenvector_determinant();
        assert!((d.abs() - 1.0).abs() < 1e-9, "got {d}");
        assert_eq!(d, stats.eigenvector_determinant());
    }

    #[test]
    fn uniform_regions_score_one_third() {
        let frame = RgbImage::from_fn(10, 10, |_, y| {
            if y < 4 { Rgb([200, 220, 255]) } else { Rgb([30, 90, 20]) }
        });
        let s = score_boundary(&frame, &Boundary::flat(10, 4, 10));
        // Zero covariance on both sides leaves only the eigenvector terms: 2 + 1.
        assert!((s.value() - 1.0 / 3.0).abs() < 1e-9, "got {}", s.value());
    }

    #[test]
    fn true_horizon_beats_shifted_ones() {
        let frame = noisy_landscape(40, 30, 12, 7);
        let best = score_boundary(&frame, &Boundary::flat(40, 12, 30));
        for shifted in [4, 7, 17, 22] {
            let other = score_boundary(&frame, &Boundary::flat(40, shifted, 30));
            assert!(
                best.total_cmp(other).is_gt(),
                "horizon 12 scored {} but {shifted} scored {}",
                best.value(),
                other.value()
            );
        }
    }

    #[test]
    fn empty_region_is_degenerate_and_lowest() {
        let frame = noisy_landscape(20, 16, 8, 11);
        let all_ground = score_boundary(&frame, &Boundary::flat(20, 0, 16));
        let all_sky = score_boundary(&frame, &Boundary::flat(20, 16, 16));
        assert!(all_ground.is_degenerate());
        assert!(all_sky.is_degenerate());
        for row in 1..16 {
            let s = score_boundary(&frame, &Boundary::flat(20, row, 16));
            assert!(!s.is_degenerate());
            assert!(s.total_cmp(all_ground).is_gt());
            assert!(s.total_cmp(all_sky).is_gt());
        }
    }
}
