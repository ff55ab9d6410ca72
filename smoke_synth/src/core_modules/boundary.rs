// THEORY:
// The `boundary` module reduces a 2D gradient map to a 1D horizon: one row
// index per column marking where the sky ends. It also owns the `SkyMask`,
// the boolean grid every sky detector ultimately produces.
//
// Key principles:
// 1.  **Column independence**: each column's boundary depends only on that
//     column's gradient values at a single threshold. There is no inter-column
//     state, so extraction is O(width * height) and trivially parallel.
// 2.  **First strong edge wins**: walking down from row 0, the boundary is the
//     first row whose gradient magnitude strictly exceeds the threshold. A
//     column with no such row gets the frame height.
// 3.  **Masks derive from boundaries**: a `SkyMask` is always built by filling
//     rows `0..boundary[x]` of every column, which makes it column-monotonic
//     (sky on top, contiguous from row 0) by construction.

use crate::core_modules::mask::Mask;

/// Per-column sky/ground transition rows. Length equals the frame width; every
/// value lies in `0..=height`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    rows: Vec<u32>,
    height: u32,
}

impl Boundary {
    /// Builds a boundary, clamping every row into `0..=height`.
    pub fn new(rows: Vec<u32>, height: u32) -> Self {
        let rows = rows.into_iter().map(|r| r.min(height)).collect();
        Self { rows, height }
    }

    /// Every column transitions at the same row.
    pub fn flat(width: u32, row: u32, height: u32) -> Self {
        Self::new(vec![row; width as usize], height)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.rows.len() as u32
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn row(&self, x: u32) -> u32 {
        self.rows[x as usize]
    }

    pub fn rows(&self) -> &[u32] {
        &self.rows
    }

    /// Fills every row strictly above the boundary value, per column.
    pub fn to_sky_mask(&self) -> SkyMask {
        SkyMask::from_boundary(self.clone())
    }
}

/// Column-monotonic boolean grid: true rows (sky) always precede false rows
/// (ground) within a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkyMask {
    boundary: Boundary,
    mask: Mask,
}

impl SkyMask {
    pub fn from_boundary(boundary: Boundary) -> Self {
        let mask = Mask::from_fn(boundary.width(), boundary.height(), |x, y| y < boundary.row(x));
        Self { boundary, mask }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    #[inline]
    pub fn is_sky(&self, x: u32, y: u32) -> bool {
        self.mask.get(x, y)
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn as_mask(&self) -> &Mask {
        &self.mask
    }

    /// First non-sky row in column `x`, or `None` when the whole column is sky.
    pub fn first_ground_row(&self, x: u32) -> Option<u32> {
        let row = self.boundary.row(x);
        (row < self.height()).then_some(row)
    }

    /// Checks that no sky cell sits below a ground cell in any column.
    pub fn is_column_monotonic(&self) -> bool {
        (0..self.width()).all(|x| {
            let mut seen_ground = false;
            (0..self.height()).all(|y| {
                let sky = self.is_sky(x, y);
                if !sky {
                    seen_ground = true;
                }
                !(sky && seen_ground)
            })
        })
    }
}

pub mod boundary_extractor {
    use super::Boundary;
    use crate::core_modules::gradient::GradientMap;

    /// For each column, the smallest row whose gradient magnitude exceeds
    /// `threshold`; the map height when no row does.
    pub fn extract(gradient: &GradientMap, threshold: f64) -> Boundary {
        let (width, height) = (gradient.width(), gradient.height());
        let rows = (0..width)
            .map(|x| {
                (0..height)
                    .find(|&y| gradient.get(x, y) > threshold)
                    .unwrap_or(height) as u32
            })
            .collect();
        Boundary::new(rows, height as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::boundary_extractor::extract;
    use super::*;
    use crate::core_modules::filter::Plane;
    use crate::core_modules::gradient::GradientField;
    use image::{Rgb, RgbImage};

    #[test]
    fn strong_edge_found_in_every_column() {
        let frame = RgbImage::from_fn(30, 40, |x, y| {
            if y >= 17 { Rgb([60, 140, 40]) } else { Rgb([150, 190, 250 - (x as u8)]) }
        });
        let map = GradientField::compute(&frame).expect("valid frame");
        let boundary = extract(&map, 50.0);
        assert_eq!(boundary.width(), 30);
        for &row in boundary.rows() {
            assert!(row.abs_diff(17) <= 1, "boundary row {row} not near 17");
        }
    }

    #[test]
    fn column_without_edge_gets_height() {
        let mut map = Plane::new(3, 5);
        map.set(0, 2, 10.0);
        map.set(2, 0, 10.0);
        let boundary = extract(&map, 5.0);
        assert_eq!(boundary.rows(), &[2, 5, 0]);
        // Threshold is strict.
        assert_eq!(extract(&map, 10.0).rows(), &[5, 5, 5]);
    }

    #[test]
    fn sky_mask_fills_rows_above_boundary() {
        let mask = Boundary::new(vec![0, 2, 4, 9], 4).to_sky_mask();
        assert_eq!(mask.boundary().rows(), &[0, 2, 4, 4]);
        assert!(!mask.is_sky(0, 0));
        assert!(mask.is_sky(1, 1) && !mask.is_sky(1, 2));
        assert!((0..4).all(|y| mask.is_sky(2, y)));
        assert_eq!(mask.first_ground_row(1), Some(2));
        assert_eq!(mask.first_ground_row(2), None);
        assert!(mask.is_column_monotonic());
    }
}
