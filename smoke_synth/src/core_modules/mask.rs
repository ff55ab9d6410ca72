// THEORY:
// A `Mask` is a "dumb" boolean grid. It is the common currency between the
// sky detectors, the compositors and the label writer: the sky detectors fill
// one from a boundary, the compositors emit one in the background's coordinate
// frame to say where smoke was written, and the label writer reduces one to a
// bounding box. It knows how to summarize itself (count, bounding box) but
// nothing about what its `true` cells mean.

use image::{GrayImage, Luma};

/// Row-major boolean grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

/// Boolean grid sized to a composited frame, true wherever smoke was written.
pub type OccupancyMask = Mask;

impl Mask {
    /// An all-false mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![false; (width as usize) * (height as usize)],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut cells = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self { width, height, cells }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.cells[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let i = self.index(x, y);
        self.cells[i] = value;
    }

    /// Number of true cells.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// True when no cell is set.
    pub fn is_clear(&self) -> bool {
        !self.cells.iter().any(|&c| c)
    }

    /// Inclusive `(x0, y0, x1, y1)` bounds of the true cells.
    pub fn bounding_box(&self) -> Option<(u32, u32, u32, u32)> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                if !self.get(x, y) {
                    continue;
                }
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        bounds
    }

    /// Copies `local` into this mask with its top-left corner at `(dx, dy)`.
    /// Cells falling outside this mask are dropped.
    pub fn paste(&mut self, local: &Mask, dx: u32, dy: u32) {
        for y in 0..local.height {
            for x in 0..local.width {
                let (tx, ty) = (dx + x, dy + y);
                if tx < self.width && ty < self.height {
                    self.set(tx, ty, local.get(x, y));
                }
            }
        }
    }

    /// 0/255 grayscale rendering, as written to disk.
    pub fn to_luma_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }
}
