// THEORY:
// Small-kernel linear filtering shared by the gradient field and the flat-alpha
// compositor. Both need the same two ingredients: a dense single-channel float
// grid (`Plane`) and a separable convolution whose border handling mirrors the
// reflect-101 convention (`dcb|abcd|cba`) of common image libraries.
//
// A 2D kernel K = k_col * k_row^T is applied as a row pass followed by a
// column pass, which is O(2k) instead of O(k^2) per pixel. Sobel (3x3) and the
// normalized box filter (7x7) are both separable.

use image::RgbImage;

/// Dense row-major single-channel float grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), width * height, "plane data does not match {width}x{height}");
        Self { width, height, data }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f64) {
        self.data[y * self.width + x] = value;
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Maps an out-of-range index back inside `0..len` by mirroring without
/// repeating the edge sample.
#[inline]
pub fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = index;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }
    i as usize
}

/// Convolve each row with `kernel` (centered, reflect-101 borders).
pub fn convolve_rows(src: &Plane, kernel: &[f64]) -> Plane {
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
    let half = (kernel.len() / 2) as isize;
    let mut dst = Plane::new(src.width, src.height);
    for y in 0..src.height {
        for x in 0..src.width {
            let mut acc = 0.0;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = reflect_101(x as isize + ki as isize - half, src.width);
                acc += src.get(sx, y) * kv;
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

/// Convolve each column with `kernel` (centered, reflect-101 borders).
pub fn convolve_cols(src: &Plane, kernel: &[f64]) -> Plane {
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
    let half = (kernel.len() / 2) as isize;
    let mut dst = Plane::new(src.width, src.height);
    for y in 0..src.height {
        for x in 0..src.width {
            let mut acc = 0.0;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = reflect_101(y as isize + ki as isize - half, src.height);
                acc += src.get(x, sy) * kv;
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

pub fn convolve_separable(src: &Plane, row_kernel: &[f64], col_kernel: &[f64]) -> Plane {
    convolve_cols(&convolve_rows(src, row_kernel), col_kernel)
}

/// Normalized `size`x`size` box filter applied to every channel, rounded back
/// to 8 bits.
pub fn box_filter_rgb(src: &RgbImage, size: usize) -> RgbImage {
    let kernel = vec![1.0 / size as f64; size];
    let (w, h) = (src.width() as usize, src.height() as usize);
    let mut dst = RgbImage::new(src.width(), src.height());
    for channel in 0..3 {
        let plane = Plane::from_fn(w, h, |x, y| src.get_pixel(x as u32, y as u32).0[channel] as f64);
        let smoothed = convolve_separable(&plane, &kernel, &kernel);
        for (x, y, pixel) in dst.enumerate_pixels_mut() {
            pixel.0[channel] = smoothed.get(x as usize, y as usize).round().clamp(0.0, 255.0) as u8;
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn reflect_101_mirrors_without_edge_repeat() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 5), 3);
        assert_eq!(reflect_101(-3, 1), 0);
        // Kernel wider than the image bounces more than once.
        assert_eq!(reflect_101(-3, 2), 1);
        assert_eq!(reflect_101(4, 2), 0);
    }

    #[test]
    fn box_filter_preserves_constant_image() {
        let src = RgbImage::from_pixel(12, 9, Rgb([40, 120, 200]));
        let dst = box_filter_rgb(&src, 7);
        for pixel in dst.pixels() {
            assert_eq!(pixel, &Rgb([40, 120, 200]));
        }
    }

    #[test]
    fn box_filter_softens_a_step() {
        let mut src = RgbImage::new(20, 5);
        for (x, _, pixel) in src.enumerate_pixels_mut() {
            if x >= 10 {
                *pixel = Rgb([210, 210, 210]);
            }
        }
        let dst = box_filter_rgb(&src, 7);
        // 4 of the 7 taps at x=10 are bright.
        assert_eq!(dst.get_pixel(10, 2).0[0], 120);
        assert_eq!(dst.get_pixel(0, 2).0[0], 0);
        assert_eq!(dst.get_pixel(19, 2).0[0], 210);
    }

    #[test]
    fn separable_identity_kernel_is_noop() {
        let plane = Plane::from_fn(4, 3, |x, y| (x * 10 + y) as f64);
        let out = convolve_separable(&plane, &[0.0, 1.0, 0.0], &[0.0, 1.0, 0.0]);
        assert_eq!(out, plane);
    }
}
