// THEORY:
// The `gradient` module turns a color frame into an edge-strength map, the raw
// material of horizon detection. A sky/ground transition is, almost always, the
// first strong edge met when walking down a column from the top of the frame.
//
// Steps:
// 1.  Convert to 8-bit grayscale (Rec. 601 luma, rounded).
// 2.  Apply the 3x3 Sobel operators. They are separable:
//       Sobel_x: derivative [-1, 0, 1] along rows, smoothing [1, 2, 1] along columns
//       Sobel_y: smoothing along rows, derivative along columns
//     Borders are reflect-101, so the first and last rows carry no vertical
//     response from outside the frame.
// 3.  Combine per pixel with the Euclidean norm, hypot(Gx, Gy).
//
// The map is computed once per frame and then read by every threshold of the
// sweep; it is never mutated.

use crate::core_modules::filter::{Plane, convolve_separable};
use crate::core_modules::frame::{Frame, gray_level, validate_frame};
use crate::error::SynthResult;

const SOBEL_DERIV: [f64; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f64; 3] = [1.0, 2.0, 1.0];

/// Per-pixel gradient magnitude, same dimensions as its source frame.
pub type GradientMap = Plane;

/// Computes gradient magnitude maps from color frames.
pub struct GradientField;

impl GradientField {
    pub fn compute(frame: &Frame) -> SynthResult<GradientMap> {
        validate_frame(frame)?;
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        let gray = Plane::from_fn(w, h, |x, y| gray_level(frame.get_pixel(x as u32, y as u32)) as f64);

        let gx = convolve_separable(&gray, &SOBEL_DERIV, &SOBEL_SMOOTH);
        let gy = convolve_separable(&gray, &SOBEL_SMOOTH, &SOBEL_DERIV);

        Ok(Plane::from_fn(w, h, |x, y| gx.get(x, y).hypot(gy.get(x, y))))
    }
}
