// THEORY:
// The `frame` module is the lowest layer of the synthesizer. A frame is an
// immutable 8-bit RGB grid (`image::RgbImage`) owned by the calling frame loop;
// every higher module borrows it and derives new grids from it rather than
// mutating it in place.
//
// Key principles:
// 1.  **One notion of brightness**: every module that asks "how bright is this
//     pixel" (gradient input, smoke thresholding, alpha computation) goes
//     through `intensity`, a Rec. 601 luma, so the thresholds mean the same
//     thing everywhere.
// 2.  **Validate at the edge**: `validate_frame` is the single place that turns
//     an empty grid into `InvalidImage`; core operations call it first and can
//     assume a non-empty frame afterwards.

use crate::error::{SynthError, SynthResult};
use image::{Rgb, RgbImage};

/// A decoded, resized video frame.
pub type Frame = RgbImage;

/// Rejects frames with zero width or height.
pub fn validate_frame(frame: &Frame) -> SynthResult<()> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(SynthError::invalid_image(format!(
            "frame has zero area ({}x{})",
            frame.width(),
            frame.height()
        )));
    }
    Ok(())
}

/// Rec. 601 luma of an RGB pixel, in 0..255.
#[inline]
pub fn intensity(pixel: &Rgb<u8>) -> f64 {
    let [r, g, b] = pixel.0;
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

/// Luma rounded to the nearest 8-bit level, as a grayscale conversion stores it.
#[inline]
pub fn gray_level(pixel: &Rgb<u8>) -> u8 {
    intensity(pixel).round().clamp(0.0, 255.0) as u8
}

/// Copies `pixel` as an `[f64; 3]` color vector.
#[inline]
pub fn color_vector(pixel: &Rgb<u8>) -> [f64; 3] {
    [pixel.0[0] as f64, pixel.0[1] as f64, pixel.0[2] as f64]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_is_invalid() {
        let frame = RgbImage::new(0, 10);
        assert!(matches!(
            validate_frame(&frame),
            Err(SynthError::InvalidImage(_))
        ));
        assert!(validate_frame(&RgbImage::new(1, 1)).is_ok());
    }

    #[test]
    fn intensity_weights_sum_to_white() {
        assert!((intensity(&Rgb([255, 255, 255])) - 255.0).abs() < 1e-9);
        assert_eq!(intensity(&Rgb([0, 0, 0])), 0.0);
        // Green dominates perceived brightness.
        assert!(intensity(&Rgb([0, 200, 0])) > intensity(&Rgb([200, 0, 0])));
        assert!(intensity(&Rgb([200, 0, 0])) > intensity(&Rgb([0, 0, 200])));
    }

    #[test]
    fn gray_level_rounds() {
        assert_eq!(gray_level(&Rgb([255, 255, 255])), 255);
        assert_eq!(gray_level(&Rgb([10, 10, 10])), 10);
    }
}
