// THEORY:
// A `SmokePatch` is the smoke side of a set: the sampled frames of one smoke
// clip, cropped to the smallest rectangle that ever contains visible smoke.
// It is built once per clip and then reused for every frame pair of the set,
// so the patch size (and therefore the placement check) is fixed up front.
//
// Key principles:
// 1.  **Temporal subsampling**: a clip is thinned to every `speed`-th frame
//     after dropping the first `offset` ones (clip intros are usually empty),
//     then each kept frame is resized by `(fx, fy)`.
// 2.  **Union footprint**: a pixel belongs to the footprint if its intensity
//     exceeds the brightness threshold in *any* sampled frame. The crop is the
//     inclusive bounding box of that union, so a plume that drifts over time
//     stays inside the patch for its whole lifetime.
// 3.  **Nothing visible, no patch**: an empty union means the clip never shows
//     smoke above the threshold; construction fails with `DegenerateSmokePatch`.

use crate::core_modules::frame::{Frame, intensity};
use crate::core_modules::mask::Mask;
use crate::error::{SynthError, SynthResult};
use image::imageops::{self, FilterType};

/// Smoke frames cropped to their common footprint.
#[derive(Debug, Clone)]
pub struct SmokePatch {
    frames: Vec<Frame>,
    /// Inclusive `(x0, y0, x1, y1)` crop in the coordinates of the sampled frames.
    crop: (u32, u32, u32, u32),
}

impl SmokePatch {
    /// Builds a patch from already-sampled frames of equal size.
    pub fn from_frames(frames: Vec<Frame>, brightness_threshold: f64) -> SynthResult<Self> {
        let first = frames.first().ok_or(SynthError::DegenerateSmokePatch)?;
        let (w, h) = first.dimensions();
        if w == 0 || h == 0 {
            return Err(SynthError::invalid_image("smoke frame has zero area"));
        }

        let mut union = Mask::new(w, h);
        for frame in &frames {
            if frame.dimensions() != (w, h) {
                return Err(SynthError::invalid_image(format!(
                    "smoke frames differ in size: {}x{} vs {}x{}",
                    frame.width(),
                    frame.height(),
                    w,
                    h
                )));
            }
            for (x, y, pixel) in frame.enumerate_pixels() {
                if intensity(pixel) > brightness_threshold {
                    union.set(x, y, true);
                }
            }
        }

        let crop = union.bounding_box().ok_or(SynthError::DegenerateSmokePatch)?;
        let (x0, y0, x1, y1) = crop;
        let frames = frames
            .iter()
            .map(|f| imageops::crop_imm(f, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image())
            .collect();
        Ok(Self { frames, crop })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.crop.2 - self.crop.0 + 1
    }

    pub fn height(&self) -> u32 {
        self.crop.3 - self.crop.1 + 1
    }

    pub fn crop(&self) -> (u32, u32, u32, u32) {
        self.crop
    }
}

/// Drops `offset` leading frames, keeps every `speed`-th of the rest and
/// resizes each by `(fx, fy)` (at least one pixel per side).
pub fn sample_smoke_frames(
    frames: &[Frame],
    offset: usize,
    speed: usize,
    fx: f64,
    fy: f64,
) -> SynthResult<Vec<Frame>> {
    if speed == 0 {
        return Err(SynthError::invalid_parameter("smoke speed must be at least 1"));
    }
    if !(fx > 0.0 && fy > 0.0) {
        return Err(SynthError::invalid_parameter(format!(
            "resize factors must be positive, got fx={fx} fy={fy}"
        )));
    }
    Ok(frames
        .iter()
        .skip(offset)
        .step_by(speed)
        .map(|frame| {
            let w = ((frame.width() as f64 * fx).round() as u32).max(1);
            let h = ((frame.height() as f64 * fy).round() as u32).max(1);
            imageops::resize(frame, w, h, FilterType::Triangle)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame_with_blob(x0: u32, y0: u32, size: u32) -> Frame {
        RgbImage::from_fn(40, 30, |x, y| {
            if (x0..x0 + size).contains(&x) && (y0..y0 + size).contains(&y) {
                Rgb([230, 230, 230])
            } else {
                Rgb([10, 10, 10])
            }
        })
    }

    #[test]
    fn crop_covers_union_of_frames() {
        let frames = vec![frame_with_blob(5, 4, 6), frame_with_blob(12, 10, 6)];
        let patch = SmokePatch::from_frames(frames, 50.0).expect("smoke visible");
        assert_eq!(patch.crop(), (5, 4, 17, 15));
        assert_eq!((patch.width(), patch.height()), (13, 12));
        assert_eq!(patch.len(), 2);
        for frame in patch.frames() {
            assert_eq!(frame.dimensions(), (13, 12));
        }
        // Top-left of the crop is the first frame's blob corner.
        assert_eq!(patch.frames()[0].get_pixel(0, 0), &Rgb([230, 230, 230]));
    }

    #[test]
    fn dark_clip_is_degenerate() {
        let frames = vec![RgbImage::from_pixel(8, 8, Rgb([40, 40, 40]))];
        assert!(matches!(
            SmokePatch::from_frames(frames, 50.0),
            Err(SynthError::DegenerateSmokePatch)
        ));
        assert!(matches!(
            SmokePatch::from_frames(Vec::new(), 50.0),
            Err(SynthError::DegenerateSmokePatch)
        ));
    }

    #[test]
    fn mismatched_sizes_rejected() {
        let frames = vec![frame_with_blob(1, 1, 3), RgbImage::new(5, 5)];
        assert!(matches!(
            SmokePatch::from_frames(frames, 50.0),
            Err(SynthError::InvalidImage(_))
        ));
    }

    #[test]
    fn sampling_skips_strides_and_resizes() {
        let frames: Vec<Frame> = (0..30).map(|i| RgbImage::from_pixel(100, 50, Rgb([i as u8, 0, 0]))).collect();
        let sampled = sample_smoke_frames(&frames, 20, 3, 0.3, 0.2).expect("valid parameters");
        // Frames 20, 23, 26, 29.
        assert_eq!(sampled.len(), 4);
        assert_eq!(sampled[1].get_pixel(0, 0).0[0], 23);
        assert_eq!(sampled[0].dimensions(), (30, 10));

        assert!(sample_smoke_frames(&frames, 40, 3, 0.3, 0.2).expect("valid").is_empty());
        assert!(sample_smoke_frames(&frames, 0, 0, 0.3, 0.2).is_err());
    }
}
