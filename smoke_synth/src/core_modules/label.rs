// THEORY:
// The `label` module reduces an occupancy mask to a detector training label:
// one axis-aligned box in normalized YOLO form, `class cx cy w h`.
//
// Key principles:
// 1.  **Tiny footprints are noise**: a mask with 100 or fewer true pixels gets
//     no label at all. Faint wisps at the start or end of a clip would
//     otherwise teach the detector to fire on nothing.
// 2.  **Normalized by the frame**: the box is measured from the mask's
//     bounding box, `w = (x1 - x0) / W` and `cx = x0 / W + w / 2` (same for y),
//     so every value lies in [0, 1].
// 3.  **Single class**: smoke is class `1`.

use crate::core_modules::mask::Mask;
use std::fmt;

/// Masks with this many true pixels or fewer produce no label.
pub const MIN_LABEL_PIXELS: usize = 100;
pub const SMOKE_CLASS_ID: u32 = 1;

/// Normalized bounding box of a smoke footprint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBoxLabel {
    pub class_id: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBoxLabel {
    pub fn from_mask(mask: &Mask) -> Option<Self> {
        if mask.count() <= MIN_LABEL_PIXELS {
            return None;
        }
        let (x0, y0, x1, y1) = mask.bounding_box()?;
        let (w, h) = (mask.width() as f64, mask.height() as f64);
        let width = (x1 - x0) as f64 / w;
        let height = (y1 - y0) as f64 / h;
        Some(Self {
            class_id: SMOKE_CLASS_ID,
            center_x: x0 as f64 / w + width / 2.0,
            center_y: y0 as f64 / h + height / 2.0,
            width,
            height,
        })
    }
}

impl fmt::Display for BoundingBoxLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.class_id, self.center_x, self.center_y, self.width, self.height
        )
    }
}
