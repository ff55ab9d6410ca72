// THEORY:
// The `pipeline` module is the top-level API for building one dataset "set":
// one smoke clip composited over one background clip. It strings the core
// modules together in a fixed order and owns the skip-and-continue policy.
//
// Stages of `SetBuilder::build_set`:
// 1.  **Smoke patch**: thin and resize the smoke clip, crop it to the union
//     footprint. No visible smoke means the set is skipped.
// 2.  **Fit check**: the patch must be strictly smaller than the background on
//     both axes, otherwise the set is skipped.
// 3.  **Placement**: detect the sky on the *first* background frame and sample
//     one offset for the whole set, so the plume does not jump between frames.
//     If the detector finds no horizon the offset is drawn anywhere the patch
//     fits.
// 4.  **Frame pairs**: background and smoke frames are zipped; every pair is
//     blended by every compositor and handed to the dataset writer. A failing
//     pair is logged and skipped; the rest of the set carries on.
// 5.  **Cancellation** is honoured between frame pairs, never inside one.

use crate::config::{PoissonConfig, SetConfig};
use crate::core_modules::compositor::{Compositor, FlatAlphaCompositor, SeamlessCompositor};
use crate::core_modules::frame::Frame;
use crate::core_modules::placement::{PlacementOffset, PlacementSampler};
use crate::core_modules::sky_detector::SkyDetector;
use crate::core_modules::smoke_patch::{SmokePatch, sample_smoke_frames};
use crate::dataset::{DatasetWriter, SampleKey, Split, WriteOptions};
use crate::error::{SynthError, SynthResult};
use crate::frame_source::FrameSource;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

// Re-export the pieces callers need to assemble a builder.
pub use crate::core_modules::boundary::SkyMask;
pub use crate::core_modules::compositor::Composite;

/// Receiving side of a batch-wide cancel flag.
pub type CancelToken = watch::Receiver<bool>;

/// Everything needed to build one set, independent of any other set.
#[derive(Clone)]
pub struct SetJob {
    pub set_index: usize,
    pub smoke: Arc<dyn FrameSource>,
    pub background: Arc<dyn FrameSource>,
    pub config: SetConfig,
    /// Seeds the placement draw, so a job is reproducible on any worker.
    pub seed: u64,
}

/// Outcome of a set that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SetReport {
    pub set_index: usize,
    pub offset: PlacementOffset,
    pub patch_size: (u32, u32),
    /// Images written, summed over compositors.
    pub images_written: usize,
    pub labels_written: usize,
    /// Frame pairs dropped after a recoverable error.
    pub pairs_skipped: usize,
    /// True when the placement ignored the sky because no horizon was found.
    pub unconstrained_placement: bool,
}

/// Builds sets with a shared detector and writer.
pub struct SetBuilder {
    detector: Arc<dyn SkyDetector>,
    writer: Arc<dyn DatasetWriter>,
    poisson: PoissonConfig,
}

impl SetBuilder {
    pub fn new(detector: Arc<dyn SkyDetector>, writer: Arc<dyn DatasetWriter>, poisson: PoissonConfig) -> Self {
        Self {
            detector,
            writer,
            poisson,
        }
    }

    /// Loads both clips and builds the set.
    pub fn run_job(&self, job: &SetJob, cancel: &CancelToken) -> SynthResult<SetReport> {
        if *cancel.borrow() {
            return Err(SynthError::Cancelled);
        }
        let smoke = job.smoke.frames()?;
        let backgrounds = job.background.frames()?;
        debug!(
            set = job.set_index,
            smoke = %job.smoke.name(),
            background = %job.background.name(),
            "loaded clips"
        );
        let mut rng = StdRng::seed_from_u64(job.seed);
        self.build_set(job.set_index, &smoke, &backgrounds, &job.config, &mut rng, cancel)
    }

    fn compositors(&self, config: &SetConfig) -> [Box<dyn Compositor>; 2] {
        let mut flat = FlatAlphaCompositor::new(config.opacity);
        flat.brightness_threshold = config.brightness_threshold;
        let mut seamless = SeamlessCompositor::new(self.poisson.clone());
        seamless.brightness_threshold = config.brightness_threshold;
        [Box::new(flat), Box::new(seamless)]
    }

    /// Chooses the set's offset on its first background frame.
    fn place<R: Rng>(&self, first: &Frame, patch: &SmokePatch, config: &SetConfig, rng: &mut R) -> SynthResult<(PlacementOffset, bool)> {
        match self.detector.detect(first) {
            Ok(mask) => {
                let offset = PlacementSampler::sample_fitting(
                    &mask,
                    patch.width(),
                    patch.height(),
                    config.placement_attempts,
                    rng,
                )?;
                Ok((offset, false))
            }
            Err(SynthError::NoBoundaryFound) => {
                warn!("no horizon found on first background frame, placing anywhere");
                let offset = PlacementSampler::sample_anywhere(
                    first.width(),
                    first.height(),
                    patch.width(),
                    patch.height(),
                    rng,
                )?;
                Ok((offset, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Composites `smoke` over `backgrounds` and writes every frame pair.
    pub fn build_set<R: Rng>(
        &self,
        set_index: usize,
        smoke: &[Frame],
        backgrounds: &[Frame],
        config: &SetConfig,
        rng: &mut R,
        cancel: &CancelToken,
    ) -> SynthResult<SetReport> {
        config.validate()?;
        let sampled = sample_smoke_frames(smoke, config.smoke_offset, config.smoke_speed, config.fx, config.fy)?;
        let patch = SmokePatch::from_frames(sampled, config.brightness_threshold)?;
        let first = backgrounds
            .first()
            .ok_or_else(|| SynthError::invalid_image("background clip has no frames"))?;

        if patch.width() >= first.width() || patch.height() >= first.height() {
            return Err(SynthError::PatchOutOfBounds {
                dx: 0,
                dy: 0,
                patch_width: patch.width(),
                patch_height: patch.height(),
                width: first.width(),
                height: first.height(),
            });
        }

        let (offset, unconstrained_placement) = self.place(first, &patch, config, rng)?;
        debug!(set = set_index, dx = offset.dx, dy = offset.dy, "placement chosen");

        let compositors = self.compositors(config);
        let split = Split::from_train_flag(config.train);
        let options = WriteOptions {
            save_mask: config.save_mask,
            save_bbox: config.save_bbox,
        };
        let mut report = SetReport {
            set_index,
            offset,
            patch_size: (patch.width(), patch.height()),
            images_written: 0,
            labels_written: 0,
            pairs_skipped: 0,
            unconstrained_placement,
        };

        for (frame_index, (background, smoke_frame)) in backgrounds.iter().zip(patch.frames()).enumerate() {
            if *cancel.borrow() {
                info!(set = set_index, frame = frame_index, "set cancelled");
                return Err(SynthError::Cancelled);
            }
            for compositor in &compositors {
                let key = SampleKey {
                    method: compositor.name(),
                    set_index,
                    frame_index,
                    split,
                };
                match compositor.blend(background, smoke_frame, offset) {
                    Ok(composite) => {
                        if self.writer.write(&key, &composite, options)? {
                            report.labels_written += 1;
                        }
                        report.images_written += 1;
                    }
                    Err(e) if e.is_recoverable() => {
                        warn!(set = set_index, frame = frame_index, method = key.method, error = %e, "frame pair skipped");
                        report.pairs_skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(
            set = set_index,
            images = report.images_written,
            labels = report.labels_written,
            skipped = report.pairs_skipped,
            "set complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::boundary::Boundary;
    use crate::core_modules::mask::Mask;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Records every key it is asked to write.
    #[derive(Default)]
    struct RecordingWriter {
        keys: Mutex<Vec<SampleKey>>,
        masks: Mutex<Vec<Mask>>,
    }

    impl DatasetWriter for RecordingWriter {
        fn write(&self, key: &SampleKey, composite: &Composite, options: WriteOptions) -> SynthResult<bool> {
            self.keys.lock().unwrap().push(key.clone());
            self.masks.lock().unwrap().push(composite.mask.clone());
            Ok(options.save_bbox)
        }
    }

    /// Sky above a fixed row, regardless of the frame.
    struct FixedHorizon(u32);

    impl SkyDetector for FixedHorizon {
        fn detect(&self, frame: &Frame) -> SynthResult<SkyMask> {
            Ok(Boundary::flat(frame.width(), self.0, frame.height()).to_sky_mask())
        }
    }

    struct NoHorizon;

    impl SkyDetector for NoHorizon {
        fn detect(&self, _frame: &Frame) -> SynthResult<SkyMask> {
            Err(SynthError::NoBoundaryFound)
        }
    }

    fn smoke_clip(frames: usize) -> Vec<Frame> {
        (0..frames)
            .map(|_| {
                RgbImage::from_fn(50, 40, |x, y| {
                    if (10..30).contains(&x) && (10..30).contains(&y) { Rgb([240, 240, 240]) } else { Rgb([0, 0, 0]) }
                })
            })
            .collect()
    }

    fn background_clip(frames: usize) -> Vec<Frame> {
        (0..frames).map(|_| RgbImage::from_pixel(120, 80, Rgb([60, 90, 50]))).collect()
    }

    fn config() -> SetConfig {
        SetConfig {
            fx: 1.0,
            fy: 1.0,
            smoke_offset: 0,
            smoke_speed: 1,
            save_bbox: true,
            ..SetConfig::default()
        }
    }

    fn builder(detector: Arc<dyn SkyDetector>, writer: Arc<RecordingWriter>) -> SetBuilder {
        SetBuilder::new(detector, writer, PoissonConfig::default())
    }

    #[test]
    fn every_pair_blended_by_both_methods() {
        let writer = Arc::new(RecordingWriter::default());
        let builder = builder(Arc::new(FixedHorizon(30)), writer.clone());
        let (_tx, cancel) = watch::channel(false);
        let mut rng = StdRng::seed_from_u64(3);

        let report = builder
            .build_set(4, &smoke_clip(5), &background_clip(3), &config(), &mut rng, &cancel)
            .expect("set builds");

        // Three pairs (zip stops at the shorter clip), two methods each.
        assert_eq!(report.images_written, 6);
        assert_eq!(report.labels_written, 6);
        assert_eq!(report.patch_size, (20, 20));
        assert!(report.offset.dy < 30);
        assert!(!report.unconstrained_placement);

        let keys = writer.keys.lock().unwrap();
        assert_eq!(keys[0].method, "flat_alpha");
        assert_eq!(keys[1].method, "seamless");
        assert!(keys.iter().all(|k| k.set_index == 4 && k.split == Split::Train));
        // One offset for the whole set: every mask has the same bounding box.
        let masks = writer.masks.lock().unwrap();
        let flat_boxes: Vec<_> = masks.iter().step_by(2).map(|m| m.bounding_box()).collect();
        assert!(flat_boxes.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn oversized_patch_skips_set() {
        let writer = Arc::new(RecordingWriter::default());
        let builder = builder(Arc::new(FixedHorizon(30)), writer.clone());
        let (_tx, cancel) = watch::channel(false);
        let mut rng = StdRng::seed_from_u64(3);
        let small_backgrounds: Vec<Frame> = (0..2).map(|_| RgbImage::new(20, 60)).collect();

        let err = builder
            .build_set(0, &smoke_clip(2), &small_backgrounds, &config(), &mut rng, &cancel)
            .unwrap_err();
        assert!(matches!(err, SynthError::PatchOutOfBounds { .. }));
        assert!(err.is_recoverable());
        assert!(writer.keys.lock().unwrap().is_empty());
    }

    #[test]
    fn dark_smoke_skips_set() {
        let writer = Arc::new(RecordingWriter::default());
        let builder = builder(Arc::new(FixedHorizon(30)), writer);
        let (_tx, cancel) = watch::channel(false);
        let mut rng = StdRng::seed_from_u64(3);
        let dark: Vec<Frame> = (0..3).map(|_| RgbImage::new(50, 40)).collect();
        assert!(matches!(
            builder.build_set(0, &dark, &background_clip(3), &config(), &mut rng, &cancel),
            Err(SynthError::DegenerateSmokePatch)
        ));
    }

    #[test]
    fn horizon_on_top_row_skips_set() {
        let writer = Arc::new(RecordingWriter::default());
        let builder = builder(Arc::new(FixedHorizon(1)), writer.clone());
        let (_tx, cancel) = watch::channel(false);
        let mut rng = StdRng::seed_from_u64(3);
        let err = builder
            .build_set(0, &smoke_clip(2), &background_clip(2), &config(), &mut rng, &cancel)
            .unwrap_err();
        assert!(matches!(err, SynthError::NoPlacementFound { attempts: 32 }));
        assert!(err.is_recoverable());
        assert!(writer.keys.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_horizon_falls_back_to_anywhere() {
        let writer = Arc::new(RecordingWriter::default());
        let builder = builder(Arc::new(NoHorizon), writer);
        let (_tx, cancel) = watch::channel(false);
        let mut rng = StdRng::seed_from_u64(9);
        let report = builder
            .build_set(1, &smoke_clip(2), &background_clip(2), &config(), &mut rng, &cancel)
            .expect("set builds");
        assert!(report.unconstrained_placement);
        assert!(report.offset.fits(20, 20, 120, 80));
    }

    #[test]
    fn cancelled_before_first_pair() {
        let writer = Arc::new(RecordingWriter::default());
        let builder = builder(Arc::new(FixedHorizon(30)), writer.clone());
        let (tx, cancel) = watch::channel(false);
        tx.send(true).expect("receiver alive");
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            builder.build_set(0, &smoke_clip(2), &background_clip(2), &config(), &mut rng, &cancel),
            Err(SynthError::Cancelled)
        ));
        assert!(writer.keys.lock().unwrap().is_empty());
    }
}
