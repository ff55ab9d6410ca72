// THEORY:
// This file is the main entry point for the `smoke_synth` library crate. It
// exposes a layered engine that composites real smoke footage onto real
// background footage below the detected horizon and records where the smoke
// went, producing labeled training data for smoke detectors.
//
// Layers, bottom to top:
// 1.  `core_modules`: pure frame-level algorithms (gradient field, horizon
//     sweep, placement, compositing, labels).
// 2.  `frame_source` / `dataset`: the I/O collaborators that feed frames in
//     and write samples out.
// 3.  `pipeline`: one set, start to finish, with skip-and-continue handling.
// 4.  `parallel_pipeline`: many sets at once on the tokio blocking pool.
//
// Consumers normally only need the re-exports below.

pub mod config;
pub mod core_modules;
pub mod dataset;
pub mod error;
pub mod frame_source;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::{SetConfig, SkyDetectorKind, SynthConfig};
pub use core_modules::compositor::{Composite, Compositor, FlatAlphaCompositor, SeamlessCompositor};
pub use core_modules::depth_sky::{DepthEstimator, DepthSkyDetector};
pub use core_modules::frame::Frame;
pub use core_modules::placement::{PlacementOffset, PlacementSampler};
pub use core_modules::sky_detector::{GradientSkyDetector, SkyDetector};
pub use dataset::{DatasetWriter, DirectoryWriter, Split};
pub use error::{SynthError, SynthResult};
pub use frame_source::{FrameSource, ImageSequenceSource};
pub use parallel_pipeline::{BatchSummary, CancelHandle, ParallelPipeline, SetStatus};
pub use pipeline::{SetBuilder, SetJob, SetReport};
