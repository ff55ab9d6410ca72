// THEORY:
// The dataset writer is the last stop of a frame pair. It receives a finished
// `Composite` and persists it in the layout detector training tools expect:
//
//   {root}/images/{train|val}/{method}_set_{set:03}_{frame:04}.png
//   {root}/labels/{train|val}/{method}_set_{set:03}_{frame:04}.txt   (--save-bbox)
//   {root}/mask/{train|val}/{method}_set_{set:03}_{frame:04}.png     (--save-mask)
//
// Only the occupancy mask crosses from the core into this layer; the label is
// derived here from it. Writers are shared across concurrently running sets,
// so they take `&self` and keep no per-set state.

use crate::core_modules::compositor::Composite;
use crate::core_modules::label::BoundingBoxLabel;
use crate::error::SynthResult;
use std::path::PathBuf;

/// Train/validation partition a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub fn from_train_flag(train: bool) -> Self {
        if train { Split::Train } else { Split::Val }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
        }
    }
}

/// Identifies one written frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleKey {
    pub method: &'static str,
    pub set_index: usize,
    pub frame_index: usize,
    pub split: Split,
}

impl SampleKey {
    pub fn file_stem(&self) -> String {
        format!("{}_set_{:03}_{:04}", self.method, self.set_index, self.frame_index)
    }
}

/// What accompanies the image on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub save_mask: bool,
    pub save_bbox: bool,
}

/// Sink for composited samples.
pub trait DatasetWriter: Send + Sync {
    /// Persists one sample. Returns true when a label was written.
    fn write(&self, key: &SampleKey, composite: &Composite, options: WriteOptions) -> SynthResult<bool>;
}

/// Writes samples as PNG/TXT files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    root: PathBuf,
}

impl DirectoryWriter {
    pub const KINDS: [&'static str; 3] = ["images", "labels", "mask"];

    /// Creates the full directory tree under `root`.
    pub fn create(root: impl Into<PathBuf>) -> SynthResult<Self> {
        let root = root.into();
        for kind in Self::KINDS {
            for split in [Split::Train, Split::Val] {
                std::fs::create_dir_all(root.join(kind).join(split.as_str()))?;
            }
        }
        Ok(Self { root })
    }

    pub fn path_for(&self, kind: &str, key: &SampleKey, extension: &str) -> PathBuf {
        self.root
            .join(kind)
            .join(key.split.as_str())
            .join(format!("{}.{}", key.file_stem(), extension))
    }
}

impl DatasetWriter for DirectoryWriter {
    fn write(&self, key: &SampleKey, composite: &Composite, options: WriteOptions) -> SynthResult<bool> {
        composite.image.save(self.path_for("images", key, "png"))?;
        if options.save_mask {
            composite.mask.to_luma_image().save(self.path_for("mask", key, "png"))?;
        }
        if options.save_bbox {
            if let Some(label) = BoundingBoxLabel::from_mask(&composite.mask) {
                std::fs::write(self.path_for("labels", key, "txt"), format!("{label}\n"))?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
