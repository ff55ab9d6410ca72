// THEORY:
// A frame source hands the synthesizer an ordered, finite sequence of decoded
// frames, each already resized to a caller-chosen maximum side. The core never
// decodes anything itself.
//
// `ImageSequenceSource` is the concrete source used by the dataset binary: a
// "clip" is a directory of still images, ordered by file name (the layout
// `ffmpeg -i clip.mp4 %05d.png` produces). A collection of clips is a directory
// of such directories.

use crate::core_modules::frame::Frame;
use crate::error::{SynthError, SynthResult};
use image::imageops::{self, FilterType};
use std::path::{Path, PathBuf};
use tracing::debug;

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// Produces the frames of one clip.
pub trait FrameSource: Send + Sync {
    /// Human-readable identifier for logs.
    fn name(&self) -> String;

    fn frames(&self) -> SynthResult<Vec<Frame>>;
}

/// A directory of still frames, read in file-name order.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    size_max: u32,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>, size_max: u32) -> Self {
        Self {
            dir: dir.into(),
            size_max,
        }
    }

    /// Every subdirectory of `root`, sorted, as a clip.
    pub fn discover(root: impl AsRef<Path>, size_max: u32) -> SynthResult<Vec<Self>> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(root.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs.into_iter().map(|dir| Self::new(dir, size_max)).collect())
    }

    fn frame_paths(&self) -> SynthResult<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl FrameSource for ImageSequenceSource {
    fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    fn frames(&self) -> SynthResult<Vec<Frame>> {
        let paths = self.frame_paths()?;
        if paths.is_empty() {
            return Err(SynthError::invalid_image(format!(
                "no frames found in {}",
                self.dir.display()
            )));
        }
        let frames = paths
            .iter()
            .map(|path| Ok(resize_max(&image::open(path)?.to_rgb8(), self.size_max)))
            .collect::<SynthResult<Vec<_>>>()?;
        debug!(clip = %self.name(), frames = frames.len(), "loaded clip");
        Ok(frames)
    }
}

/// Resizes so the larger side equals `size_max`, keeping the aspect ratio.
pub fn resize_max(frame: &Frame, size_max: u32) -> Frame {
    let (w, h) = frame.dimensions();
    let longest = w.max(h);
    if longest == 0 || longest == size_max {
        return frame.clone();
    }
    let scale = size_max as f64 / longest as f64;
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    imageops::resize(frame, nw, nh, FilterType::Triangle)
}
