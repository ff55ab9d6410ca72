// THEORY:
// Every failure the synthesizer can raise is one variant of `SynthError`. The
// core kinds (`InvalidImage`, `NoBoundaryFound`, `NoPlacementFound`,
// `DegenerateSmokePatch`) are local to a single frame or a single set: the
// orchestration layer skips the unit of work and carries on with the batch.
// Only configuration and I/O problems are worth aborting a run for, and even
// those are decided by the caller, never by the core.

use thiserror::Error;

/// Result type for synthesis operations.
pub type SynthResult<T> = Result<T, SynthError>;

/// Errors that can occur while detecting sky, placing, or compositing smoke.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No threshold produced a non-degenerate sky/ground partition")]
    NoBoundaryFound,

    #[error("No valid placement found after {attempts} attempts")]
    NoPlacementFound { attempts: usize },

    #[error("Smoke patch has no pixel above the brightness threshold")]
    DegenerateSmokePatch,

    #[error(
        "Patch {patch_width}x{patch_height} at ({dx}, {dy}) does not fit in a {width}x{height} background"
    )]
    PatchOutOfBounds {
        dx: u32,
        dy: u32,
        patch_width: u32,
        patch_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Depth estimation failed: {0}")]
    DepthEstimation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl SynthError {
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage(message.into())
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// True for the kinds a batch run skips past instead of aborting on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidImage(_)
                | Self::NoBoundaryFound
                | Self::NoPlacementFound { .. }
                | Self::DegenerateSmokePatch
                | Self::PatchOutOfBounds { .. }
                | Self::DepthEstimation(_)
        )
    }
}
