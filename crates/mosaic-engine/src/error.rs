use thiserror::Error;

use crate::assets::ImageKey;
use crate::scene::NodeId;

/// Errors raised by stage, slot and cache operations.
///
/// Initialization paths (`Gpu::new`, `Stage::new`) wrap these in `anyhow`
/// with context; per-frame paths return them directly.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no GPU device available: {0}")]
    NoDevice(String),

    #[error("shader program with {slots} texture slots failed to compile: {message}")]
    ShaderCompile { slots: usize, message: String },

    #[error("no symbol to cache")]
    NoTarget,

    #[error("node {0:?} is not part of the scene")]
    UnknownNode(NodeId),

    #[error("define() must be called before update()")]
    CacheNotDefined,

    #[error("pixel readback failed: {0}")]
    Readback(String),

    #[error("every texture slot is already used by the current batch")]
    SlotsExhausted,

    #[error("image {0} has no usable size")]
    ImageSize(ImageKey),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("image encoding failed")]
    Encode(#[from] image::ImageError),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
