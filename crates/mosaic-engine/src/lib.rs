//! Mosaic engine crate.
//!
//! A retained 2D scene graph drawn by a batching GPU renderer, with offscreen
//! caching of subtrees and CPU-side filters on cached surfaces.

pub mod assets;
pub mod cache;
pub mod coords;
pub mod device;
pub mod error;
pub mod logging;
pub mod paint;
pub mod render;
pub mod scene;
pub mod text;

pub use error::{RenderError, Result};
