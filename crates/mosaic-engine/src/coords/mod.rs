//! Geometry shared by the scene graph, the batch assembler and cache surfaces.
//!
//! Canonical space:
//! - stage pixels
//! - origin top-left
//! - +X right, +Y down
//!
//! The batch shader converts to clip space with `Viewport::projection`.

mod matrix;
mod rect;
mod vec2;
mod viewport;

pub use matrix::Matrix2D;
pub use rect::Rect;
pub use vec2::Vec2;
pub use viewport::Viewport;
