//! Font loading and single-line glyph rasterization for text leaves.

mod font_system;

pub use font_system::{FontId, FontLoadError, FontSystem};
