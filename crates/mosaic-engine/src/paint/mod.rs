//! Color handling for clear colors and text fills.

mod color;

pub use color::Color;
