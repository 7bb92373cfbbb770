mod alpha_mask;
mod blur;
mod color;
mod color_matrix;

pub use alpha_mask::AlphaMaskFilter;
pub use blur::BlurFilter;
pub use color::ColorFilter;
pub use color_matrix::ColorMatrixFilter;
