//! Image identities, CPU pixel buffers and asynchronous loading.

mod key;
pub mod loader;
mod pixels;
mod store;

pub use key::ImageKey;
pub use loader::{FileLoader, ImageLoader, LoadError, LoadEvent, MemoryLoader};
pub use pixels::PixelBuffer;
pub use store::{ImageState, ImageStore};
