//! Asynchronous image sources.
//!
//! A loader is handed a key and a completion sender. It may answer on any
//! thread at any time; the render thread drains completions once per update.

use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;

use crossbeam_channel::Sender;
use thiserror::Error;

use super::{ImageKey, PixelBuffer};

#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("image {0} not found")]
    NotFound(ImageKey),
    #[error("failed to read {key}: {message}")]
    Io { key: ImageKey, message: String },
    #[error("failed to decode {key}: {message}")]
    Decode { key: ImageKey, message: String },
}

/// Completion message for one load request.
#[derive(Debug)]
pub struct LoadEvent {
    pub key: ImageKey,
    pub result: Result<PixelBuffer, LoadError>,
}

pub trait ImageLoader: Send {
    /// Starts loading `key`. Exactly one event must eventually be sent on `done`.
    fn load(&mut self, key: ImageKey, done: Sender<LoadEvent>);
}

/// Serves images from an in-memory table. Completions are sent immediately,
/// so they become visible on the next `poll`.
#[derive(Default)]
pub struct MemoryLoader {
    images: HashMap<ImageKey, PixelBuffer>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, key: impl Into<ImageKey>, pixels: PixelBuffer) -> Self {
        self.insert(key, pixels);
        self
    }

    pub fn insert(&mut self, key: impl Into<ImageKey>, pixels: PixelBuffer) {
        self.images.insert(key.into(), pixels);
    }
}

impl ImageLoader for MemoryLoader {
    fn load(&mut self, key: ImageKey, done: Sender<LoadEvent>) {
        let result = self.images.get(&key).cloned().ok_or_else(|| LoadError::NotFound(key.clone()));
        // A dropped receiver means the store is gone; nothing left to notify.
        let _ = done.send(LoadEvent { key, result });
    }
}

/// Reads and decodes files relative to `root` on a worker thread per request.
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageLoader for FileLoader {
    fn load(&mut self, key: ImageKey, done: Sender<LoadEvent>) {
        let path = self.root.join(key.as_str());
        let spawned = thread::Builder::new()
            .name(format!("mosaic-load:{key}"))
            .spawn({
                let key = key.clone();
                let done = done.clone();
                move || {
                    let result = decode_file(&key, &path);
                    let _ = done.send(LoadEvent { key, result });
                }
            });

        if let Err(e) = spawned {
            let _ = done.send(LoadEvent {
                key: key.clone(),
                result: Err(LoadError::Io { key, message: e.to_string() }),
            });
        }
    }
}

fn decode_file(key: &ImageKey, path: &std::path::Path) -> Result<PixelBuffer, LoadError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(key.clone()),
        _ => LoadError::Io { key: key.clone(), message: e.to_string() },
    })?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| LoadError::Decode { key: key.clone(), message: e.to_string() })?;
    Ok(PixelBuffer::from_image(img))
}
