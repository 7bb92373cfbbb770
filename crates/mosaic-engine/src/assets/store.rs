use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};

use super::loader::{ImageLoader, LoadEvent};
use super::{ImageKey, PixelBuffer};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ImageState {
    Pending,
    Ready,
    Failed,
}

struct Entry {
    state: ImageState,
    pixels: Option<PixelBuffer>,
}

/// CPU-side image table fed by an [`ImageLoader`].
///
/// `request` starts a load the first time a key is seen; completions are
/// applied by `poll`, which the stage calls once at the start of each update.
pub struct ImageStore {
    loader: Box<dyn ImageLoader>,
    tx: Sender<LoadEvent>,
    rx: Receiver<LoadEvent>,
    entries: HashMap<ImageKey, Entry>,
}

impl ImageStore {
    pub fn new(loader: impl ImageLoader + 'static) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            loader: Box::new(loader),
            tx,
            rx,
            entries: HashMap::new(),
        }
    }

    /// Returns the image state, starting a load if the key was never requested.
    pub fn request(&mut self, key: &ImageKey) -> ImageState {
        if let Some(entry) = self.entries.get(key) {
            return entry.state;
        }
        log::debug!("image {key}: load requested");
        self.entries.insert(key.clone(), Entry { state: ImageState::Pending, pixels: None });
        self.loader.load(key.clone(), self.tx.clone());
        ImageState::Pending
    }

    /// Registers pixels that need no loading (rasterized text, cache surfaces).
    pub fn insert(&mut self, key: ImageKey, pixels: PixelBuffer) {
        self.entries.insert(key, Entry { state: ImageState::Ready, pixels: Some(pixels) });
    }

    /// Applies finished loads. Returns the keys that became ready.
    pub fn poll(&mut self) -> Vec<ImageKey> {
        let mut ready = Vec::new();
        while let Ok(ev) = self.rx.try_recv() {
            // A key removed while its load was in flight stays removed.
            let Some(entry) = self.entries.get_mut(&ev.key) else { continue };
            match ev.result {
                Ok(pixels) => {
                    log::debug!("image {}: loaded {}x{}", ev.key, pixels.width(), pixels.height());
                    entry.state = ImageState::Ready;
                    entry.pixels = Some(pixels);
                    ready.push(ev.key);
                }
                Err(e) => {
                    log::warn!("{e}");
                    entry.state = ImageState::Failed;
                }
            }
        }
        ready
    }

    pub fn state(&self, key: &ImageKey) -> Option<ImageState> {
        self.entries.get(key).map(|e| e.state)
    }

    pub fn get(&self, key: &ImageKey) -> Option<&PixelBuffer> {
        self.entries.get(key).and_then(|e| e.pixels.as_ref())
    }

    pub fn size(&self, key: &ImageKey) -> Option<(u32, u32)> {
        self.get(key).map(|p| (p.width(), p.height()))
    }

    /// Forgets the image; the next `request` loads it again.
    pub fn remove(&mut self, key: &ImageKey) -> bool {
        self.entries.remove(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryLoader;

    fn store() -> ImageStore {
        ImageStore::new(MemoryLoader::new().with_image("hero.png", PixelBuffer::new(8, 4)))
    }

    #[test]
    fn request_is_pending_until_polled() {
        let mut s = store();
        let key = ImageKey::from("hero.png");
        assert_eq!(s.request(&key), ImageState::Pending);
        assert!(s.get(&key).is_none());

        assert_eq!(s.poll(), vec![key.clone()]);
        assert_eq!(s.request(&key), ImageState::Ready);
        assert_eq!(s.size(&key), Some((8, 4)));
    }

    #[test]
    fn failed_load_is_not_retried() {
        let mut s = store();
        let key = ImageKey::from("nope.png");
        s.request(&key);
        assert!(s.poll().is_empty());
        assert_eq!(s.request(&key), ImageState::Failed);
    }

    #[test]
    fn removed_key_reloads() {
        let mut s = store();
        let key = ImageKey::from("hero.png");
        s.request(&key);
        s.poll();
        assert!(s.remove(&key));
        assert_eq!(s.request(&key), ImageState::Pending);
    }

    #[test]
    fn completion_for_removed_key_is_dropped() {
        let mut s = store();
        let key = ImageKey::from("hero.png");
        s.request(&key);
        s.remove(&key);
        assert!(s.poll().is_empty());
        assert!(s.state(&key).is_none());
    }
}
