use std::collections::HashMap;

use crate::assets::{ImageKey, ImageState, ImageStore, PixelBuffer};
use crate::error::{RenderError, Result};

use super::backend::{Backend, TextureId};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlotState {
    Empty,
    /// Bound, but the image is still loading; the slot samples the placeholder.
    Pending,
    Ready,
}

#[derive(Debug, Clone)]
struct Slot {
    key: Option<ImageKey>,
    state: SlotState,
    last_batch: Option<u64>,
    protected: bool,
}

impl Slot {
    const EMPTY: Slot = Slot { key: None, state: SlotState::Empty, last_batch: None, protected: false };
}

#[derive(Debug)]
struct StoredTexture {
    id: TextureId,
    width: u32,
    height: u32,
    last_draw: u64,
    /// Owned by someone else (a cache surface); never deleted here.
    external: bool,
}

/// Maps image identities onto a fixed set of texture units.
///
/// The table is sized once and only ever rebound. GPU textures outlive slot
/// bindings: an image evicted from a slot keeps its texture until purged or
/// cleared, so rebinding it later costs no upload.
pub struct TextureSlots {
    slots: Vec<Slot>,
    textures: HashMap<ImageKey, StoredTexture>,
    placeholder: TextureId,
    last_insert: usize,
}

impl TextureSlots {
    /// Creates `count` empty slots and the shared 1x1 transparent placeholder.
    pub fn new(count: usize, backend: &mut dyn Backend) -> Result<Self> {
        let placeholder = backend.create_texture(1, 1)?;
        backend.write_texture(placeholder, &PixelBuffer::new(1, 1))?;
        Ok(Self {
            slots: vec![Slot::EMPTY; count.max(1)],
            textures: HashMap::new(),
            placeholder,
            // Start so the first scan begins at slot 0.
            last_insert: count.max(1) - 1,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn placeholder(&self) -> TextureId {
        self.placeholder
    }

    pub fn slot_of(&self, key: &ImageKey) -> Option<usize> {
        self.slots.iter().position(|s| s.key.as_ref() == Some(key))
    }

    pub fn state(&self, slot: usize) -> SlotState {
        self.slots.get(slot).map_or(SlotState::Empty, |s| s.state)
    }

    pub fn key(&self, slot: usize) -> Option<&ImageKey> {
        self.slots.get(slot).and_then(|s| s.key.as_ref())
    }

    /// Returns the slot holding `key` for the batch `batch_id`, binding it if needed.
    ///
    /// A new binding starts the image load on first sight and returns at once;
    /// the slot samples the placeholder until the load lands. Fails with
    /// [`RenderError::SlotsExhausted`] when every unprotected slot already
    /// serves `batch_id`: the caller flushes and retries.
    pub fn acquire(
        &mut self,
        key: &ImageKey,
        batch_id: u64,
        draw_id: u64,
        images: &mut ImageStore,
        backend: &mut dyn Backend,
    ) -> Result<usize> {
        if let Some(i) = self.slot_of(key) {
            self.slots[i].last_batch = Some(batch_id);
            if self.slots[i].state == SlotState::Pending {
                self.refresh(i, images, backend)?;
            }
            self.touch(key, draw_id);
            return Ok(i);
        }

        let i = self.choose_slot(batch_id).ok_or(RenderError::SlotsExhausted)?;
        if let Some(old) = &self.slots[i].key {
            log::trace!("slot {i}: evicting {old} for {key}");
        }
        self.slots[i] = Slot {
            key: Some(key.clone()),
            state: SlotState::Pending,
            last_batch: Some(batch_id),
            protected: self.slots[i].protected,
        };
        self.last_insert = i;
        self.refresh(i, images, backend)?;
        self.touch(key, draw_id);
        Ok(i)
    }

    /// Round-robin scan after the last insert. Slots serving the current batch
    /// and protected slots are skipped; an empty slot wins, otherwise the one
    /// with the oldest batch.
    fn choose_slot(&self, batch_id: u64) -> Option<usize> {
        let n = self.slots.len();
        let mut best: Option<(usize, u64)> = None;
        for step in 1..=n {
            let i = (self.last_insert + step) % n;
            let slot = &self.slots[i];
            if slot.protected || slot.last_batch == Some(batch_id) {
                continue;
            }
            if slot.key.is_none() {
                return Some(i);
            }
            let age = slot.last_batch.unwrap_or(0);
            if best.is_none_or(|(_, b)| age < b) {
                best = Some((i, age));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Makes sure the bound image has a texture if its pixels are available.
    fn refresh(&mut self, slot: usize, images: &mut ImageStore, backend: &mut dyn Backend) -> Result<()> {
        let Some(key) = self.slots[slot].key.clone() else { return Ok(()) };
        let ready = self.textures.contains_key(&key) || match images.request(&key) {
            ImageState::Ready => self.upload(&key, images, backend)?,
            ImageState::Pending | ImageState::Failed => false,
        };
        self.slots[slot].state = if ready { SlotState::Ready } else { SlotState::Pending };
        Ok(())
    }

    fn upload(&mut self, key: &ImageKey, images: &ImageStore, backend: &mut dyn Backend) -> Result<bool> {
        let Some(pixels) = images.get(key) else { return Ok(false) };
        if pixels.is_empty() {
            log::warn!("image {key} has no pixels; keeping placeholder");
            return Ok(false);
        }
        let id = backend.create_texture(pixels.width(), pixels.height())?;
        backend.write_texture(id, pixels)?;
        log::debug!("texture {id:?}: uploaded {key} ({}x{})", pixels.width(), pixels.height());
        self.textures.insert(
            key.clone(),
            StoredTexture { id, width: pixels.width(), height: pixels.height(), last_draw: 0, external: false },
        );
        Ok(true)
    }

    fn touch(&mut self, key: &ImageKey, draw_id: u64) {
        if let Some(t) = self.textures.get_mut(key) {
            t.last_draw = draw_id;
        }
    }

    /// Applies finished loads: any slot bound to a newly ready image gets its texture.
    pub fn poll_loads(&mut self, images: &mut ImageStore, backend: &mut dyn Backend) -> Result<()> {
        for key in images.poll() {
            if self.textures.contains_key(&key) {
                continue;
            }
            let bound: Vec<usize> = (0..self.slots.len())
                .filter(|&i| self.slots[i].key.as_ref() == Some(&key))
                .collect();
            if bound.is_empty() {
                continue;
            }
            let ready = self.upload(&key, images, backend)?;
            for i in bound {
                self.slots[i].state = if ready { SlotState::Ready } else { SlotState::Pending };
            }
        }
        Ok(())
    }

    /// Registers a texture owned elsewhere (a cache surface) under `key`.
    pub fn register_texture(&mut self, key: ImageKey, id: TextureId, width: u32, height: u32) {
        let last_draw = self.textures.get(&key).map_or(0, |t| t.last_draw);
        self.textures.insert(key.clone(), StoredTexture { id, width, height, last_draw, external: true });
        if let Some(i) = self.slot_of(&key) {
            self.slots[i].state = SlotState::Ready;
        }
    }

    /// Forgets an externally owned texture and frees its slot.
    pub fn unregister_texture(&mut self, key: &ImageKey) {
        if self.textures.get(key).is_some_and(|t| t.external) {
            self.textures.remove(key);
        }
        self.release(key);
    }

    /// Unbinds `key`; the slot returns to the placeholder and may be reused.
    pub fn release(&mut self, key: &ImageKey) -> bool {
        let Some(i) = self.slot_of(key) else { return false };
        let protected = self.slots[i].protected;
        self.slots[i] = Slot { protected, ..Slot::EMPTY };
        true
    }

    /// Unbinds `key`, deletes its texture and forgets its pixels so the next
    /// use reloads the image from its source.
    pub fn clear_image_texture(&mut self, key: &ImageKey, images: &mut ImageStore, backend: &mut dyn Backend) {
        self.release(key);
        if let Some(t) = self.textures.remove(key) {
            if t.external {
                self.textures.insert(key.clone(), t);
                return;
            }
            backend.delete_texture(t.id);
        }
        images.remove(key);
    }

    /// Excludes `slot` from reassignment while `locked`.
    pub fn protect(&mut self, slot: usize, locked: bool) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.protected = locked;
        }
    }

    pub fn is_protected(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|s| s.protected)
    }

    /// Deletes owned textures unused for `max_idle_draws` draws. Returns how many.
    pub fn purge(&mut self, max_idle_draws: u64, draw_id: u64, backend: &mut dyn Backend) -> usize {
        let stale: Vec<ImageKey> = self
            .textures
            .iter()
            .filter(|(_, t)| !t.external && t.last_draw + max_idle_draws <= draw_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.release(key);
            if let Some(t) = self.textures.remove(key) {
                backend.delete_texture(t.id);
            }
        }
        if !stale.is_empty() {
            log::debug!("purged {} idle textures at draw {draw_id}", stale.len());
        }
        stale.len()
    }

    /// Texture to bind on each unit, in slot order. Unready slots and `exclude`
    /// (the current render target) resolve to the placeholder.
    pub fn bound_textures(&self, exclude: Option<TextureId>) -> Vec<TextureId> {
        self.slots
            .iter()
            .map(|s| {
                let id = match (&s.key, s.state) {
                    (Some(key), SlotState::Ready) => self.textures.get(key).map(|t| t.id),
                    _ => None,
                };
                match id {
                    Some(id) if Some(id) != exclude => id,
                    _ => self.placeholder,
                }
            })
            .collect()
    }

    pub fn texture_size(&self, key: &ImageKey) -> Option<(u32, u32)> {
        self.textures.get(key).map(|t| (t.width, t.height))
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Deletes every owned texture and the placeholder.
    pub fn dispose(&mut self, backend: &mut dyn Backend) {
        for (_, t) in self.textures.drain() {
            if !t.external {
                backend.delete_texture(t.id);
            }
        }
        backend.delete_texture(self.placeholder);
        self.slots.fill(Slot::EMPTY);
    }
}
