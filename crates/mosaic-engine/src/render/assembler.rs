//! Scene walk that fills the batch buffer.

use std::collections::HashMap;

use crate::assets::{ImageKey, ImageState, ImageStore};
use crate::cache::CacheRecord;
use crate::coords::{Matrix2D, Rect, Vec2};
use crate::error::{RenderError, Result};
use crate::scene::{NodeId, NodeKind, Scene, TextLeaf, UvRect};
use crate::text::FontSystem;

use super::backend::Backend;
use super::batch::{BatchBuffer, BatchReason};
use super::dispatcher::{DrawDispatcher, DrawTarget};
use super::slots::TextureSlots;

/// What is known about an image when a card needs it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum ImageStatus {
    Sized(u32, u32),
    Pending,
    Failed,
}

/// Looks up the size of `key`, starting its load on first sight.
pub(crate) fn image_status(key: &ImageKey, slots: Option<&TextureSlots>, images: &mut ImageStore) -> ImageStatus {
    if let Some((w, h)) = slots.and_then(|s| s.texture_size(key)) {
        return ImageStatus::Sized(w, h);
    }
    match images.request(key) {
        ImageState::Ready => match images.size(key) {
            Some((w, h)) => ImageStatus::Sized(w, h),
            None => ImageStatus::Failed,
        },
        ImageState::Pending => ImageStatus::Pending,
        ImageState::Failed => ImageStatus::Failed,
    }
}

/// Rasterizes a text leaf into the image store once; returns its image key.
pub(crate) fn text_image(leaf: &TextLeaf, fonts: &FontSystem, images: &mut ImageStore) -> Option<ImageKey> {
    let key = FontSystem::text_key(&leaf.text, leaf.font, leaf.size, leaf.color);
    if images.state(&key).is_none() {
        let pixels = fonts.rasterize_line(&leaf.text, leaf.font, leaf.size, leaf.color)?;
        images.insert(key.clone(), pixels);
    }
    Some(key)
}

/// Corners of the local quad `(l, t, r, b)` under `m`, in card order
/// (top-left, bottom-left, top-right, bottom-right).
pub(crate) fn card_corners(m: &Matrix2D, (l, t, r, b): (f32, f32, f32, f32)) -> [Vec2; 4] {
    [m.transform_point(l, t), m.transform_point(l, b), m.transform_point(r, t), m.transform_point(r, b)]
}

/// Walks a scene depth-first and turns drawable nodes into cards, flushing
/// through the dispatcher whenever the batch runs out of room or slots.
pub struct BatchAssembler<'a> {
    pub backend: &'a mut dyn Backend,
    pub slots: &'a mut TextureSlots,
    pub images: &'a mut ImageStore,
    pub fonts: &'a FontSystem,
    pub batch: &'a mut BatchBuffer,
    pub dispatcher: &'a mut DrawDispatcher,
    pub caches: &'a HashMap<NodeId, CacheRecord>,
    pub to: DrawTarget,
}

impl BatchAssembler<'_> {
    /// Appends `id` and its subtree under the parent's concatenated matrix and alpha.
    pub fn append_subtree(&mut self, scene: &mut Scene, id: NodeId, parent: &Matrix2D, parent_alpha: f32) -> Result<()> {
        let Some(node) = scene.get_mut(id) else { return Err(RenderError::UnknownNode(id)) };
        let t = &node.transform;
        if !node.visible || node.alpha <= 0.0 || parent_alpha <= 0.0 || t.scale_x == 0.0 || t.scale_y == 0.0 {
            return Ok(());
        }
        let m = node.transform.concat(parent);
        node.concatenated = m;
        let alpha = parent_alpha * node.alpha;

        let cached = self
            .caches
            .get(&id)
            .filter(|r| r.is_drawable())
            .and_then(|r| Some((r.key().clone(), r.bounds()?)));
        if let Some((key, bounds)) = cached {
            let quad = (bounds.x(), bounds.y(), bounds.max().x, bounds.max().y);
            return self.isolate(id, |a| a.push_card(&key, card_corners(&m, quad), UvRect::FULL, alpha));
        }

        self.append_content(scene, id, &m, alpha)
    }

    /// Appends what `id` draws itself plus its children, with `m` as the
    /// node's matrix. The node's own cache is ignored; this is how a cache
    /// renders its target.
    pub fn append_content(&mut self, scene: &mut Scene, id: NodeId, m: &Matrix2D, alpha: f32) -> Result<()> {
        let Some(node) = scene.get_mut(id) else { return Err(RenderError::UnknownNode(id)) };
        match &mut node.kind {
            NodeKind::Container | NodeKind::Foreign => {}
            NodeKind::Textured(frame) => {
                let key = frame.image.clone();
                let uv = match image_status(&key, Some(&*self.slots), self.images) {
                    ImageStatus::Sized(w, h) => frame.uv_rect(w, h),
                    // Placeholder until the pixels land; the UV is computed then.
                    ImageStatus::Pending => Some(UvRect::FULL),
                    ImageStatus::Failed => None,
                };
                let quad = frame.local_quad();
                if let Some(uv) = uv {
                    self.isolate(id, |a| a.push_card(&key, card_corners(m, quad), uv, alpha))?;
                }
            }
            NodeKind::RawImage(raw) => {
                let (key, source) = (raw.image.clone(), raw.source_rect);
                self.isolate(id, |a| a.push_image(&key, source, m, alpha))?;
            }
            NodeKind::Text(leaf) => {
                if let Some(key) = text_image(leaf, self.fonts, self.images) {
                    self.isolate(id, |a| a.push_image(&key, None, m, alpha))?;
                }
            }
        }

        let children = scene.children(id).to_vec();
        for child in children {
            self.append_subtree(scene, child, m, alpha)?;
        }
        Ok(())
    }

    /// Flushes what is left at the end of a walk.
    pub fn finish(&mut self) -> Result<()> {
        self.flush(BatchReason::DrawFinish)
    }

    /// Backend failures abort the walk; anything else only drops the node.
    fn isolate(&mut self, id: NodeId, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        match f(self) {
            Err(e @ RenderError::Backend(_)) => Err(e),
            Err(e) => {
                log::warn!("node {id} skipped: {e}");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// An image drawn at the local origin, optionally cropped.
    fn push_image(&mut self, key: &ImageKey, source: Option<Rect>, m: &Matrix2D, alpha: f32) -> Result<()> {
        let (w, h) = match image_status(key, Some(&*self.slots), self.images) {
            ImageStatus::Sized(w, h) if w > 0 && h > 0 => (w, h),
            ImageStatus::Sized(..) => return Err(RenderError::ImageSize(key.clone())),
            ImageStatus::Pending | ImageStatus::Failed => return Ok(()),
        };
        let (uv, size) = match source {
            Some(r) => (UvRect::from_pixels(r, w, h).ok_or_else(|| RenderError::ImageSize(key.clone()))?, r.size),
            None => (UvRect::FULL, Vec2::new(w as f32, h as f32)),
        };
        self.push_card(key, card_corners(m, (0.0, 0.0, size.x, size.y)), uv, alpha)
    }

    fn push_card(&mut self, key: &ImageKey, corners: [Vec2; 4], uv: UvRect, alpha: f32) -> Result<()> {
        if self.batch.is_full() {
            self.flush(BatchReason::VertexOverflow)?;
        }
        let slot = match self.acquire(key) {
            Err(RenderError::SlotsExhausted) => {
                self.flush(BatchReason::TextureOverflow)?;
                self.acquire(key)?
            }
            other => other?,
        };
        self.batch.push_card(corners, uv, slot, alpha);
        Ok(())
    }

    fn acquire(&mut self, key: &ImageKey) -> Result<usize> {
        let (batch_id, draw_id) = (self.dispatcher.batch_id(), self.dispatcher.draw_id());
        self.slots.acquire(key, batch_id, draw_id, self.images, self.backend)
    }

    fn flush(&mut self, reason: BatchReason) -> Result<()> {
        self.dispatcher.flush(reason, self.batch, self.slots, self.backend, self.to)
    }
}
