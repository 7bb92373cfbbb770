use std::collections::HashMap;

use crate::assets::{ImageKey, ImageStore, PixelBuffer};
use crate::cache::CacheRecord;
use crate::coords::{Matrix2D, Rect};
use crate::scene::{NodeId, NodeKind, Scene, UvRect};
use crate::text::FontSystem;

use super::assembler::{image_status, text_image, ImageStatus};
use super::raster::RasterCanvas;

/// Paints a subtree straight onto a [`RasterCanvas`], one node at a time.
///
/// Raster cache surfaces are drawn this way. Nested caches that keep CPU
/// pixels are drawn from those pixels; any other nested cache is painted
/// from its subtree.
pub struct ImmediatePainter<'a> {
    pub canvas: &'a mut RasterCanvas,
    pub images: &'a mut ImageStore,
    pub fonts: &'a FontSystem,
    pub caches: &'a HashMap<NodeId, CacheRecord>,
}

impl ImmediatePainter<'_> {
    pub fn paint_subtree(&mut self, scene: &mut Scene, id: NodeId, parent: &Matrix2D, parent_alpha: f32) {
        let Some(node) = scene.get_mut(id) else { return };
        let t = &node.transform;
        if !node.visible || node.alpha <= 0.0 || parent_alpha <= 0.0 || t.scale_x == 0.0 || t.scale_y == 0.0 {
            return;
        }
        let m = node.transform.concat(parent);
        let alpha = parent_alpha * node.alpha;

        let caches = self.caches;
        if let Some(record) = caches.get(&id).filter(|r| r.is_drawable()) {
            if let (Some(pixels), Some(b)) = (record.retained_surface().and_then(|s| s.pixels()), record.bounds()) {
                self.canvas.draw_quad(pixels, UvRect::FULL, (b.x(), b.y(), b.max().x, b.max().y), &m, alpha);
                return;
            }
        }
        self.paint_content(scene, id, &m, alpha);
    }

    /// Paints the node itself and its children under `m`, ignoring its own cache.
    pub fn paint_content(&mut self, scene: &mut Scene, id: NodeId, m: &Matrix2D, alpha: f32) {
        let Some(node) = scene.get_mut(id) else { return };
        match &mut node.kind {
            NodeKind::Container | NodeKind::Foreign => {}
            NodeKind::Textured(frame) => {
                if let ImageStatus::Sized(w, h) = image_status(&frame.image, None, self.images) {
                    let quad = frame.local_quad();
                    if let (Some(uv), Some(src)) = (frame.uv_rect(w, h), self.images.get(&frame.image)) {
                        self.canvas.draw_quad(src, uv, quad, m, alpha);
                    }
                }
            }
            NodeKind::RawImage(raw) => {
                let (key, source) = (raw.image.clone(), raw.source_rect);
                self.paint_image(&key, source, m, alpha);
            }
            NodeKind::Text(leaf) => {
                if let Some(key) = text_image(leaf, self.fonts, self.images) {
                    self.paint_image(&key, None, m, alpha);
                }
            }
        }

        let children = scene.children(id).to_vec();
        for child in children {
            self.paint_subtree(scene, child, m, alpha);
        }
    }

    fn paint_image(&mut self, key: &ImageKey, source: Option<Rect>, m: &Matrix2D, alpha: f32) {
        if !matches!(image_status(key, None, self.images), ImageStatus::Sized(..)) {
            return;
        }
        let Some(src) = self.images.get(key) else { return };
        let (w, h) = (src.width(), src.height());
        let Some(uv) = source.map_or(Some(UvRect::FULL), |r| UvRect::from_pixels(r, w, h)) else { return };
        let (qw, qh) = source.map_or((w as f32, h as f32), |r| (r.width(), r.height()));
        self.canvas.draw_quad(src, uv, (0.0, 0.0, qw, qh), m, alpha);
    }
}

/// Paints `id`'s content into a fresh canvas of `width`x`height` under `m`.
pub fn paint_to_pixels(
    scene: &mut Scene,
    id: NodeId,
    m: &Matrix2D,
    size: (u32, u32),
    images: &mut ImageStore,
    fonts: &FontSystem,
) -> PixelBuffer {
    let mut canvas = RasterCanvas::new(size.0, size.1);
    let caches = HashMap::new();
    ImmediatePainter { canvas: &mut canvas, images, fonts, caches: &caches }.paint_content(scene, id, m, 1.0);
    canvas.pixels().clone()
}
