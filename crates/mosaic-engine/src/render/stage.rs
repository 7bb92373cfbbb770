use std::collections::HashMap;

use anyhow::Context as _;

use crate::assets::{ImageKey, ImageLoader, ImageStore, PixelBuffer};
use crate::cache::{apply_filters, filter_bounds, CacheOptions, CacheRecord, SurfaceTarget};
use crate::coords::{Matrix2D, Rect, Viewport};
use crate::error::{RenderError, Result};
use crate::paint::Color;
use crate::scene::{NodeId, Scene};
use crate::text::{FontId, FontLoadError, FontSystem};

use super::assembler::BatchAssembler;
use super::backend::{Backend, RenderTarget};
use super::batch::{BatchBuffer, BatchStats};
use super::dispatcher::{DrawDispatcher, DrawTarget};
use super::immediate::ImmediatePainter;
use super::program::ProgramBuilder;
use super::raster::CompositeOp;
use super::slots::TextureSlots;

/// Stage configuration.
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Cards (quads) per draw call before a forced flush.
    pub max_cards_per_batch: usize,
    /// Texture units the batch program samples. Clamped to what the backend offers.
    pub texture_slots: usize,
    /// Sources are uploaded premultiplied; the program divides by alpha first.
    pub premultiply: bool,
    /// Purge textures unused for this many draws, checked every half period.
    pub auto_purge: Option<u64>,
    pub clear_color: Color,
    /// Clear the target before every draw.
    pub auto_clear: bool,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            max_cards_per_batch: 10_000,
            texture_slots: 8,
            premultiply: false,
            auto_purge: Some(1200),
            clear_color: Color::transparent(),
            auto_clear: true,
        }
    }
}

/// Owns everything needed to draw a [`Scene`] through a [`Backend`].
///
/// The scene is passed in per call; the stage keeps only per-node cache
/// records, keyed by [`NodeId`], and drops a record once its node is gone.
pub struct Stage<B: Backend> {
    backend: B,
    config: StageConfig,
    slots: TextureSlots,
    images: ImageStore,
    fonts: FontSystem,
    batch: BatchBuffer,
    dispatcher: DrawDispatcher,
    caches: HashMap<NodeId, CacheRecord>,
    viewport: Viewport,
}

impl<B: Backend> Stage<B> {
    /// Builds and compiles the batch program. A program that does not compile
    /// leaves the stage unusable, so it is reported here.
    pub fn new(mut backend: B, loader: impl ImageLoader + 'static, config: StageConfig) -> anyhow::Result<Self> {
        let units = backend.max_texture_units().max(1);
        let slot_count = if config.texture_slots > units {
            log::warn!("{} texture slots requested, backend offers {units}", config.texture_slots);
            units
        } else {
            config.texture_slots.max(1)
        };

        let premultiplied = config.premultiply || backend.premultiplied_textures();
        let source = ProgramBuilder::build_with(slot_count, premultiplied)
            .context("generating batch program")?;
        let program = backend
            .compile_program(&source)
            .with_context(|| format!("compiling batch program with {slot_count} texture slots"))?;
        let slots = TextureSlots::new(slot_count, &mut backend).context("creating placeholder texture")?;
        log::info!(
            "stage ready: {slot_count} texture slots, {} cards per batch",
            config.max_cards_per_batch
        );

        Ok(Self {
            backend,
            batch: BatchBuffer::new(config.max_cards_per_batch),
            config,
            slots,
            images: ImageStore::new(loader),
            fonts: FontSystem::new(),
            dispatcher: DrawDispatcher::new(program),
            caches: HashMap::new(),
            viewport: Viewport::default(),
        })
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn slots(&self) -> &TextureSlots {
        &self.slots
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Counters of the most recent draw.
    pub fn batch_stats(&self) -> &BatchStats {
        self.dispatcher.stats()
    }

    pub fn draw_id(&self) -> u64 {
        self.dispatcher.draw_id()
    }

    // ── frame ──

    /// Draws `scene` to the screen.
    pub fn update(&mut self, scene: &mut Scene) -> Result<()> {
        self.draw(scene, RenderTarget::Screen)
    }

    /// Draws `scene` to `target`: applies finished image loads, clears
    /// (if configured), walks the tree and flushes the last batch.
    pub fn draw(&mut self, scene: &mut Scene, target: RenderTarget) -> Result<()> {
        self.slots.poll_loads(&mut self.images, &mut self.backend)?;
        let draw_id = self.dispatcher.begin_draw();
        self.drop_orphaned_caches(scene);

        let viewport = match target {
            RenderTarget::Screen => self.viewport,
            RenderTarget::Texture(id) => {
                let (w, h) = self
                    .backend
                    .texture_size(id)
                    .ok_or_else(|| RenderError::Backend(format!("draw target {id:?} does not exist")))?;
                Viewport::new(w as f32, h as f32)
            }
        };
        if self.config.auto_clear {
            self.backend.clear(target, self.config.clear_color)?;
        }

        let root = scene.root();
        let to = DrawTarget { target, viewport };
        let walked = self.assembler(to).append_subtree(scene, root, &Matrix2D::IDENTITY, 1.0);
        let result = walked.and_then(|()| self.assembler(to).finish());
        if result.is_err() {
            self.batch.reset();
        }

        if let Some(max_idle) = self.config.auto_purge {
            if draw_id % (max_idle / 2).max(1) == 0 {
                self.purge_textures(max_idle);
            }
        }
        result
    }

    fn assembler(&mut self, to: DrawTarget) -> BatchAssembler<'_> {
        BatchAssembler {
            backend: &mut self.backend,
            slots: &mut self.slots,
            images: &mut self.images,
            fonts: &self.fonts,
            batch: &mut self.batch,
            dispatcher: &mut self.dispatcher,
            caches: &self.caches,
            to,
        }
    }

    pub fn update_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::new(width as f32, height as f32);
        self.backend.resize_screen(width, height);
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.config.clear_color = color;
    }

    /// Accepts `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`. Returns false (and
    /// keeps the old color) on anything else.
    pub fn set_clear_color_hex(&mut self, hex: &str) -> bool {
        match Color::parse_hex(hex) {
            Some(c) => {
                self.config.clear_color = c;
                true
            }
            None => {
                log::warn!("ignoring malformed clear color {hex:?}");
                false
            }
        }
    }

    // ── textures ──

    /// Registers pixels under `key` so nodes can draw them without a load.
    pub fn insert_image(&mut self, key: impl Into<ImageKey>, pixels: PixelBuffer) {
        self.images.insert(key.into(), pixels);
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    /// Drops the texture of `key`; the image is loaded again on next use.
    pub fn clear_image_texture(&mut self, key: &ImageKey) {
        self.slots.clear_image_texture(key, &mut self.images, &mut self.backend);
    }

    /// Deletes textures unused for `max_idle_draws` draws.
    pub fn purge_textures(&mut self, max_idle_draws: u64) -> usize {
        self.slots.purge(max_idle_draws, self.dispatcher.draw_id(), &mut self.backend)
    }

    pub fn protect_texture_slot(&mut self, slot: usize, locked: bool) {
        self.slots.protect(slot, locked);
    }

    pub fn load_font(&mut self, bytes: &[u8]) -> std::result::Result<FontId, FontLoadError> {
        self.fonts.load_font(bytes)
    }

    pub fn fonts(&self) -> &FontSystem {
        &self.fonts
    }

    // ── caches ──

    /// Caches `id`'s subtree: `region` is in the node's local coordinates and
    /// the surface holds it at `scale`. Renders it once right away.
    pub fn cache(
        &mut self,
        scene: &mut Scene,
        id: NodeId,
        region: Rect,
        scale: f32,
        options: CacheOptions,
    ) -> Result<bool> {
        let target = scene.contains(id).then_some(id);
        let mut record = self.caches.remove(&id).unwrap_or_default();
        if let Err(e) = record.define(target, region, scale, options, &mut self.backend) {
            self.slots.unregister_texture(record.key());
            record.release(&mut self.backend);
            return Err(e);
        }
        let result = self.render_cache(scene, id, &mut record, None);
        self.caches.insert(id, record);
        result
    }

    /// Re-renders the cache of `id`. With `composite`, the new rendering is
    /// drawn over the old contents with that operation instead of replacing them.
    ///
    /// Returns `Ok(false)` when filters could not read the surface back; the
    /// cache then keeps the unfiltered rendering and its cache id.
    pub fn update_cache(&mut self, scene: &mut Scene, id: NodeId, composite: Option<CompositeOp>) -> Result<bool> {
        let mut record = self.caches.remove(&id).ok_or(RenderError::CacheNotDefined)?;
        let result = self.render_cache(scene, id, &mut record, composite);
        self.caches.insert(id, record);
        result
    }

    fn render_cache(
        &mut self,
        scene: &mut Scene,
        id: NodeId,
        record: &mut CacheRecord,
        composite: Option<CompositeOp>,
    ) -> Result<bool> {
        let bounds = filter_bounds(&scene.get(id).ok_or(RenderError::NoTarget)?.filters);
        let plan = record.plan(bounds)?;
        let surface = record.prepare_surface(&plan, &mut self.backend)?;

        match surface.target() {
            Some(SurfaceTarget::Canvas(canvas)) => {
                if composite.is_none() {
                    canvas.clear();
                }
                canvas.set_composite_op(composite.unwrap_or_default());
                ImmediatePainter {
                    canvas: &mut *canvas,
                    images: &mut self.images,
                    fonts: &self.fonts,
                    caches: &self.caches,
                }
                .paint_content(scene, id, &plan.transform, 1.0);
                canvas.set_composite_op(CompositeOp::SourceOver);
            }
            Some(SurfaceTarget::Texture(texture)) => {
                match composite {
                    None => self.backend.clear(RenderTarget::Texture(texture), Color::transparent())?,
                    Some(op) if op != CompositeOp::SourceOver => {
                        log::debug!("{}: gpu surfaces composite source-over, not {op:?}", record_label(id));
                    }
                    Some(_) => {}
                }
                let to = DrawTarget {
                    target: RenderTarget::Texture(texture),
                    viewport: Viewport::new(plan.width as f32, plan.height as f32),
                };
                let walked = self.assembler(to).append_content(scene, id, &plan.transform, 1.0);
                let result = walked.and_then(|()| self.assembler(to).finish());
                if result.is_err() {
                    self.batch.reset();
                }
                result?;
            }
            None => return Err(RenderError::Backend(format!("{} has no surface", record_label(id)))),
        }

        let filters = &scene.get(id).ok_or(RenderError::NoTarget)?.filters;
        let filtered = filters.is_empty() || apply_filters(surface, &mut self.backend, filters)?;
        surface.commit(&mut self.backend)?;

        if let Some(texture) = surface.texture() {
            self.slots.register_texture(record.key().clone(), texture, plan.width, plan.height);
        }
        if !filtered {
            return Ok(false);
        }
        record.complete_update();
        log::debug!("{}: cache id {}", record_label(id), record.cache_id());
        Ok(true)
    }

    /// Releases the cache of `id`. Does nothing when there is none.
    pub fn uncache(&mut self, id: NodeId) {
        if let Some(mut record) = self.caches.remove(&id) {
            self.slots.unregister_texture(record.key());
            record.release(&mut self.backend);
        }
    }

    /// Draws the subtree of `id` instead of its cache while `disabled`.
    pub fn set_cache_disabled(&mut self, id: NodeId, disabled: bool) -> Result<()> {
        let record = self.caches.get_mut(&id).ok_or(RenderError::CacheNotDefined)?;
        record.set_disabled(disabled);
        Ok(())
    }

    pub fn cache_record(&self, id: NodeId) -> Option<&CacheRecord> {
        self.caches.get(&id)
    }

    pub fn cache_bounds(&self, id: NodeId) -> Option<Rect> {
        self.caches.get(&id).and_then(|r| r.bounds())
    }

    /// PNG data URL of the cached pixels, or `None` if `id` has no rendered cache.
    pub fn cache_data_url(&mut self, id: NodeId) -> Result<Option<String>> {
        match self.caches.get_mut(&id) {
            Some(record) => record.data_url(&mut self.backend),
            None => Ok(None),
        }
    }

    fn drop_orphaned_caches(&mut self, scene: &Scene) {
        let orphaned: Vec<NodeId> = self.caches.keys().filter(|id| !scene.contains(**id)).copied().collect();
        for id in orphaned {
            log::debug!("{}: node removed, releasing cache", record_label(id));
            self.uncache(id);
        }
    }

    /// Frees every cache, texture and the placeholder.
    pub fn dispose(&mut self) {
        let ids: Vec<NodeId> = self.caches.keys().copied().collect();
        for id in ids {
            self.uncache(id);
        }
        self.slots.dispose(&mut self.backend);
        log::debug!("stage disposed");
    }
}

fn record_label(id: NodeId) -> String {
    format!("cache of node {id}")
}
