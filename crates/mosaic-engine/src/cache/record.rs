use base64::prelude::{Engine as _, BASE64_STANDARD};

use crate::assets::ImageKey;
use crate::coords::{Matrix2D, Rect, Vec2};
use crate::error::{RenderError, Result};
use crate::render::Backend;
use crate::scene::NodeId;

use super::surface::{new_surface, Surface, SurfaceKind};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct CacheOptions {
    pub surface: SurfaceKind,
}

/// Surface size and render transform for one cache update.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CachePlan {
    pub width: u32,
    pub height: u32,
    /// Surface-pixel offset of the cached region's origin (filter padding included).
    pub offset: Vec2,
    /// Maps the target's local space onto surface pixels.
    pub transform: Matrix2D,
}

/// Offscreen cache of one node's subtree.
///
/// A record is created undefined, gets its region from [`define`](Self::define),
/// and is re-rendered by the stage on every update. `cache_id` counts
/// successful updates.
#[derive(Debug)]
pub struct CacheRecord {
    target: Option<NodeId>,
    key: ImageKey,
    region: Rect,
    scale: f32,
    options: CacheOptions,
    cache_id: u64,
    disabled: bool,
    offset: Vec2,
    draw_size: (u32, u32),
    surface: Option<Box<dyn Surface>>,
    data_url: Option<(u64, String)>,
}

impl Default for CacheRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheRecord {
    pub fn new() -> Self {
        Self {
            target: None,
            key: ImageKey::from("cache:undefined"),
            region: Rect::ZERO,
            scale: 1.0,
            options: CacheOptions::default(),
            cache_id: 0,
            disabled: false,
            offset: Vec2::ZERO,
            draw_size: (0, 0),
            surface: None,
            data_url: None,
        }
    }

    /// Sets the cached region in the target's local coordinates.
    ///
    /// Width and height below 1 are raised to 1; a non-positive scale means 1.
    /// Switching surface kinds releases the old surface.
    pub fn define(
        &mut self,
        target: Option<NodeId>,
        region: Rect,
        scale: f32,
        options: CacheOptions,
        backend: &mut dyn Backend,
    ) -> Result<()> {
        let target = target.ok_or(RenderError::NoTarget)?;
        if self.surface.as_ref().is_some_and(|s| s.kind() != options.surface) {
            self.release_surface(backend);
        }
        self.target = Some(target);
        self.key = ImageKey::from(format!("cache:{target}"));
        self.region = Rect::new(region.x(), region.y(), region.width().max(1.0), region.height().max(1.0));
        self.scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
        self.options = options;
        Ok(())
    }

    pub fn is_defined(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// Slot-manager key the cache texture is registered under.
    pub fn key(&self) -> &ImageKey {
        &self.key
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    pub fn cache_id(&self) -> u64 {
        self.cache_id
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Hides the surface without releasing it. While disabled the node draws
    /// its subtree live and [`surface`](Self::surface) reports nothing;
    /// enabling again brings back the retained surface as it was.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// The visible surface. `None` before the first update and while disabled.
    pub fn surface(&self) -> Option<&dyn Surface> {
        if self.disabled {
            return None;
        }
        self.surface.as_deref()
    }

    pub(crate) fn retained_surface(&self) -> Option<&dyn Surface> {
        self.surface.as_deref()
    }

    pub fn draw_size(&self) -> (u32, u32) {
        self.draw_size
    }

    /// Size and transform for an update with the given filter padding.
    pub fn plan(&self, filter_bounds: Rect) -> Result<CachePlan> {
        if self.target.is_none() {
            return Err(RenderError::CacheNotDefined);
        }
        let s = self.scale;
        let width = ((self.region.width() * s).ceil() + filter_bounds.width()).ceil().max(1.0) as u32;
        let height = ((self.region.height() * s).ceil() + filter_bounds.height()).ceil().max(1.0) as u32;
        let offset = Vec2::new(self.region.x() * s + filter_bounds.x(), self.region.y() * s + filter_bounds.y());
        Ok(CachePlan { width, height, offset, transform: Matrix2D::new(s, 0.0, 0.0, s, -offset.x, -offset.y) })
    }

    /// Returns the surface sized for `plan`, creating or resizing it as needed.
    pub(crate) fn prepare_surface(&mut self, plan: &CachePlan, backend: &mut dyn Backend) -> Result<&mut dyn Surface> {
        let kind = self.options.surface;
        let surface = self.surface.get_or_insert_with(|| new_surface(kind));
        if surface.size() != (plan.width, plan.height) || surface.texture().is_none() {
            log::debug!("{}: surface {}x{}", self.key, plan.width, plan.height);
            surface.resize(plan.width, plan.height, backend)?;
        }
        self.offset = plan.offset;
        self.draw_size = (plan.width, plan.height);
        Ok(&mut **surface)
    }

    pub(crate) fn surface_mut(&mut self) -> Option<&mut (dyn Surface + 'static)> {
        self.surface.as_deref_mut()
    }

    pub(crate) fn complete_update(&mut self) {
        self.cache_id += 1;
    }

    /// Local-space area covered by the surface; also the quad the cached node
    /// is drawn with. `None` before the first update.
    pub fn bounds(&self) -> Option<Rect> {
        if self.target.is_none() || self.draw_size == (0, 0) {
            return None;
        }
        let s = self.scale;
        Some(Rect::new(
            self.region.x() + (self.offset.x - self.region.x() * s) / s,
            self.region.y() + (self.offset.y - self.region.y() * s) / s,
            self.draw_size.0 as f32 / s,
            self.draw_size.1 as f32 / s,
        ))
    }

    /// Whether the batch should sample the surface instead of walking the subtree.
    pub fn is_drawable(&self) -> bool {
        !self.disabled && self.cache_id > 0 && self.surface.as_ref().is_some_and(|s| s.texture().is_some())
    }

    /// The surface contents as a `data:image/png;base64,` URL. Encoded once
    /// per cache id. `None` when nothing has been rendered or the cache is disabled.
    pub fn data_url(&mut self, backend: &mut dyn Backend) -> Result<Option<String>> {
        if self.disabled {
            return Ok(None);
        }
        if let Some((id, url)) = &self.data_url {
            if *id == self.cache_id {
                return Ok(Some(url.clone()));
            }
        }
        let Some(surface) = self.surface.as_mut() else { return Ok(None) };
        if self.cache_id == 0 {
            return Ok(None);
        }
        let png = surface.read_pixels(backend)?.to_png()?;
        let url = format!("data:image/png;base64,{}", BASE64_STANDARD.encode(png));
        self.data_url = Some((self.cache_id, url.clone()));
        Ok(Some(url))
    }

    fn release_surface(&mut self, backend: &mut dyn Backend) {
        if let Some(mut surface) = self.surface.take() {
            surface.release(backend);
        }
    }

    /// Frees the surface and returns to the undefined state. Safe to repeat.
    pub fn release(&mut self, backend: &mut dyn Backend) {
        self.release_surface(backend);
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessBackend;
    use crate::scene::Scene;

    fn defined(region: Rect, scale: f32) -> (CacheRecord, HeadlessBackend) {
        let mut be = HeadlessBackend::new(1, 1);
        let mut rec = CacheRecord::new();
        let root = Scene::new().root();
        rec.define(Some(root), region, scale, CacheOptions::default(), &mut be).unwrap();
        (rec, be)
    }

    #[test]
    fn define_needs_a_target() {
        let mut be = HeadlessBackend::new(1, 1);
        let mut rec = CacheRecord::new();
        let r = rec.define(None, Rect::new(0.0, 0.0, 4.0, 4.0), 1.0, CacheOptions::default(), &mut be);
        assert!(matches!(r, Err(RenderError::NoTarget)));
    }

    #[test]
    fn plan_before_define_fails() {
        assert!(matches!(CacheRecord::new().plan(Rect::ZERO), Err(RenderError::CacheNotDefined)));
    }

    #[test]
    fn tiny_regions_clamp_to_one_pixel() {
        let (rec, _) = defined(Rect::new(0.0, 0.0, 0.0, -3.0), 1.0);
        assert_eq!(rec.region(), Rect::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn plan_scales_and_pads() {
        let (rec, _) = defined(Rect::new(10.0, 20.0, 100.0, 50.0), 2.0);
        let plan = rec.plan(Rect::new(-4.0, -2.0, 8.0, 4.0)).unwrap();
        assert_eq!((plan.width, plan.height), (208, 104));
        assert_eq!(plan.offset, Vec2::new(16.0, 38.0));
        assert_eq!(plan.transform, Matrix2D::new(2.0, 0.0, 0.0, 2.0, -16.0, -38.0));
    }

    #[test]
    fn bounds_cover_filter_padding() {
        let (mut rec, mut be) = defined(Rect::new(10.0, 20.0, 100.0, 50.0), 2.0);
        let plan = rec.plan(Rect::new(-4.0, -2.0, 8.0, 4.0)).unwrap();
        rec.prepare_surface(&plan, &mut be).unwrap();
        assert_eq!(rec.bounds(), Some(Rect::new(8.0, 19.0, 104.0, 52.0)));
    }

    #[test]
    fn data_url_is_png_and_memoized() {
        let (mut rec, mut be) = defined(Rect::new(0.0, 0.0, 2.0, 2.0), 1.0);
        assert_eq!(rec.data_url(&mut be).unwrap(), None);

        let plan = rec.plan(Rect::ZERO).unwrap();
        rec.prepare_surface(&plan, &mut be).unwrap();
        rec.complete_update();
        let url = rec.data_url(&mut be).unwrap().unwrap();
        assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"));

        // Served from the memo even if the surface could no longer be read.
        be.set_fail_readback(true);
        assert_eq!(rec.data_url(&mut be).unwrap(), Some(url));
    }

    #[test]
    fn release_resets_and_is_idempotent() {
        let (mut rec, mut be) = defined(Rect::new(0.0, 0.0, 4.0, 4.0), 3.0);
        let plan = rec.plan(Rect::ZERO).unwrap();
        rec.prepare_surface(&plan, &mut be).unwrap();
        rec.release(&mut be);
        rec.release(&mut be);
        assert!(!rec.is_defined());
        assert_eq!(rec.scale(), 1.0);
        assert!(rec.surface().is_none());
        assert_eq!(be.live_textures(), 0);
    }

    #[test]
    fn disabled_cache_hides_its_surface() {
        let (mut rec, mut be) = defined(Rect::new(0.0, 0.0, 2.0, 2.0), 1.0);
        let plan = rec.plan(Rect::ZERO).unwrap();
        rec.prepare_surface(&plan, &mut be).unwrap();
        rec.complete_update();
        let url = rec.data_url(&mut be).unwrap();

        rec.set_disabled(true);
        assert!(rec.surface().is_none());
        assert!(rec.retained_surface().is_some());
        assert!(!rec.is_drawable());
        assert_eq!(rec.data_url(&mut be).unwrap(), None);

        rec.set_disabled(false);
        assert_eq!(rec.surface().map(|s| s.size()), Some((2, 2)));
        assert_eq!(rec.data_url(&mut be).unwrap(), url);
    }
}
