use std::fmt;

use crate::assets::PixelBuffer;
use crate::coords::Rect;
use crate::error::{RenderError, Result};
use crate::render::{Backend, RasterCanvas};

use super::surface::Surface;

/// A post-process applied to a cache surface after it is rendered.
///
/// Pixel filters edit a shared [`PixelBuffer`]; context filters draw on the
/// surface's 2D context. A filter may link a follow-up pass through
/// [`next_pass`](Filter::next_pass), which runs right after it.
pub trait Filter: fmt::Debug {
    /// How far the filter draws outside the cached region, relative to it.
    fn bounds(&self) -> Option<Rect> {
        None
    }

    fn uses_context(&self) -> bool {
        false
    }

    fn apply_context(&self, _canvas: &mut RasterCanvas) -> bool {
        false
    }

    fn apply_pixels(&self, _pixels: &mut PixelBuffer) -> bool {
        false
    }

    fn next_pass(&self) -> Option<&dyn Filter> {
        None
    }
}

/// Union of the bounds every filter reports. Zero when none do.
pub fn filter_bounds(filters: &[Box<dyn Filter>]) -> Rect {
    filters
        .iter()
        .filter_map(|f| f.bounds())
        .reduce(Rect::extend)
        .unwrap_or(Rect::ZERO)
}

/// Runs `filters` in order against `surface`.
///
/// Consecutive pixel passes share one readback, written back before the next
/// context pass and after the last pass. Returns `Ok(false)` when the surface
/// cannot be read; no pass is kept then and the surface holds what was
/// rendered before the filters ran.
pub fn apply_filters(
    surface: &mut dyn Surface,
    backend: &mut dyn Backend,
    filters: &[Box<dyn Filter>],
) -> Result<bool> {
    let snapshot = if needs_pixels(filters) {
        match surface.read_pixels(backend) {
            Ok(pixels) => Some(pixels),
            Err(RenderError::Readback(msg)) => {
                log::warn!("filters skipped: {msg}");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let first_reads = filters.first().is_some_and(|f| !f.uses_context());
    let seed = if first_reads { snapshot.clone() } else { None };
    match run_passes(surface, backend, filters, seed) {
        Err(RenderError::Readback(msg)) => {
            log::warn!("filters abandoned: {msg}");
            if let Some(pixels) = &snapshot {
                surface.write_pixels(pixels, backend)?;
            }
            Ok(false)
        }
        other => other.map(|()| true),
    }
}

fn passes(filter: &dyn Filter) -> impl Iterator<Item = &dyn Filter> {
    std::iter::successors(Some(filter), |f| f.next_pass())
}

fn needs_pixels(filters: &[Box<dyn Filter>]) -> bool {
    filters.iter().any(|f| passes(f.as_ref()).any(|p| !p.uses_context()))
}

fn run_passes(
    surface: &mut dyn Surface,
    backend: &mut dyn Backend,
    filters: &[Box<dyn Filter>],
    mut data: Option<PixelBuffer>,
) -> Result<()> {
    for f in filters.iter().flat_map(|f| passes(f.as_ref())) {
        let applied = if f.uses_context() {
            if let Some(pixels) = data.take() {
                surface.write_pixels(&pixels, backend)?;
            }
            surface.with_context(backend, &mut |canvas: &mut RasterCanvas| f.apply_context(canvas))?
        } else {
            if data.is_none() {
                data = Some(surface.read_pixels(backend)?);
            }
            data.as_mut().is_some_and(|pixels| f.apply_pixels(pixels))
        };
        if !applied {
            log::trace!("{f:?} left the surface unchanged");
        }
    }

    if let Some(pixels) = data {
        surface.write_pixels(&pixels, backend)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::cache::surface::{GpuSurface, RasterSurface, SurfaceTarget};
    use crate::paint::Color;
    use crate::render::HeadlessBackend;

    #[derive(Debug)]
    struct Padding(Option<Rect>);

    impl Filter for Padding {
        fn bounds(&self) -> Option<Rect> {
            self.0
        }
    }

    /// Records the order passes ran in.
    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        context: bool,
        log: Rc<RefCell<Vec<&'static str>>>,
        then: Option<Box<Recorder>>,
    }

    impl Recorder {
        fn new(name: &'static str, context: bool, log: &Rc<RefCell<Vec<&'static str>>>) -> Self {
            Self { name, context, log: log.clone(), then: None }
        }
    }

    impl Filter for Recorder {
        fn uses_context(&self) -> bool {
            self.context
        }

        fn apply_context(&self, _canvas: &mut RasterCanvas) -> bool {
            self.log.borrow_mut().push(self.name);
            true
        }

        fn apply_pixels(&self, pixels: &mut PixelBuffer) -> bool {
            self.log.borrow_mut().push(self.name);
            pixels.set_pixel(0, 0, [9, 9, 9, 9]);
            true
        }

        fn next_pass(&self) -> Option<&dyn Filter> {
            self.then.as_deref().map(|p| p as &dyn Filter)
        }
    }

    /// Draws an unreadable image over the whole canvas.
    #[derive(Debug)]
    struct Stamp(PixelBuffer);

    impl Filter for Stamp {
        fn uses_context(&self) -> bool {
            true
        }

        fn apply_context(&self, canvas: &mut RasterCanvas) -> bool {
            let (w, h) = (canvas.width() as f32, canvas.height() as f32);
            canvas.draw_image(&self.0, None, Rect::new(0.0, 0.0, w, h));
            true
        }
    }

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn unreadable(px: [u8; 4]) -> PixelBuffer {
        let mut p = PixelBuffer::filled(2, 2, Color::from_rgba8(px[0], px[1], px[2], px[3]));
        p.set_readable(false);
        p
    }

    fn red_surface(be: &mut HeadlessBackend, readable: bool) -> RasterSurface {
        let mut surface = RasterSurface::default();
        surface.resize(2, 2, be).unwrap();
        let mut src = PixelBuffer::filled(2, 2, Color::from_rgba8(255, 0, 0, 255));
        src.set_readable(readable);
        if let Some(SurfaceTarget::Canvas(canvas)) = surface.target() {
            canvas.draw_image(&src, None, Rect::new(0.0, 0.0, 2.0, 2.0));
        }
        surface
    }

    // ── bounds ──

    #[test]
    fn no_filters_means_zero_bounds() {
        assert_eq!(filter_bounds(&[]), Rect::ZERO);
    }

    #[test]
    fn bounds_are_united_skipping_none() {
        let filters: Vec<Box<dyn Filter>> = vec![
            Box::new(Padding(Some(Rect::new(-5.0, 0.0, 10.0, 10.0)))),
            Box::new(Padding(None)),
            Box::new(Padding(Some(Rect::new(0.0, -3.0, 6.0, 6.0)))),
        ];
        assert_eq!(filter_bounds(&filters), Rect::new(-5.0, -3.0, 11.0, 13.0));
    }

    #[test]
    fn first_reported_bounds_seed_the_union() {
        let filters: Vec<Box<dyn Filter>> =
            vec![Box::new(Padding(None)), Box::new(Padding(Some(Rect::new(2.0, 2.0, 1.0, 1.0))))];
        assert_eq!(filter_bounds(&filters), Rect::new(2.0, 2.0, 1.0, 1.0));
    }

    // ── dispatch ──

    #[test]
    fn passes_run_in_list_order_with_chains() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut first = Recorder::new("h", false, &log);
        first.then = Some(Box::new(Recorder::new("v", false, &log)));
        let filters: Vec<Box<dyn Filter>> = vec![Box::new(first), Box::new(Recorder::new("ctx", true, &log))];

        let mut be = HeadlessBackend::new(1, 1);
        let mut surface = RasterSurface::default();
        surface.resize(2, 2, &mut be).unwrap();
        assert!(apply_filters(&mut surface, &mut be, &filters).unwrap());
        assert_eq!(*log.borrow(), vec!["h", "v", "ctx"]);
        // Pixel edits were written back before the context pass.
        assert_eq!(surface.canvas().pixels().pixel(0, 0), [9, 9, 9, 9]);
    }

    #[test]
    fn unreadable_surface_reports_false() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let filters: Vec<Box<dyn Filter>> = vec![Box::new(Recorder::new("px", false, &log))];

        let mut be = HeadlessBackend::new(1, 1);
        let mut surface = GpuSurface::default();
        surface.resize(2, 2, &mut be).unwrap();
        be.set_fail_readback(true);
        assert!(!apply_filters(&mut surface, &mut be, &filters).unwrap());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn tainted_surface_runs_no_pass_at_all() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let filters: Vec<Box<dyn Filter>> = vec![
            Box::new(Stamp(unreadable([0, 0, 255, 255]))),
            Box::new(Recorder::new("px", false, &log)),
        ];

        let mut be = HeadlessBackend::new(1, 1);
        let mut surface = red_surface(&mut be, false);
        assert!(!apply_filters(&mut surface, &mut be, &filters).unwrap());
        assert!(log.borrow().is_empty());
        assert_eq!(surface.canvas().pixels().pixel(1, 1), RED);
    }

    #[test]
    fn readback_lost_mid_chain_restores_rendered_pixels() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let filters: Vec<Box<dyn Filter>> = vec![
            Box::new(Stamp(unreadable([0, 0, 255, 255]))),
            Box::new(Recorder::new("px", false, &log)),
        ];

        let mut be = HeadlessBackend::new(1, 1);
        let mut surface = red_surface(&mut be, true);
        assert!(!apply_filters(&mut surface, &mut be, &filters).unwrap());
        assert!(log.borrow().is_empty());
        assert_eq!(surface.canvas().pixels().pixel(0, 0), RED);
        assert_eq!(surface.canvas().pixels().pixel(1, 1), RED);
    }

    #[test]
    fn context_only_filters_run_on_tainted_surfaces() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let filters: Vec<Box<dyn Filter>> = vec![Box::new(Recorder::new("ctx", true, &log))];

        let mut be = HeadlessBackend::new(1, 1);
        let mut surface = red_surface(&mut be, false);
        assert!(apply_filters(&mut surface, &mut be, &filters).unwrap());
        assert_eq!(*log.borrow(), vec!["ctx"]);
    }
}
