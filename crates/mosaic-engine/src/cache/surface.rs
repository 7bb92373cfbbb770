//! Offscreen surfaces a cache renders into.
//!
//! Both kinds end up as a backend texture the batch can sample. A raster
//! surface draws on the CPU and uploads on `commit`; a GPU surface is the
//! texture itself and is drawn by the batch renderer directly.

use std::fmt;

use crate::assets::PixelBuffer;
use crate::error::Result;
use crate::render::{Backend, RasterCanvas, TextureId};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum SurfaceKind {
    /// CPU canvas, uploaded to a texture after each update.
    #[default]
    Raster,
    /// Render-to-texture through the batch renderer.
    Gpu,
}

/// What a cache update draws into.
pub enum SurfaceTarget<'a> {
    Canvas(&'a mut RasterCanvas),
    Texture(TextureId),
}

pub trait Surface: fmt::Debug {
    fn kind(&self) -> SurfaceKind;

    fn size(&self) -> (u32, u32);

    /// Resizes and clears the surface. Creates the backing texture on first use.
    fn resize(&mut self, width: u32, height: u32, backend: &mut dyn Backend) -> Result<()>;

    fn target(&mut self) -> Option<SurfaceTarget<'_>>;

    /// Texture the batch samples. `None` until the first resize.
    fn texture(&self) -> Option<TextureId>;

    /// Reads the current contents. Fails with `Readback` when tainted.
    fn read_pixels(&mut self, backend: &mut dyn Backend) -> Result<PixelBuffer>;

    fn write_pixels(&mut self, pixels: &PixelBuffer, backend: &mut dyn Backend) -> Result<()>;

    /// Runs `f` against a 2D drawing context holding the current contents.
    fn with_context(
        &mut self,
        backend: &mut dyn Backend,
        f: &mut dyn FnMut(&mut RasterCanvas) -> bool,
    ) -> Result<bool>;

    /// Makes the drawn contents visible through [`texture`](Self::texture).
    fn commit(&mut self, backend: &mut dyn Backend) -> Result<()>;

    /// CPU copy of the contents, when the surface keeps one.
    fn pixels(&self) -> Option<&PixelBuffer>;

    /// Frees the backing texture. Safe to call twice.
    fn release(&mut self, backend: &mut dyn Backend);
}

pub fn new_surface(kind: SurfaceKind) -> Box<dyn Surface> {
    match kind {
        SurfaceKind::Raster => Box::new(RasterSurface::default()),
        SurfaceKind::Gpu => Box::new(GpuSurface::default()),
    }
}

/// Recreates `texture` when its size no longer matches.
fn ensure_texture(
    texture: &mut Option<TextureId>,
    width: u32,
    height: u32,
    backend: &mut dyn Backend,
) -> Result<TextureId> {
    if let Some(id) = *texture {
        if backend.texture_size(id) == Some((width, height)) {
            return Ok(id);
        }
        backend.delete_texture(id);
        *texture = None;
    }
    let id = backend.create_texture(width, height)?;
    *texture = Some(id);
    Ok(id)
}

#[derive(Debug)]
pub struct RasterSurface {
    canvas: RasterCanvas,
    texture: Option<TextureId>,
}

impl Default for RasterSurface {
    fn default() -> Self {
        Self { canvas: RasterCanvas::new(0, 0), texture: None }
    }
}

impl RasterSurface {
    pub fn canvas(&self) -> &RasterCanvas {
        &self.canvas
    }
}

impl Surface for RasterSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Raster
    }

    fn size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    fn resize(&mut self, width: u32, height: u32, backend: &mut dyn Backend) -> Result<()> {
        self.canvas.resize(width, height);
        ensure_texture(&mut self.texture, width, height, backend)?;
        Ok(())
    }

    fn target(&mut self) -> Option<SurfaceTarget<'_>> {
        Some(SurfaceTarget::Canvas(&mut self.canvas))
    }

    fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    fn read_pixels(&mut self, _backend: &mut dyn Backend) -> Result<PixelBuffer> {
        self.canvas.get_image_data()
    }

    fn write_pixels(&mut self, pixels: &PixelBuffer, _backend: &mut dyn Backend) -> Result<()> {
        self.canvas.put_image_data(pixels);
        Ok(())
    }

    fn with_context(
        &mut self,
        _backend: &mut dyn Backend,
        f: &mut dyn FnMut(&mut RasterCanvas) -> bool,
    ) -> Result<bool> {
        Ok(f(&mut self.canvas))
    }

    fn commit(&mut self, backend: &mut dyn Backend) -> Result<()> {
        let (w, h) = self.size();
        let id = ensure_texture(&mut self.texture, w, h, backend)?;
        backend.write_texture(id, self.canvas.pixels())
    }

    fn pixels(&self) -> Option<&PixelBuffer> {
        Some(self.canvas.pixels())
    }

    fn release(&mut self, backend: &mut dyn Backend) {
        if let Some(id) = self.texture.take() {
            backend.delete_texture(id);
        }
        self.canvas.resize(0, 0);
    }
}

#[derive(Debug, Default)]
pub struct GpuSurface {
    texture: Option<TextureId>,
    width: u32,
    height: u32,
}

impl Surface for GpuSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Gpu
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32, backend: &mut dyn Backend) -> Result<()> {
        ensure_texture(&mut self.texture, width, height, backend)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn target(&mut self) -> Option<SurfaceTarget<'_>> {
        self.texture.map(SurfaceTarget::Texture)
    }

    fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    fn read_pixels(&mut self, backend: &mut dyn Backend) -> Result<PixelBuffer> {
        match self.texture {
            Some(id) => backend.read_texture(id),
            None => Ok(PixelBuffer::new(0, 0)),
        }
    }

    fn write_pixels(&mut self, pixels: &PixelBuffer, backend: &mut dyn Backend) -> Result<()> {
        match self.texture {
            Some(id) => backend.write_texture(id, pixels),
            None => Ok(()),
        }
    }

    fn with_context(
        &mut self,
        backend: &mut dyn Backend,
        f: &mut dyn FnMut(&mut RasterCanvas) -> bool,
    ) -> Result<bool> {
        // The texture round-trips through a staging canvas.
        let mut staging = RasterCanvas::from_pixels(self.read_pixels(backend)?);
        let applied = f(&mut staging);
        self.write_pixels(staging.pixels(), backend)?;
        Ok(applied)
    }

    fn commit(&mut self, _backend: &mut dyn Backend) -> Result<()> {
        Ok(())
    }

    fn pixels(&self) -> Option<&PixelBuffer> {
        None
    }

    fn release(&mut self, backend: &mut dyn Backend) {
        if let Some(id) = self.texture.take() {
            backend.delete_texture(id);
        }
        self.width = 0;
        self.height = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paint::Color;
    use crate::render::HeadlessBackend;

    #[test]
    fn raster_commit_uploads_canvas() {
        let mut be = HeadlessBackend::new(1, 1);
        let mut s = RasterSurface::default();
        s.resize(2, 2, &mut be).unwrap();
        s.write_pixels(&PixelBuffer::filled(2, 2, Color::from_u32(0xff0000ff)), &mut be).unwrap();
        s.commit(&mut be).unwrap();

        let tex = s.texture().unwrap();
        assert_eq!(be.texture(tex).unwrap().pixel(1, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn resize_to_same_size_keeps_texture() {
        let mut be = HeadlessBackend::new(1, 1);
        let mut s = GpuSurface::default();
        s.resize(4, 4, &mut be).unwrap();
        let first = s.texture();
        s.resize(4, 4, &mut be).unwrap();
        assert_eq!(s.texture(), first);
        s.resize(8, 4, &mut be).unwrap();
        assert_ne!(s.texture(), first);
        assert_eq!(be.live_textures(), 1);
    }

    #[test]
    fn gpu_context_round_trips_texture() {
        let mut be = HeadlessBackend::new(1, 1);
        let mut s = GpuSurface::default();
        s.resize(2, 1, &mut be).unwrap();
        let ran = s
            .with_context(&mut be, &mut |c| {
                c.put_image_data(&PixelBuffer::filled(2, 1, Color::from_u32(0x0000ffff)));
                true
            })
            .unwrap();
        assert!(ran);
        assert_eq!(s.read_pixels(&mut be).unwrap().pixel(0, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn release_is_idempotent() {
        let mut be = HeadlessBackend::new(1, 1);
        let mut s = new_surface(SurfaceKind::Raster);
        s.resize(3, 3, &mut be).unwrap();
        s.release(&mut be);
        s.release(&mut be);
        assert_eq!(be.live_textures(), 0);
        assert!(s.texture().is_none());
    }
}
