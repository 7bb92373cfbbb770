//! The seam between batch assembly and the graphics API.
//!
//! The stage talks to the GPU only through [`Backend`]. `WgpuBackend` drives
//! a real device; `HeadlessBackend` runs the same calls on the CPU and keeps a
//! log of them.

use crate::assets::PixelBuffer;
use crate::error::Result;
use crate::paint::Color;

use super::program::ProgramSource;

/// Backend-owned texture. Usable both as a sampling source and a render target.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(pub u32);

/// Where a draw lands.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RenderTarget {
    /// The presentation surface (or the headless screen buffer).
    Screen,
    /// An offscreen texture, e.g. a cache surface.
    Texture(TextureId),
}

/// One batched draw: `vertex_count` vertices read from the populated prefix of
/// each stream, sampling `textures[i]` for texture index `i`.
#[derive(Debug, Copy, Clone)]
pub struct DrawCall<'a> {
    pub target: RenderTarget,
    pub program: ProgramId,
    pub projection: [[f32; 4]; 4],
    pub textures: &'a [TextureId],
    pub positions: &'a [f32],
    pub uvs: &'a [f32],
    pub indices: &'a [f32],
    pub alphas: &'a [f32],
    pub vertex_count: u32,
}

pub trait Backend {
    /// Number of textures one fragment program may sample.
    fn max_texture_units(&self) -> usize;

    /// Whether textures store premultiplied color, so batch programs must
    /// divide it out before applying node alpha.
    fn premultiplied_textures(&self) -> bool {
        false
    }

    /// Compiles and links a batch program. Failure is fatal to stage initialization.
    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId>;

    /// Creates a transparent RGBA texture.
    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId>;

    /// Replaces the full contents of `texture`. Sizes must match.
    fn write_texture(&mut self, texture: TextureId, pixels: &PixelBuffer) -> Result<()>;

    /// Reads the full contents of `texture` back to the CPU.
    fn read_texture(&mut self, texture: TextureId) -> Result<PixelBuffer>;

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)>;

    fn delete_texture(&mut self, texture: TextureId);

    /// Fills `target` with `color`.
    fn clear(&mut self, target: RenderTarget, color: Color) -> Result<()>;

    /// Issues one draw call.
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()>;

    /// Notifies the backend that the screen size changed.
    fn resize_screen(&mut self, _width: u32, _height: u32) {}
}
