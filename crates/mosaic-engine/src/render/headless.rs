use std::collections::HashMap;

use crate::assets::PixelBuffer;
use crate::coords::Vec2;
use crate::error::{RenderError, Result};
use crate::paint::Color;

use super::backend::{Backend, DrawCall, ProgramId, RenderTarget, TextureId};
use super::batch::VERTICES_PER_CARD;
use super::program::ProgramSource;
use super::raster::{composite, raster_triangle, sample_nearest, CompositeOp, TexVertex};

/// A draw call as the headless backend received it.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub target: RenderTarget,
    pub program: ProgramId,
    pub vertex_count: u32,
    pub textures: Vec<TextureId>,
    pub positions: Vec<f32>,
    pub uvs: Vec<f32>,
    pub indices: Vec<f32>,
    pub alphas: Vec<f32>,
}

impl DrawRecord {
    pub fn cards(&self) -> usize {
        self.vertex_count as usize / VERTICES_PER_CARD
    }
}

/// CPU implementation of [`Backend`].
///
/// Draws are rasterized into in-memory pixel buffers (nearest sampling,
/// premultiplied source-over) and every call is logged, so stage behavior can
/// be inspected without a GPU.
pub struct HeadlessBackend {
    max_units: usize,
    screen: PixelBuffer,
    textures: HashMap<TextureId, PixelBuffer>,
    next_texture: u32,
    programs: Vec<ProgramSource>,
    draws: Vec<DrawRecord>,
    clears: usize,
    fail_programs_above: Option<usize>,
    fail_readback: bool,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            max_units: 16,
            screen: PixelBuffer::new(width, height),
            textures: HashMap::new(),
            next_texture: 1,
            programs: Vec::new(),
            draws: Vec::new(),
            clears: 0,
            fail_programs_above: None,
            fail_readback: false,
        }
    }

    pub fn with_max_texture_units(mut self, units: usize) -> Self {
        self.max_units = units;
        self
    }

    /// Makes `compile_program` fail for programs with more than `slots` slots.
    pub fn fail_programs_above(mut self, slots: usize) -> Self {
        self.fail_programs_above = Some(slots);
        self
    }

    /// Makes every texture readback fail (a tainted surface).
    pub fn set_fail_readback(&mut self, fail: bool) {
        self.fail_readback = fail;
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.draws)
    }

    pub fn programs(&self) -> &[ProgramSource] {
        &self.programs
    }

    pub fn clear_count(&self) -> usize {
        self.clears
    }

    pub fn screen(&self) -> &PixelBuffer {
        &self.screen
    }

    pub fn texture(&self, id: TextureId) -> Option<&PixelBuffer> {
        self.textures.get(&id)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    fn target_mut(&mut self, target: RenderTarget) -> Result<&mut PixelBuffer> {
        match target {
            RenderTarget::Screen => Ok(&mut self.screen),
            RenderTarget::Texture(id) => self
                .textures
                .get_mut(&id)
                .ok_or_else(|| RenderError::Backend(format!("unknown texture {id:?}"))),
        }
    }
}

impl Backend for HeadlessBackend {
    fn max_texture_units(&self) -> usize {
        self.max_units
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        source.validate()?;
        if self.fail_programs_above.is_some_and(|max| source.slot_count > max) {
            return Err(RenderError::ShaderCompile {
                slots: source.slot_count,
                message: "too many samplers for this device".into(),
            });
        }
        self.programs.push(source.clone());
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId> {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(id, PixelBuffer::new(width, height));
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, pixels: &PixelBuffer) -> Result<()> {
        let dst = self.target_mut(RenderTarget::Texture(texture))?;
        if (dst.width(), dst.height()) != (pixels.width(), pixels.height()) {
            return Err(RenderError::Backend(format!(
                "texture {texture:?} is {}x{}, got {}x{}",
                dst.width(),
                dst.height(),
                pixels.width(),
                pixels.height()
            )));
        }
        dst.data_mut().copy_from_slice(pixels.data());
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId) -> Result<PixelBuffer> {
        if self.fail_readback {
            return Err(RenderError::Readback(format!("texture {texture:?} is not readable")));
        }
        self.textures
            .get(&texture)
            .cloned()
            .ok_or_else(|| RenderError::Backend(format!("unknown texture {texture:?}")))
    }

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|p| (p.width(), p.height()))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn clear(&mut self, target: RenderTarget, color: Color) -> Result<()> {
        let px = color.to_rgba8();
        let dst = self.target_mut(target)?;
        for chunk in dst.data_mut().chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
        self.clears += 1;
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let n = call.vertex_count as usize;
        self.draws.push(DrawRecord {
            target: call.target,
            program: call.program,
            vertex_count: call.vertex_count,
            textures: call.textures.to_vec(),
            positions: call.positions[..n * 2].to_vec(),
            uvs: call.uvs[..n * 2].to_vec(),
            indices: call.indices[..n].to_vec(),
            alphas: call.alphas[..n].to_vec(),
        });

        let sources: Vec<PixelBuffer> = call
            .textures
            .iter()
            .map(|id| self.textures.get(id).cloned().unwrap_or_else(|| PixelBuffer::new(1, 1)))
            .collect();
        let p = call.projection;
        let dst = self.target_mut(call.target)?;
        let (w, h) = (dst.width() as f32, dst.height() as f32);

        // Pixel space -> clip space -> target pixels.
        let to_target = |x: f32, y: f32| {
            let cx = x * p[0][0] + p[3][0];
            let cy = y * p[1][1] + p[3][1];
            Vec2::new((cx + 1.0) * 0.5 * w, (1.0 - cy) * 0.5 * h)
        };

        for tri in 0..n / 3 {
            let base = tri * 3;
            let vert = |i: usize| TexVertex {
                pos: to_target(call.positions[i * 2], call.positions[i * 2 + 1]),
                u: call.uvs[i * 2],
                v: call.uvs[i * 2 + 1],
            };
            let slot = (call.indices[base].round().max(0.0) as usize).min(sources.len().saturating_sub(1));
            let Some(src) = sources.get(slot) else { continue };
            let alpha = call.alphas[base];
            raster_triangle(dst.width(), dst.height(), [vert(base), vert(base + 1), vert(base + 2)], |x, y, u, v| {
                let s = sample_nearest(src, u, v);
                let d = dst.pixel(x, y);
                dst.set_pixel(x, y, composite(d, s, alpha, CompositeOp::SourceOver));
            });
        }
        Ok(())
    }

    fn resize_screen(&mut self, width: u32, height: u32) {
        if (self.screen.width(), self.screen.height()) != (width, height) {
            self.screen.reset(width, height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Viewport;
    use crate::render::program::ProgramBuilder;

    #[test]
    fn draw_rasterizes_into_target() {
        let mut be = HeadlessBackend::new(4, 4);
        let program = be.compile_program(&ProgramBuilder::build(1).unwrap()).unwrap();
        let tex = be.create_texture(1, 1).unwrap();
        be.write_texture(tex, &PixelBuffer::filled(1, 1, Color::from_u32(0x00ff00ff))).unwrap();

        // One card covering the left half.
        let positions = [0.0, 0.0, 0.0, 4.0, 2.0, 0.0, 0.0, 4.0, 2.0, 0.0, 2.0, 4.0];
        let uvs = [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0];
        be.draw(&DrawCall {
            target: RenderTarget::Screen,
            program,
            projection: Viewport::new(4.0, 4.0).projection(),
            textures: &[tex],
            positions: &positions,
            uvs: &uvs,
            indices: &[0.0; 6],
            alphas: &[1.0; 6],
            vertex_count: 6,
        })
        .unwrap();

        assert_eq!(be.screen().pixel(0, 0), [0, 255, 0, 255]);
        assert_eq!(be.screen().pixel(1, 3), [0, 255, 0, 255]);
        assert_eq!(be.screen().pixel(2, 0), [0; 4]);
        assert_eq!(be.draws()[0].cards(), 1);
    }

    #[test]
    fn program_limit_is_enforced() {
        let mut be = HeadlessBackend::new(1, 1).fail_programs_above(4);
        assert!(be.compile_program(&ProgramBuilder::build(4).unwrap()).is_ok());
        assert!(matches!(
            be.compile_program(&ProgramBuilder::build(8).unwrap()),
            Err(RenderError::ShaderCompile { slots: 8, .. })
        ));
    }

    #[test]
    fn write_texture_rejects_size_mismatch() {
        let mut be = HeadlessBackend::new(1, 1);
        let tex = be.create_texture(2, 2).unwrap();
        assert!(be.write_texture(tex, &PixelBuffer::new(1, 1)).is_err());
    }

    #[test]
    fn readback_failure_is_reported() {
        let mut be = HeadlessBackend::new(1, 1);
        let tex = be.create_texture(1, 1).unwrap();
        be.set_fail_readback(true);
        assert!(matches!(be.read_texture(tex), Err(RenderError::Readback(_))));
    }
}
