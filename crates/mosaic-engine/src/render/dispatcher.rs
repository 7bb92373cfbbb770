use crate::coords::Viewport;
use crate::error::Result;

use super::backend::{Backend, DrawCall, ProgramId, RenderTarget};
use super::batch::{BatchBuffer, BatchReason, BatchStats};
use super::slots::TextureSlots;

/// Where the current walk draws and with which projection.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrawTarget {
    pub target: RenderTarget,
    pub viewport: Viewport,
}

/// Turns a filled [`BatchBuffer`] into one backend draw call.
///
/// Owns the monotonic batch and draw counters. The batch id tags slot usage so
/// the slot manager never evicts a texture the pending batch still samples.
#[derive(Debug)]
pub struct DrawDispatcher {
    program: ProgramId,
    batch_id: u64,
    draw_id: u64,
    stats: BatchStats,
}

impl DrawDispatcher {
    pub fn new(program: ProgramId) -> Self {
        Self { program, batch_id: 0, draw_id: 0, stats: BatchStats::default() }
    }

    pub fn batch_id(&self) -> u64 {
        self.batch_id
    }

    pub fn draw_id(&self) -> u64 {
        self.draw_id
    }

    /// Counters since the last [`begin_draw`](Self::begin_draw).
    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// Starts a new draw: bumps the draw id and resets the stats.
    pub fn begin_draw(&mut self) -> u64 {
        self.draw_id += 1;
        self.stats = BatchStats::default();
        self.draw_id
    }

    /// Draws the populated part of `batch` and empties it. No-op when empty.
    ///
    /// The batch is reset and the batch id advanced even when the backend
    /// fails, so a broken draw never leaks cards into the next one.
    pub fn flush(
        &mut self,
        reason: BatchReason,
        batch: &mut BatchBuffer,
        slots: &TextureSlots,
        backend: &mut dyn Backend,
        to: DrawTarget,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        log::debug!(
            "batch {}: {:?}, {} cards to {:?}",
            self.batch_id,
            reason,
            batch.cards(),
            to.target
        );

        let exclude = match to.target {
            RenderTarget::Texture(id) => Some(id),
            RenderTarget::Screen => None,
        };
        let textures = slots.bound_textures(exclude);
        let result = backend.draw(&DrawCall {
            target: to.target,
            program: self.program,
            projection: to.viewport.projection(),
            textures: &textures,
            positions: batch.positions(),
            uvs: batch.uvs(),
            indices: batch.indices(),
            alphas: batch.alphas(),
            vertex_count: batch.vertex_count() as u32,
        });

        self.stats.record(reason, batch.cards());
        batch.reset();
        self.batch_id += 1;
        result
    }
}
