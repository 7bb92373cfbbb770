//! Batched scene rendering.
//!
//! A [`Stage`] walks a [`crate::scene::Scene`] in paint order and packs every
//! visible card into a shared vertex batch. Textures are bound through a small
//! set of slots; the batch is flushed to the [`Backend`] when it fills up or
//! runs out of slots.
//!
//! Convention:
//! - geometry is in stage pixels (top-left origin, +Y down)
//! - the vertex program converts to clip space with a projection matrix

mod assembler;
mod backend;
mod batch;
mod dispatcher;
mod headless;
mod immediate;
mod program;
mod raster;
mod slots;
mod stage;
mod wgpu_backend;

pub use assembler::BatchAssembler;
pub use backend::{Backend, DrawCall, ProgramId, RenderTarget, TextureId};
pub use batch::{BatchBuffer, BatchReason, BatchStats, VERTICES_PER_CARD};
pub use dispatcher::{DrawDispatcher, DrawTarget};
pub use headless::{DrawRecord, HeadlessBackend};
pub use immediate::{paint_to_pixels, ImmediatePainter};
pub use program::{attrib, binding, ProgramBuilder, ProgramSource};
pub use raster::{CompositeOp, RasterCanvas};
pub use slots::{SlotState, TextureSlots};
pub use stage::{Stage, StageConfig};
pub use wgpu_backend::WgpuBackend;
