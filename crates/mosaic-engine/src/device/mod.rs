//! Window-bound GPU context.
//!
//! [`Gpu`] owns the wgpu device and the presentation surface. Rendering itself
//! goes through [`crate::render::WgpuBackend`], which shares the device and
//! queue and draws into the view of the frame acquired here.

mod gpu;
mod surface;

pub use gpu::Gpu;

/// Initialization parameters for the GPU layer.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Prefer an sRGB surface format when available.
    ///
    /// Off by default: batch programs blend in the space textures are stored in.
    pub prefer_srgb: bool,

    /// Present mode (swap behavior). FIFO is supported everywhere.
    pub present_mode: wgpu::PresentMode,

    /// If provided but unsupported on the current surface, a supported mode is selected.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub power_preference: wgpu::PowerPreference,

    /// Limits requested from the device. `max_sampled_textures_per_shader_stage`
    /// caps how many texture slots a batch program can bind.
    pub required_limits: wgpu::Limits,

    /// Hint only; support depends on platform and backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: false,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
        }
    }
}

/// One acquired swapchain image.
///
/// Holding it blocks acquisition of the next frame; call [`GpuFrame::present`]
/// once every draw into `view` has been submitted.
pub struct GpuFrame {
    /// Acquired surface texture.
    pub surface_texture: wgpu::SurfaceTexture,
    /// View of `surface_texture`; hand it to the backend as the screen target.
    pub view: wgpu::TextureView,
}

impl GpuFrame {
    /// Schedules the image for display. The view is dropped first so no
    /// reference to the texture outlives presentation.
    pub fn present(self) {
        drop(self.view);
        self.surface_texture.present();
    }
}

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}
