use anyhow::{Context, Result};
use wgpu::SurfaceError;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::RenderError;
use crate::render::WgpuBackend;

use super::surface;
use super::{GpuFrame, GpuInit, SurfaceErrorAction};

/// Device, queue and configured surface for one window.
///
/// The stage never sees this type directly. It draws through the
/// [`WgpuBackend`] handed out by [`create_backend`](Self::create_backend),
/// while the window loop uses `Gpu` to acquire, resize and present frames.
pub struct Gpu<'w> {
    /// Surface bound to the window. The window must outlive the `Gpu`.
    surface: wgpu::Surface<'w>,
    /// Adapter the device was requested from.
    adapter: wgpu::Adapter,
    /// Logical device. Cloned into the backend.
    device: wgpu::Device,
    /// Submission queue. Cloned into the backend.
    queue: wgpu::Queue,
    /// Active surface configuration; width and height track `size`.
    config: wgpu::SurfaceConfiguration,
    /// Drawable size in physical pixels.
    size: PhysicalSize<u32>,
}

impl<'w> Gpu<'w> {
    /// Creates the instance, surface, adapter and device for `window`, then
    /// configures the surface at the window's current size.
    ///
    /// Fails when the window has no area, no compatible adapter exists or the
    /// device request is refused. Adapter and device failures surface as
    /// [`RenderError::NoDevice`] under the returned context.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::NoDevice(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("mosaic device"),
                required_features: wgpu::Features::empty(),
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RenderError::NoDevice(e.to_string()))
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&caps, init.prefer_srgb)
            .context("no supported surface formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode: surface::choose_alpha_mode(&caps, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        let info = adapter.get_info();
        log::info!("gpu: {} ({:?}), surface {format:?}", info.name, info.backend);

        Ok(Self { surface, adapter, device, queue, config, size })
    }

    /// A render backend sharing this context's device and queue.
    pub fn create_backend(&self) -> WgpuBackend {
        WgpuBackend::new(self.device.clone(), self.queue.clone(), self.config.format)
    }

    /// Name, vendor and backend of the selected adapter.
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Format of the swapchain images; screen pipelines are built for it.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Current drawable size in physical pixels.
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Reconfigures the surface after a window resize.
    ///
    /// A zero-sized request (minimized window) records the size but leaves the
    /// surface configured as before.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        surface::apply_resize(&self.surface, &self.device, &mut self.config, &mut self.size, new_size);
    }

    /// Acquires the next swapchain image.
    ///
    /// The returned frame holds the surface texture until it is presented or
    /// dropped, so it should not outlive the redraw that acquired it. Errors
    /// go to [`handle_surface_error`](Self::handle_surface_error).
    pub fn begin_frame(&self) -> std::result::Result<GpuFrame, SurfaceError> {
        let surface_texture = self.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuFrame { surface_texture, view })
    }

    /// Decides how the window loop reacts to a failed acquire. Lost and
    /// outdated surfaces are reconfigured; timeouts skip the frame; running out
    /// of memory is fatal.
    pub fn handle_surface_error(&mut self, err: SurfaceError) -> SurfaceErrorAction {
        surface::map_surface_error(&self.surface, &self.device, &self.config, self.size, err)
    }
}
