use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use mosaic_engine::assets::{MemoryLoader, PixelBuffer};
use mosaic_engine::cache::filters::{BlurFilter, ColorFilter};
use mosaic_engine::cache::CacheOptions;
use mosaic_engine::coords::Rect;
use mosaic_engine::device::{Gpu, GpuInit, SurfaceErrorAction};
use mosaic_engine::logging::{init_logging, LoggingConfig};
use mosaic_engine::paint::Color;
use mosaic_engine::render::{Stage, StageConfig, WgpuBackend};
use mosaic_engine::scene::{Frame, Node, NodeId, Scene};

const SHEET: &str = "sprites.png";
const CELL: u32 = 32;

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

/// Demo scene: a grid of sprites, a spinning group and a cached, filtered badge.
struct Demo {
    scene: Scene,
    spinner: NodeId,
    badge: NodeId,
}

impl Demo {
    fn build(stage: &mut Stage<WgpuBackend>) -> Result<Self> {
        let mut scene = Scene::new();

        for row in 0..12 {
            for col in 0..20 {
                let cell = (row + col) % 2;
                let frame = Frame::new(SHEET, Rect::new((cell * CELL) as f32, 0.0, CELL as f32, CELL as f32));
                let mut node = Node::textured(frame).at(col as f32 * 40.0 + 20.0, row as f32 * 40.0 + 20.0);
                node.alpha = 0.35;
                scene.add(node);
            }
        }

        let spinner = scene.add(Node::container().at(400.0, 260.0));
        for i in 0..8 {
            let frame = Frame::new(SHEET, Rect::new(0.0, 0.0, CELL as f32, CELL as f32)).with_reg(16.0, 16.0);
            let angle = i as f32 * std::f32::consts::FRAC_PI_4;
            scene.add_child(spinner, Node::textured(frame).at(angle.cos() * 90.0, angle.sin() * 90.0))?;
        }

        let badge = scene.add(
            Node::container()
                .at(80.0, 420.0)
                .with_filter(BlurFilter::new(6.0, 6.0, 2))
                .with_filter(ColorFilter::tint(1.0, 0.82, 0.47)),
        );
        for i in 0..3 {
            let frame = Frame::new(SHEET, Rect::new(CELL as f32, 0.0, CELL as f32, CELL as f32));
            scene.add_child(badge, Node::textured(frame).at(i as f32 * 36.0, 0.0))?;
        }
        if let Some(font) = load_font().and_then(|bytes| stage.load_font(&bytes).ok()) {
            scene.add_child(badge, Node::text("mosaic", font, 20.0, Color::from_rgba8(255, 255, 255, 255)).at(0.0, 40.0))?;
        }

        Ok(Self { scene, spinner, badge })
    }

    fn tick(&mut self) {
        if let Some(node) = self.scene.get_mut(self.spinner) {
            node.transform.rotation = (node.transform.rotation + 0.5) % 360.0;
        }
    }
}

struct App {
    entry: Option<WindowEntry>,
    stage: Option<Stage<WgpuBackend>>,
    demo: Option<Demo>,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("mosaic studio")
            .with_inner_size(LogicalSize::new(840.0, 520.0));
        let window = event_loop.create_window(attrs).context("failed to create window")?;

        let entry = WindowEntryTryBuilder {
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, GpuInit::default())),
        }
        .try_build()?;

        let backend = entry.with_gpu(|gpu| gpu.create_backend());
        let size = entry.with_gpu(|gpu| gpu.size());
        let mut stage = Stage::new(backend, MemoryLoader::new().with_image(SHEET, sprite_sheet()), StageConfig {
            clear_color: Color::from_rgba8(24, 26, 32, 255),
            ..StageConfig::default()
        })?;
        stage.update_viewport(size.width, size.height);

        let mut demo = Demo::build(&mut stage)?;
        // First draw requests the sheet; the loader answers before the second.
        stage.update(&mut demo.scene)?;
        stage.update(&mut demo.scene)?;
        stage.cache(&mut demo.scene, demo.badge, Rect::new(0.0, 0.0, 110.0, 70.0), 1.0, CacheOptions::default())?;

        self.entry = Some(entry);
        self.stage = Some(stage);
        self.demo = Some(demo);
        Ok(())
    }

    fn redraw(&mut self) -> Result<bool> {
        let (Some(entry), Some(stage), Some(demo)) = (self.entry.as_mut(), self.stage.as_mut(), self.demo.as_mut())
        else {
            return Ok(true);
        };

        let frame = match entry.with_gpu(|gpu| gpu.begin_frame()) {
            Ok(frame) => frame,
            Err(e) => {
                return Ok(match entry.with_gpu_mut(|gpu| gpu.handle_surface_error(e)) {
                    SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => true,
                    SurfaceErrorAction::Fatal => false,
                });
            }
        };

        demo.tick();
        stage.backend_mut().set_screen(Some(frame.view.clone()));
        let drawn = stage.update(&mut demo.scene);
        stage.backend_mut().set_screen(None);
        frame.present();
        drawn?;

        log::trace!("draw {}: {:?}", stage.draw_id(), stage.batch_stats());
        Ok(true)
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            log::error!("failed to start: {e:#}");
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(stage) = self.stage.as_mut() {
                    stage.dispose();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.with_gpu_mut(|gpu| gpu.resize(size));
                }
                if let Some(stage) = self.stage.as_mut() {
                    stage.update_viewport(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => match self.redraw() {
                Ok(true) => {}
                Ok(false) => {
                    log::error!("surface lost for good");
                    event_loop.exit();
                }
                Err(e) => {
                    log::error!("draw failed: {e:#}");
                    event_loop.exit();
                }
            },
            _ => {}
        }
    }
}

/// Two 32x32 cells: a red disc and a blue square.
fn sprite_sheet() -> PixelBuffer {
    let mut sheet = PixelBuffer::new(CELL * 2, CELL);
    let r = CELL as f32 / 2.0;
    for y in 0..CELL {
        for x in 0..CELL {
            let (dx, dy) = (x as f32 + 0.5 - r, y as f32 + 0.5 - r);
            if dx * dx + dy * dy <= r * r {
                sheet.set_pixel(x, y, [230, 70, 60, 255]);
            }
            sheet.set_pixel(CELL + x, y, [60, 110, 230, 255]);
        }
    }
    sheet
}

fn load_font() -> Option<Vec<u8>> {
    [
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/noto/NotoSans-Regular.ttf",
        "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    ]
    .iter()
    .find_map(|p| std::fs::read(p).ok())
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut app = App { entry: None, stage: None, demo: None };
    event_loop
        .run_app(&mut app)
        .context("winit event loop terminated with error")?;
    Ok(())
}
