// =============================================================================
// VULKAN NOTES - window, event loop and frame pacing
// =============================================================================
//
// FRAME FLOW (see frame.rs for the GPU side):
// 1. winit delivers input; held keys are tracked in InputState
// 2. about_to_wait paces redraws to target_fps
// 3. RedrawRequested runs one FrameLoop iteration: scene update, uploads,
//    fence wait, acquire, record, submit, present
//
// Any error is fatal: it is stored, the event loop exits and main returns it.
// =============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vulkan_notes::backend::{DeviceDesc, PresentTarget, VulkanDevice};
use vulkan_notes::config::{Config, DemoKind};
use vulkan_notes::input::InputState;
use vulkan_notes::scene::{self, FrameInput, Scene};
use vulkan_notes::{FrameLoop, Renderer};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

#[derive(Parser, Debug)]
#[command(name = "vulkan-notes", about = "Vulkan demos: triangle, animated grid, textured model")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Demo to run (triangle, grid, model); overrides scene.demo
    #[arg(long)]
    demo: Option<DemoKind>,

    /// OBJ file for the model demo; overrides scene.model_path
    #[arg(long)]
    model: Option<PathBuf>,

    /// Disable the validation layer even in debug builds
    #[arg(long)]
    no_validation: bool,
}

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) = Config::load_from_path(&args.config)?;
    if let Some(demo) = args.demo {
        config.scene.demo = demo;
    }
    if let Some(model) = args.model {
        config.scene.model_path = model;
    }

    init_logging(&config)?;
    source.log();
    log::debug!("Config: {:?}", config);

    let validation = config.graphics.validation && cfg!(debug_assertions) && !args.no_validation;

    log::info!("Starting Vulkan Notes");
    log::info!(
        "Window: {}x{}, demo: {:?}, validation: {}",
        config.window.width,
        config.window.height,
        config.scene.demo,
        validation
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, validation);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// `debug.log_level` is the default filter; RUST_LOG still overrides it
fn init_logging(config: &Config) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.debug.log_level);
    builder.parse_default_env();

    if config.debug.log_to_file {
        let file = std::fs::File::create(&config.debug.log_file)
            .with_context(|| format!("Failed to create log file {:?}", config.debug.log_file))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(())
}

/// The first fatal error is the one `main` returns
fn record_first_error(slot: &mut Option<anyhow::Error>, error: anyhow::Error) {
    if slot.is_none() {
        *slot = Some(error);
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Everything that exists only while the window does
struct RenderState {
    frame_loop: FrameLoop,
    renderer: Renderer,
    scene: Box<dyn Scene>,
}

/// Field order matters for Drop: the renderer (and with it the surface)
/// must go before the window it was created from.
struct App {
    state: Option<RenderState>,
    window: Option<Arc<Window>>,

    config: Config,
    validation: bool,
    input: InputState,
    error: Option<anyhow::Error>,

    // Timing
    start: Instant,
    last_frame: Instant,
    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config, validation: bool) -> Self {
        let now = Instant::now();
        Self {
            state: None,
            window: None,
            config,
            validation,
            input: InputState::default(),
            error: None,
            start: now,
            last_frame: now,
            frame_count: 0,
            last_fps_update: now,
        }
    }

    fn init_vulkan(&self, window: &Window) -> Result<RenderState> {
        let scene = scene::build_scene(&self.config.scene, &self.config.camera)?;

        let desc = DeviceDesc::from_config(&self.config, self.validation);
        let target = PresentTarget::Window {
            display: window.raw_display_handle(),
            window: window.raw_window_handle(),
        };
        let device = VulkanDevice::new(&desc, target)?;

        let size = window.inner_size();
        let renderer = Renderer::new(device, &self.config, scene.as_ref(), size.width, size.height)?;
        let frame_loop = FrameLoop::new(renderer.slot_count())?;

        Ok(RenderState {
            frame_loop,
            renderer,
            scene,
        })
    }

    /// Only the first fatal error is kept; later ones are logged
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal: {:?}", error);
        record_first_error(&mut self.error, error);
        event_loop.exit();
    }

    fn frame_interval(&self) -> Option<Duration> {
        match self.config.graphics.target_fps {
            0 => None,
            fps => Some(Duration::from_secs_f64(1.0 / fps as f64)),
        }
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    fn redraw(&mut self) -> Result<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };

        let now = Instant::now();
        let frame = FrameInput {
            time: now.duration_since(self.start).as_secs_f32(),
            delta: now.duration_since(self.last_frame).as_secs_f32(),
            aspect: state.renderer.aspect_ratio(),
            input: &self.input,
        };
        self.last_frame = now;
        let frame_time = frame.delta;

        state
            .frame_loop
            .render_frame(&mut state.renderer, state.scene.as_mut(), &frame)?;

        self.update_fps(frame_time);
        Ok(())
    }

    fn update_fps(&mut self, frame_time: f32) {
        if !self.config.debug.show_fps {
            return;
        }

        self.frame_count += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();

        // Update title every second
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{:?}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    self.config.scene.demo
                ));
            }
            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // The swapchain extent is fixed for the whole run
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match self.init_vulkan(&window) {
            Ok(state) => {
                self.state = Some(state);
                self.window = Some(window);
                self.start = Instant::now();
                self.last_frame = self.start;
                self.last_fps_update = self.start;
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}; swapchain keeps its extent", size.width, size.height);
            }

            WindowEvent::Focused(false) => self.input.clear(),

            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if key == KeyCode::Escape && event.state.is_pressed() {
                        log::info!("ESC pressed, exiting...");
                        event_loop.exit();
                    } else {
                        self.input.handle_key(key, event.state);
                    }
                }
            }

            _ => {}
        }
    }

    /// Pace redraws to target_fps, or redraw continuously when uncapped
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(ref window) = self.window else {
            return;
        };

        match self.frame_interval() {
            None => {
                event_loop.set_control_flow(ControlFlow::Poll);
                window.request_redraw();
            }
            Some(interval) => {
                let next = self.last_frame + interval;
                if Instant::now() >= next {
                    window.request_redraw();
                }
                event_loop.set_control_flow(ControlFlow::WaitUntil(next));
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            log::info!("Rendered {} frames", state.frame_loop.frames_rendered());
        }
        // Tear down GPU resources while the window is still alive
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fatal_error_wins() {
        let mut slot = None;
        record_first_error(&mut slot, anyhow::anyhow!("acquire failed"));
        record_first_error(&mut slot, anyhow::anyhow!("device lost during teardown"));
        assert_eq!(slot.unwrap().to_string(), "acquire failed");
    }
}
