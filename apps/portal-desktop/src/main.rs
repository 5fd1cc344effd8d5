use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec2;
use portal_common::Viewport;
use portal_input::{InputCollector, Key};
use portal_render::{FrameOutcome, RenderLoop, SceneConfig};
use portal_render_wgpu::WgpuDevice;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

/// Pixels of trackpad scroll treated as one wheel line.
const PIXELS_PER_LINE: f32 = 20.0;

/// Grab modes in the order they are tried. A locked cursor never reaches the
/// window edge, so raw motion keeps turning the camera indefinitely.
const GRAB_PREFERENCE: [CursorGrabMode; 2] = [CursorGrabMode::Locked, CursorGrabMode::Confined];

#[derive(Parser)]
#[command(name = "portal-desktop", about = "Textured cubes seen through a fly camera")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene description (YAML). Built-in scene when omitted.
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Window width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Window height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Replace the image of the scene's textures, in order
    #[arg(long = "texture")]
    textures: Vec<PathBuf>,
}

/// Apply command-line overrides on top of the loaded scene.
fn apply_overrides(config: &mut SceneConfig, cli: &Cli) {
    if let Some(width) = cli.width {
        config.viewport.width = width;
    }
    if let Some(height) = cli.height {
        config.viewport.height = height;
    }
    if cli.textures.len() > config.textures.len() {
        tracing::warn!(
            "{} texture overrides given but the scene has {} texture slots; extras ignored",
            cli.textures.len(),
            config.textures.len()
        );
    }
    for (texture, path) in config.textures.iter_mut().zip(&cli.textures) {
        texture.path = path.clone();
    }
}

fn map_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::KeyW | KeyCode::ArrowUp => Some(Key::Forward),
        KeyCode::KeyS | KeyCode::ArrowDown => Some(Key::Backward),
        KeyCode::KeyA | KeyCode::ArrowLeft => Some(Key::StrafeLeft),
        KeyCode::KeyD | KeyCode::ArrowRight => Some(Key::StrafeRight),
        KeyCode::Escape => Some(Key::Exit),
        _ => None,
    }
}

struct PortalApp {
    config: SceneConfig,
    window: Option<Arc<Window>>,
    render_loop: Option<RenderLoop<WgpuDevice>>,
    input: InputCollector,
    /// Last pointer position; raw motion accumulates onto it while captured.
    last_pointer: Vec2,
    grab: Option<CursorGrabMode>,
    started: Instant,
    failure: Option<anyhow::Error>,
}

impl PortalApp {
    fn new(config: SceneConfig) -> Self {
        Self {
            config,
            window: None,
            render_loop: None,
            input: InputCollector::new(),
            last_pointer: Vec2::ZERO,
            grab: None,
            started: Instant::now(),
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let viewport = self.config.viewport;
        let attrs = Window::default_attributes()
            .with_title("Magic Portal")
            .with_inner_size(PhysicalSize::new(viewport.width, viewport.height));
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);

        self.grab = capture_cursor(&window);

        let size = window.inner_size();
        let device = WgpuDevice::new(
            window.clone(),
            Viewport {
                width: size.width,
                height: size.height,
            },
        )?;
        let mut config = self.config.clone();
        config.viewport = Viewport {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        self.render_loop = Some(RenderLoop::new(device, &config)?);
        self.window = Some(window);
        self.started = Instant::now();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        tracing::error!("{err:#}");
        self.failure = Some(err);
        event_loop.exit();
    }

    /// Absolute cursor position. Only drives the pointer when the cursor is
    /// not captured; a captured cursor reports motion as raw deltas.
    fn cursor_moved(&mut self, position: Vec2) {
        if self.grab.is_some() {
            return;
        }
        self.last_pointer = position;
        self.input.pointer_moved(position);
    }

    /// Raw device motion, unbounded by the window.
    fn raw_motion(&mut self, delta: Vec2) {
        if self.grab.is_none() {
            return;
        }
        self.input.pointer_motion(delta, self.last_pointer);
        self.last_pointer += delta;
    }

    fn shutdown(&mut self) {
        if let Some(render_loop) = self.render_loop.take() {
            let frames = render_loop.clock().frames();
            drop(render_loop.shutdown());
            tracing::info!("shut down after {frames} frames");
        }
    }
}

/// Hide the cursor and hold it in the window, trying [`GRAB_PREFERENCE`] in
/// order. `None` leaves the pointer on absolute cursor events.
fn capture_cursor(window: &Window) -> Option<CursorGrabMode> {
    window.set_cursor_visible(false);
    for mode in GRAB_PREFERENCE {
        match window.set_cursor_grab(mode) {
            Ok(()) => return Some(mode),
            Err(e) => tracing::debug!("cursor grab {mode:?} unavailable: {e}"),
        }
    }
    tracing::warn!("cursor could not be captured");
    None
}

impl ApplicationHandler for PortalApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.input.close_requested(),
            WindowEvent::Resized(size) => self.input.resized(size.width, size.height),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => {
                if let Some(key) = map_key(code) {
                    self.input.key(key, state == ElementState::Pressed);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                self.input.scroll(lines);
            }
            WindowEvent::Focused(false) => self.input.focus_lost(),
            WindowEvent::Focused(true) => {
                self.input.pointer_reactivated();
                if let Some(window) = &self.window {
                    self.grab = capture_cursor(window);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(render_loop) = self.render_loop.as_mut() else {
                    return;
                };
                let snapshot = self.input.take_snapshot();
                let now = self.started.elapsed().as_secs_f64();
                match render_loop.frame(now, &snapshot) {
                    Ok(FrameOutcome::Continue) => {}
                    Ok(FrameOutcome::Exit) => {
                        tracing::info!("exit requested");
                        event_loop.exit();
                    }
                    Err(e) => self.fail(event_loop, e.into()),
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.raw_motion(Vec2::new(dx as f32, dy as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut config = match &cli.scene {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };
    apply_overrides(&mut config, &cli);
    config.validate()?;

    tracing::info!("portal-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = PortalApp::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn wasd_and_arrows_map_to_the_same_keys() {
        assert_eq!(map_key(KeyCode::KeyW), map_key(KeyCode::ArrowUp));
        assert_eq!(map_key(KeyCode::KeyA), Some(Key::StrafeLeft));
        assert_eq!(map_key(KeyCode::Escape), Some(Key::Exit));
        assert_eq!(map_key(KeyCode::KeyQ), None);
    }

    #[test]
    fn cli_overrides_parse() {
        let cli = Cli::parse_from("portal-desktop --width 1024 --scene scene.yaml".split(' '));
        assert_eq!(cli.width, Some(1024));
        assert!(cli.height.is_none());
        assert_eq!(cli.scene.as_deref(), Some(Path::new("scene.yaml")));
    }

    #[test]
    fn texture_overrides_replace_paths_in_order() {
        let cli = Cli::parse_from(["portal-desktop", "--texture", "a.png", "--height", "480"]);
        let mut config = SceneConfig::default();
        let second = config.textures[1].path.clone();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.textures[0].path, PathBuf::from("a.png"));
        assert_eq!(config.textures[1].path, second);
        assert_eq!(config.viewport.height, 480);
    }

    #[test]
    fn locked_grab_is_preferred() {
        assert_eq!(GRAB_PREFERENCE[0], CursorGrabMode::Locked);
        assert!(GRAB_PREFERENCE.contains(&CursorGrabMode::Confined));
    }

    #[test]
    fn captured_raw_motion_keeps_turning_past_the_window_edge() {
        let mut app = PortalApp::new(SceneConfig::default());
        let width = app.config.viewport.width as f32;
        app.grab = Some(CursorGrabMode::Locked);
        app.input.pointer_reactivated();

        let mut pointers = Vec::new();
        for _ in 0..10 {
            app.raw_motion(Vec2::new(width / 2.0, 0.0));
            // The pinned cursor keeps reporting the same spot.
            app.cursor_moved(Vec2::new(width / 2.0, 300.0));
            pointers.push(app.input.take_snapshot().pointer.unwrap());
        }
        assert_eq!(pointers[0], Vec2::new(width / 2.0, 0.0));
        assert_eq!(pointers[9], Vec2::new(width * 5.0, 0.0));
        assert!(pointers.windows(2).all(|w| w[1].x > w[0].x));
    }

    #[test]
    fn confined_grab_also_reads_raw_motion() {
        let mut app = PortalApp::new(SceneConfig::default());
        app.grab = Some(CursorGrabMode::Confined);
        app.raw_motion(Vec2::new(3.0, -2.0));
        app.raw_motion(Vec2::new(1.0, 0.0));
        let snapshot = app.input.take_snapshot();
        assert_eq!(snapshot.pointer, Some(Vec2::new(4.0, -2.0)));
    }

    #[test]
    fn uncaptured_cursor_uses_absolute_positions() {
        let mut app = PortalApp::new(SceneConfig::default());
        app.raw_motion(Vec2::new(50.0, 50.0));
        assert_eq!(app.input.take_snapshot().pointer, None);

        let position = Vec2::new(120.0, 80.0);
        app.cursor_moved(position);
        assert_eq!(app.input.take_snapshot().pointer, Some(position));
    }
}
