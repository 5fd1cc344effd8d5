//! The per-frame schedule.
//!
//! One frame: tick the clock, read the input snapshot (stopping on a close
//! signal), update the camera, clear, then for each drawable upload its model
//! transform, bind its textures and mesh and draw, and finally present.

use std::collections::VecDeque;

use portal_common::Viewport;
use portal_input::InputSnapshot;

use crate::camera::Camera;
use crate::clock::FrameClock;
use crate::config::SceneConfig;
use crate::context::RenderContext;
use crate::device::{ClearState, GraphicsDevice};
use crate::error::RenderError;
use crate::pipeline::{Projection, TransformPipeline};
use crate::scene::Scene;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Exit,
}

/// Supplies one input snapshot and one clock reading per frame.
pub trait FrameSource {
    fn poll(&mut self) -> InputSnapshot;
    /// Monotonic time in seconds.
    fn now(&self) -> f64;
}

/// A fixed list of snapshots advanced at a fixed time step. Requests close
/// once the list runs out.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    frames: VecDeque<InputSnapshot>,
    time: f64,
    step: f64,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = InputSnapshot>, step: f64) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            time: 0.0,
            step,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn poll(&mut self) -> InputSnapshot {
        self.time += self.step;
        self.frames.pop_front().unwrap_or_else(|| InputSnapshot {
            close_requested: true,
            ..InputSnapshot::default()
        })
    }

    fn now(&self) -> f64 {
        self.time
    }
}

pub struct RenderLoop<D: GraphicsDevice> {
    ctx: RenderContext<D>,
    scene: Scene,
    camera: Camera,
    clock: FrameClock,
    pipeline: TransformPipeline,
    clear: ClearState,
}

impl<D: GraphicsDevice> RenderLoop<D> {
    pub fn new(device: D, config: &SceneConfig) -> Result<Self, RenderError> {
        config.validate()?;
        let mut ctx = RenderContext::new(device);
        ctx.resize(config.viewport);
        let scene = Scene::build(&mut ctx, config)?;

        let cam = &config.camera;
        let projection = Projection::new(cam.fov_degrees, cam.near, cam.far, config.viewport);
        Ok(Self {
            ctx,
            scene,
            camera: Camera::new(cam.mode, cam.initial_state()),
            clock: FrameClock::new(),
            pipeline: TransformPipeline::new(projection),
            clear: ClearState {
                color: config.clear_color,
                depth: config.depth_test,
            },
        })
    }

    pub fn context(&self) -> &RenderContext<D> {
        &self.ctx
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Run one frame at time `now` with this frame's input.
    pub fn frame(&mut self, now: f64, input: &InputSnapshot) -> Result<FrameOutcome, RenderError> {
        let dt = self.clock.tick(now);
        if input.wants_exit() {
            tracing::info!("close requested after {} frames", self.clock.frames() - 1);
            return Ok(FrameOutcome::Exit);
        }

        if let Some((width, height)) = input.resize {
            // A minimised window reports a zero size; keep the last real one.
            if width > 0 && height > 0 {
                let viewport = Viewport { width, height };
                self.ctx.resize(viewport);
                self.pipeline.projection_mut().set_viewport(viewport);
            }
        }

        self.camera.update(input, dt);
        if self.camera.accepts_zoom() && input.scroll != 0.0 {
            self.pipeline.projection_mut().zoom(input.scroll);
        }
        let elapsed = self.clock.elapsed();
        let view = self.camera.view_matrix(elapsed);

        self.ctx.begin_frame(&self.clear);
        let program = self.scene.program();
        program.use_program(&mut self.ctx);
        self.pipeline.begin_frame(&mut self.ctx, program, view);
        for drawable in self.scene.drawables() {
            let pose = drawable.pose_at(elapsed);
            self.pipeline.upload_model(&mut self.ctx, program, &pose);
            self.scene.bind_textures(&mut self.ctx);
            self.scene.mesh().bind(&mut self.ctx);
            self.scene.mesh().draw(&mut self.ctx);
        }
        self.ctx.present()?;
        Ok(FrameOutcome::Continue)
    }

    /// Drive frames from `source` until it signals close. Returns the number
    /// of frames presented.
    pub fn run(&mut self, source: &mut impl FrameSource) -> Result<u64, RenderError> {
        let mut presented = 0;
        loop {
            let input = source.poll();
            match self.frame(source.now(), &input)? {
                FrameOutcome::Continue => presented += 1,
                FrameOutcome::Exit => return Ok(presented),
            }
        }
    }

    /// Release every scene resource and hand back the device.
    pub fn shutdown(self) -> D {
        let mut ctx = self.ctx;
        self.scene.destroy(&mut ctx);
        ctx.shutdown()
    }
}
