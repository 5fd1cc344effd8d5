use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec2;
use portal_input::{InputSnapshot, Key, KeySet};
use portal_render::shader::{self, StageKind};
use portal_render::{
    HeadlessDevice, MeshKind, ProgramInterface, RenderLoop, SceneConfig, ScriptedSource,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "portal-cli", about = "Shader checks and headless frame simulation")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and built-in scene info
    Info,
    /// Compile and link a vertex/fragment pair and print the program interface
    CheckShaders {
        vertex: PathBuf,
        fragment: PathBuf,
    },
    /// Run the render loop against a recording device
    Simulate {
        /// Number of frames to run
        #[arg(short, long, default_value = "60")]
        frames: usize,
        /// Seconds per frame
        #[arg(long, default_value = "0.016")]
        step: f64,
        /// Hold the forward key for every frame
        #[arg(long)]
        forward: bool,
        /// Horizontal pointer travel per frame, in pixels
        #[arg(long, default_value = "0")]
        look: f32,
        /// Scene description (YAML)
        #[arg(long)]
        scene: Option<PathBuf>,
        /// Print a JSON summary instead of the frame listing
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct SimulationSummary {
    frames_presented: u64,
    elapsed_seconds: f32,
    camera_position: [f32; 3],
    yaw_degrees: f32,
    pitch_degrees: f32,
    fov_degrees: f32,
    draws_last_frame: usize,
}

fn scripted_input(frames: usize, forward: bool, look: f32) -> Vec<InputSnapshot> {
    let keys = if forward {
        KeySet::new().with(Key::Forward)
    } else {
        KeySet::new()
    };
    (0..frames)
        .map(|i| InputSnapshot {
            keys,
            pointer: (look != 0.0).then(|| Vec2::new(i as f32 * look, 0.0)),
            ..InputSnapshot::default()
        })
        .collect()
}

fn print_interface(interface: &ProgramInterface) {
    let (vs, fs) = (&interface.vertex_entry, &interface.fragment_entry);
    println!("entry points: {vs} / {fs}");
    println!("vertex inputs:");
    for input in &interface.vertex_inputs {
        let (location, components) = (input.location, input.components);
        println!("  @location({location}) {components} components");
    }
    println!("uniform buffers:");
    for buffer in &interface.uniform_buffers {
        println!(
            "  {} @group({}) @binding({}) {} bytes",
            buffer.name, buffer.group, buffer.binding, buffer.size
        );
        for field in &buffer.fields {
            println!("    {} {:?} at +{}", field.name, field.ty, field.offset);
        }
    }
    println!("texture slots:");
    for slot in &interface.texture_slots {
        let (group, binding) = (slot.group, slot.binding);
        println!("  {} @group({group}) @binding({binding})", slot.name);
    }
}

fn check_shaders(vertex: &Path, fragment: &Path) -> anyhow::Result<()> {
    let vs = shader::read_shader_source(vertex)?;
    let fs = shader::read_shader_source(fragment)?;
    let vs = shader::compile(&vs, StageKind::Vertex)
        .with_context(|| format!("{}", vertex.display()))?;
    let fs = shader::compile(&fs, StageKind::Fragment)
        .with_context(|| format!("{}", fragment.display()))?;
    let program = shader::link(&vs, &fs)?;
    println!("linked {} + {}", vertex.display(), fragment.display());
    print_interface(&program.interface);
    Ok(())
}

fn simulate(
    frames: usize,
    step: f64,
    forward: bool,
    look: f32,
    scene: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let config = match scene {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };
    let mut render_loop = RenderLoop::new(HeadlessDevice::new(), &config)?;
    let mut source = ScriptedSource::new(scripted_input(frames, forward, look), step);
    let presented = render_loop.run(&mut source)?;

    let device = render_loop.context().device();
    let state = render_loop.camera().state();
    if json {
        let summary = SimulationSummary {
            frames_presented: presented,
            elapsed_seconds: render_loop.clock().elapsed(),
            camera_position: state.position().to_array(),
            yaw_degrees: state.yaw(),
            pitch_degrees: state.pitch(),
            fov_degrees: render_loop.pipeline().projection().fov_degrees(),
            draws_last_frame: device.draws().len(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", device.describe_frame());
        println!(
            "camera at {:?} yaw {:.1} pitch {:.1}",
            state.position(),
            state.yaw(),
            state.pitch()
        );
    }

    let device = render_loop.shutdown();
    let live = device.live_objects().len();
    tracing::debug!("{live} objects left after shutdown");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("portal-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", portal_render::crate_info());
            let config = SceneConfig::default();
            println!(
                "default scene: {} mesh, {} drawables, {} textures",
                config.mesh.name(),
                config.drawables.len(),
                config.textures.len()
            );
            for kind in [MeshKind::Quad, MeshKind::Cube] {
                println!(
                    "  {}: {} vertices, {} floats per vertex",
                    kind.name(),
                    kind.vertices().len() / kind.layout().floats_per_vertex(),
                    kind.layout().floats_per_vertex()
                );
            }
        }
        Commands::CheckShaders { vertex, fragment } => check_shaders(&vertex, &fragment)?,
        Commands::Simulate {
            frames,
            step,
            forward,
            look,
            scene,
            json,
        } => simulate(frames, step, forward, look, scene.as_deref(), json)?,
    }

    Ok(())
}
