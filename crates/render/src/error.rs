use std::path::PathBuf;

use crate::shader::StageKind;

/// Errors surfaced by the render core.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Window, surface, device or GPU object creation failed. Fatal at startup.
    #[error("failed to create {what}: {reason}")]
    ResourceCreation { what: &'static str, reason: String },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    TextureLoad(#[from] TextureLoadError),
    #[error("invalid vertex data: {0}")]
    Layout(#[from] LayoutError),
    #[error("failed to read shader source {}: {source}", path.display())]
    ShaderSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scene configuration: {0}")]
    Config(String),
}

impl RenderError {
    pub fn creation(what: &'static str, reason: impl ToString) -> Self {
        Self::ResourceCreation {
            what,
            reason: reason.to_string(),
        }
    }
}

/// A shader stage failed to parse or validate.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} shader compilation failed:\n{diagnostic}")]
pub struct CompileError {
    pub stage: StageKind,
    pub diagnostic: String,
}

/// Two compiled stages have incompatible interfaces.
#[derive(Debug, Clone, thiserror::Error)]
#[error("shader program linkage failed:\n{diagnostic}")]
pub struct LinkError {
    pub diagnostic: String,
}

/// A texture image could not be read or decoded. Non-fatal: the drawable
/// renders without that texture.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to load texture {}: {reason}", path.display())]
pub struct TextureLoadError {
    pub path: PathBuf,
    pub reason: String,
}

/// Vertex data or layout that does not describe a valid mesh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("attribute sizes sum to {attributes} bytes but the declared stride is {stride} bytes")]
    StrideMismatch { stride: u32, attributes: u32 },
    #[error("vertex layout declares no attributes")]
    NoAttributes,
    #[error("attribute location {0} is declared twice")]
    DuplicateLocation(u32),
    #[error("attribute at location {location} has {components} components (expected 1 to 4)")]
    BadComponentCount { location: u32, components: u32 },
    #[error("attribute at location {location} starts at byte {offset}, expected byte {expected}")]
    MisplacedAttribute {
        location: u32,
        offset: u32,
        expected: u32,
    },
    #[error("mesh has no vertices")]
    EmptyVertices,
    #[error("{floats} floats do not divide into vertices of {per_vertex} floats")]
    RaggedVertices { floats: usize, per_vertex: usize },
    #[error("index {index} is out of bounds for {vertex_count} vertices")]
    IndexOutOfBounds { index: u32, vertex_count: u32 },
}
