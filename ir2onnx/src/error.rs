use std::path::PathBuf;

use crate::ir::DType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input file (IR graph or weights) does not exist
    #[error("{what} file [{}] is not found", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Structurally valid JSON that does not describe a graph or weight store
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("node '{0}' is declared more than once")]
    DuplicateNode(String),

    #[error("node '{node}' consumes unknown producer '{input}'")]
    UnknownProducer { node: String, input: String },

    #[error("graph contains a cycle through: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("node '{node}' has no producer on input edge {edge}")]
    MissingProducer { node: String, edge: usize },

    #[error("node '{node}' is missing required attribute '{attr}'")]
    MissingAttribute { node: String, attr: String },

    #[error("node '{node}' has invalid attribute '{attr}': {reason}")]
    InvalidAttribute {
        node: String,
        attr: String,
        reason: String,
    },

    #[error("no weights for role '{role}' of node '{node}'")]
    MissingWeight { node: String, role: String },

    #[error("weights '{role}' of node '{node}' have an unexpected layout: {reason}")]
    WeightLayout {
        node: String,
        role: String,
        reason: String,
    },

    #[error("failed to serialize program: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("node '{node}': no ONNX element type registered for {dtype}")]
    UnmappedDType { node: String, dtype: DType },
}
