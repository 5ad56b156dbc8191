//! Operator kinds the ONNX emitter knows how to lower.
//! Each variant maps to one lowering rule in `emit::lower`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Graph input placeholder
    DataInput,
    Conv,
    BatchNorm,
    Relu,
    /// Elementwise sum of every incoming edge
    Add,
    /// Average/max pooling, optionally global
    Pool,
    FullyConnected,
    Pad,
    Concat,
    Flatten,
    Softmax,
    /// Any tag without a lowering rule
    Unsupported(String),
}

impl OpKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "DataInput" => OpKind::DataInput,
            "Conv" => OpKind::Conv,
            "BatchNorm" => OpKind::BatchNorm,
            "Relu" => OpKind::Relu,
            "Add" => OpKind::Add,
            "Pool" => OpKind::Pool,
            "FullyConnected" => OpKind::FullyConnected,
            "Pad" => OpKind::Pad,
            "Concat" => OpKind::Concat,
            "Flatten" => OpKind::Flatten,
            "Softmax" => OpKind::Softmax,
            other => OpKind::Unsupported(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            OpKind::DataInput => "DataInput",
            OpKind::Conv => "Conv",
            OpKind::BatchNorm => "BatchNorm",
            OpKind::Relu => "Relu",
            OpKind::Add => "Add",
            OpKind::Pool => "Pool",
            OpKind::FullyConnected => "FullyConnected",
            OpKind::Pad => "Pad",
            OpKind::Concat => "Concat",
            OpKind::Flatten => "Flatten",
            OpKind::Softmax => "Softmax",
            OpKind::Unsupported(tag) => tag,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
