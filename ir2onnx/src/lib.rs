//! IR to ONNX converter: lowers a channels-last IR graph plus its weight
//! store into a Python program that builds the equivalent ONNX model.

pub mod emit;
pub mod error;
pub mod ir;
pub mod parse;
pub mod weights;

pub use emit::{emit, ConstantMode, EmitOptions, Emitted, OnnxProgram};
pub use error::{Error, Result};
pub use ir::{GraphBuilder, IrGraph};
pub use weights::{WeightArray, WeightStore};
