//! Lowering of an IR graph to an ONNX model-building program.
//!
//! `emit` walks the graph in topological order, lowers each node into zero
//! or more statements, then declares one graph output per unconsumed node
//! that was lowered.
//! The resulting `OnnxProgram` is rendered by [`render`].

mod lower;
pub mod plan;
pub mod render;
pub mod shapes;
mod state;

use crate::error::Result;
use crate::ir::IrGraph;
use crate::weights::WeightStore;

pub use lower::{map_dtype, CONV_WEIGHT_PERM};
pub use plan::{
    AttrLiteral, ConstantDecl, DanglingRef, OnnxProgram, OpNode, Statement, TensorType, ValueInfo,
    WeightSource,
};
pub use render::{render_json, render_python};
pub use state::SkippedNode;

use lower::Lowerer;

pub const DEFAULT_GRAPH_NAME: &str = "ir2onnx";

/// How weight tensors enter the emitted graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConstantMode {
    /// One `Constant` node per weight, listed among the graph nodes
    #[default]
    Node,
    /// One initializer per weight
    Initializer,
}

#[derive(Debug, Clone)]
pub struct EmitOptions {
    pub graph_name: String,
    pub constants: ConstantMode,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            graph_name: DEFAULT_GRAPH_NAME.to_string(),
            constants: ConstantMode::default(),
        }
    }
}

/// Result of one emission run.
#[derive(Debug, Clone)]
pub struct Emitted {
    pub program: OnnxProgram,
    /// Nodes left out of the program, in topological order
    pub skipped: Vec<SkippedNode>,
}

impl Emitted {
    /// True when every IR node was lowered.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub fn emit(graph: &IrGraph, weights: &WeightStore, options: &EmitOptions) -> Result<Emitted> {
    let mut lowerer = Lowerer::new(graph, weights, options);
    for node in graph.topological_order() {
        lowerer.lower_node(node)?;
    }

    let mut state = lowerer.state;
    for node in graph.output_nodes() {
        if state.skipped().iter().any(|s| s.name == node.name) {
            log::warn!("output {} was not lowered; no graph output declared", node.name);
            continue;
        }
        let elem_type = map_dtype(node)?;
        let dims = shapes::concrete_dims(node.output_shape()?);
        let ident = state.fresh(&format!("{}_out", node.variable));
        state.declare_output(ValueInfo {
            ident,
            tensor: node.variable.clone(),
            elem_type,
            dims,
        });
    }

    let (program, skipped) = state.finish(&options.graph_name);
    log::info!(
        "emitted graph '{}': {} inputs, {} outputs, {} nodes, {} initializers",
        program.graph_name,
        program.inputs.len(),
        program.outputs.len(),
        program.nodes.len(),
        program.initializers.len()
    );
    if !skipped.is_empty() {
        log::warn!("{} node(s) were not lowered", skipped.len());
    }
    Ok(Emitted { program, skipped })
}
