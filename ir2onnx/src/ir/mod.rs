pub mod graph;
pub mod node;
pub mod op;
pub mod types;

pub use graph::{GraphBuilder, IrGraph, NodeDecl};
pub use node::{Edge, IrNode, NodeId};
pub use op::OpKind;
pub use types::{AttrList, AttrValue, DType, Dim, Shape};
