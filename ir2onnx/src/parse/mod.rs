//! Readers for serialized IR graphs.

pub mod ir_json;

pub use ir_json::{graph_from_str, load_graph};
