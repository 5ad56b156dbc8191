//! In-memory ONNX program: the statements produced by lowering, in emission
//! order, plus the four identifier lists the final `make_graph` call takes.
//!
//! Produced by `emit()`, consumed by `render`.

use std::collections::HashSet;

use serde::Serialize;

use crate::weights::WeightArray;

/// ONNX `TensorProto.DataType` members the emitter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TensorType {
    Float,
    Uint8,
    Int8,
    Uint16,
    Int16,
    Int32,
    Int64,
    Bool,
    Float16,
    Double,
    Uint32,
    Uint64,
}

impl TensorType {
    pub fn proto_name(self) -> &'static str {
        match self {
            TensorType::Float => "FLOAT",
            TensorType::Uint8 => "UINT8",
            TensorType::Int8 => "INT8",
            TensorType::Uint16 => "UINT16",
            TensorType::Int16 => "INT16",
            TensorType::Int32 => "INT32",
            TensorType::Int64 => "INT64",
            TensorType::Bool => "BOOL",
            TensorType::Float16 => "FLOAT16",
            TensorType::Double => "DOUBLE",
            TensorType::Uint32 => "UINT32",
            TensorType::Uint64 => "UINT64",
        }
    }

    /// Python literal, e.g. `TensorProto.FLOAT`.
    pub fn literal(self) -> String {
        format!("TensorProto.{}", self.proto_name())
    }
}

/// Shape and element type bound to a graph input or output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueInfo {
    pub ident: String,
    /// Name of the tensor this declaration describes
    pub tensor: String,
    pub elem_type: TensorType,
    pub dims: Vec<i64>,
}

/// Where a constant's values come from in the weight file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeightSource {
    pub node: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstantDecl {
    /// Identifier and output tensor name
    pub ident: String,
    pub source: WeightSource,
    /// Axis permutation applied to the stored array
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permutation: Option<Vec<usize>>,
    /// Values after the permutation
    pub value: WeightArray,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrLiteral {
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Str(String),
}

/// One `helper.make_node` call with a single output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpNode {
    pub ident: String,
    pub op_type: &'static str,
    pub inputs: Vec<String>,
    pub output: String,
    pub attrs: Vec<(&'static str, AttrLiteral)>,
}

impl OpNode {
    pub fn new(ident: impl Into<String>, op_type: &'static str, inputs: Vec<String>) -> Self {
        let ident = ident.into();
        Self {
            output: ident.clone(),
            ident,
            op_type,
            inputs,
            attrs: Vec::new(),
        }
    }

    pub fn with(mut self, name: &'static str, value: AttrLiteral) -> Self {
        self.attrs.push((name, value));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&AttrLiteral> {
        self.attrs.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    Input(ValueInfo),
    /// `Constant` node carrying a weight tensor
    Constant(ConstantDecl),
    /// Graph initializer carrying a weight tensor
    Initializer(ConstantDecl),
    Node(OpNode),
    Output(ValueInfo),
}

impl Statement {
    pub fn ident(&self) -> &str {
        match self {
            Statement::Input(v) | Statement::Output(v) => &v.ident,
            Statement::Constant(c) | Statement::Initializer(c) => &c.ident,
            Statement::Node(n) => &n.ident,
        }
    }

    /// Tensor names this statement reads.
    pub fn uses(&self) -> Vec<&str> {
        match self {
            Statement::Node(n) => n.inputs.iter().map(String::as_str).collect(),
            Statement::Output(v) => vec![v.tensor.as_str()],
            Statement::Input(_) | Statement::Constant(_) | Statement::Initializer(_) => vec![],
        }
    }

    /// Tensor name this statement makes available to later statements.
    pub fn defines(&self) -> Option<&str> {
        match self {
            Statement::Input(v) => Some(&v.tensor),
            Statement::Constant(c) | Statement::Initializer(c) => Some(&c.ident),
            Statement::Node(n) => Some(&n.output),
            Statement::Output(_) => None,
        }
    }
}

/// A tensor read before (or without) being defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    pub statement: String,
    pub tensor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnnxProgram {
    pub graph_name: String,
    pub statements: Vec<Statement>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub nodes: Vec<String>,
    pub initializers: Vec<String>,
}

impl OnnxProgram {
    pub fn statement(&self, ident: &str) -> Option<&Statement> {
        self.statements.iter().find(|s| s.ident() == ident)
    }

    /// Every read of a tensor that no earlier statement defined.
    pub fn dangling_references(&self) -> Vec<DanglingRef> {
        let mut defined: HashSet<&str> = HashSet::new();
        let mut dangling = Vec::new();
        for stmt in &self.statements {
            for tensor in stmt.uses() {
                if !defined.contains(tensor) {
                    dangling.push(DanglingRef {
                        statement: stmt.ident().to_string(),
                        tensor: tensor.to_string(),
                    });
                }
            }
            if let Some(t) = stmt.defines() {
                defined.insert(t);
            }
        }
        dangling
    }
}
