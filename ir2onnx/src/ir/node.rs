//! IR nodes and typed attribute access.

use crate::error::{Error, Result};
use crate::ir::op::OpKind;
use crate::ir::types::{AttrValue, DType, Shape};

pub type NodeId = usize;

/// Attribute holding the inferred output shapes of a node.
pub const OUTPUT_SHAPES_ATTR: &str = "_output_shapes";

/// Reference to one output of a producer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub producer: NodeId,
    pub output: usize,
}

#[derive(Debug, Clone)]
pub struct IrNode {
    pub id: NodeId,
    pub name: String,
    pub op: OpKind,
    pub attrs: Vec<(String, AttrValue)>,
    pub inputs: Vec<Edge>,
    /// Unique identifier used for the node's tensor in the emitted graph
    pub variable: String,
}

impl IrNode {
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Identifier of output `index`: the bare variable for output 0,
    /// `<variable>:<index>` otherwise.
    pub fn output_ident(&self, index: usize) -> String {
        if index == 0 {
            self.variable.clone()
        } else {
            format!("{}:{index}", self.variable)
        }
    }

    fn missing(&self, key: &str) -> Error {
        Error::MissingAttribute {
            node: self.name.clone(),
            attr: key.to_string(),
        }
    }

    pub(crate) fn invalid(&self, key: &str, reason: impl Into<String>) -> Error {
        Error::InvalidAttribute {
            node: self.name.clone(),
            attr: key.to_string(),
            reason: reason.into(),
        }
    }

    fn wrong_kind(&self, key: &str, expected: &str, got: &AttrValue) -> Error {
        self.invalid(key, format!("expected {expected}, got {}", got.kind_name()))
    }

    /// Integer list attribute. Required.
    pub fn ints(&self, key: &str) -> Result<Vec<i64>> {
        match self.attr(key) {
            Some(AttrValue::List(list)) => Ok(list.ints.clone()),
            Some(other) => Err(self.wrong_kind(key, "int list", other)),
            None => Err(self.missing(key)),
        }
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        match self.attr(key) {
            Some(AttrValue::Int(v)) => Ok(*v),
            Some(other) => Err(self.wrong_kind(key, "int", other)),
            None => Err(self.missing(key)),
        }
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.attr(key) {
            None => Ok(default),
            Some(_) => self.int(key),
        }
    }

    /// Float attribute; integer payloads are widened.
    pub fn float_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.attr(key) {
            Some(AttrValue::Float(v)) => Ok(*v),
            Some(AttrValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(self.wrong_kind(key, "float", other)),
            None => Ok(default),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.attr(key) {
            Some(AttrValue::Bool(v)) => Ok(*v),
            Some(other) => Err(self.wrong_kind(key, "bool", other)),
            None => Ok(default),
        }
    }

    pub fn string(&self, key: &str) -> Result<&str> {
        match self.attr(key) {
            Some(AttrValue::Str(s)) => Ok(s),
            Some(other) => Err(self.wrong_kind(key, "string", other)),
            None => Err(self.missing(key)),
        }
    }

    pub fn string_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.attr(key) {
            None => Ok(default),
            Some(_) => self.string(key),
        }
    }

    pub fn shape(&self, key: &str) -> Result<&Shape> {
        match self.attr(key) {
            Some(AttrValue::Shape(shape)) => Ok(shape),
            Some(other) => Err(self.wrong_kind(key, "shape", other)),
            None => Err(self.missing(key)),
        }
    }

    /// First entry of `_output_shapes`.
    pub fn output_shape(&self) -> Result<&Shape> {
        match self.attr(OUTPUT_SHAPES_ATTR) {
            Some(AttrValue::List(list)) => list
                .shapes
                .first()
                .ok_or_else(|| self.invalid(OUTPUT_SHAPES_ATTR, "no shapes listed")),
            Some(other) => Err(self.wrong_kind(OUTPUT_SHAPES_ATTR, "shape list", other)),
            None => Err(self.missing(OUTPUT_SHAPES_ATTR)),
        }
    }

    /// Declared element type; an absent `dtype` reads as `Undefined`.
    pub fn dtype(&self) -> Result<DType> {
        match self.attr("dtype") {
            Some(AttrValue::Type(dt)) => Ok(*dt),
            Some(other) => Err(self.wrong_kind("dtype", "type", other)),
            None => Ok(DType::Undefined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(attrs: Vec<(&str, AttrValue)>) -> IrNode {
        IrNode {
            id: 0,
            name: "conv1".to_string(),
            op: OpKind::Conv,
            attrs: attrs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            inputs: vec![],
            variable: "conv1".to_string(),
        }
    }

    #[test]
    fn defaults_apply_only_when_absent() {
        let n = node(vec![("group", AttrValue::Int(2))]);
        assert_eq!(n.int_or("group", 1).unwrap(), 2);
        assert_eq!(n.int_or("missing", 1).unwrap(), 1);
        assert_eq!(n.float_or("epsilon", 1e-5).unwrap(), 1e-5);
        assert!(!n.bool_or("global_pooling", false).unwrap());
    }

    #[test]
    fn wrong_payload_kind_is_reported() {
        let n = node(vec![("group", AttrValue::Str("two".into()))]);
        let err = n.int_or("group", 1).unwrap_err().to_string();
        assert!(err.contains("expected int, got string"), "got: {err}");
    }

    #[test]
    fn missing_required_list_names_node() {
        let n = node(vec![]);
        let err = n.ints("pads").unwrap_err().to_string();
        assert!(err.contains("conv1") && err.contains("pads"), "got: {err}");
    }

    #[test]
    fn absent_dtype_is_undefined() {
        assert_eq!(node(vec![]).dtype().unwrap(), DType::Undefined);
    }

    #[test]
    fn output_shape_takes_first_entry() {
        let n = node(vec![(
            OUTPUT_SHAPES_ATTR,
            AttrValue::shapes(vec![
                Shape::from_sizes(&[-1, 10]),
                Shape::from_sizes(&[7]),
            ]),
        )]);
        assert_eq!(n.output_shape().unwrap(), &Shape::from_sizes(&[-1, 10]));
    }

    #[test]
    fn secondary_outputs_get_indexed_idents() {
        let n = node(vec![]);
        assert_eq!(n.output_ident(0), "conv1");
        assert_eq!(n.output_ident(2), "conv1:2");
    }
}
