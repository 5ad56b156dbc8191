use std::collections::HashSet;

use crate::ir::IrNode;

use super::plan::{ConstantDecl, OnnxProgram, OpNode, Statement, ValueInfo};

/// A node the emitter could not lower; the emitted graph lacks its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedNode {
    pub name: String,
    pub op: String,
    pub reason: String,
}

/// Statements and identifier lists accumulated during one emission run.
#[derive(Debug, Default)]
pub struct EmissionState {
    statements: Vec<Statement>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    nodes: Vec<String>,
    initializers: Vec<String>,
    skipped: Vec<SkippedNode>,
    /// Node variables plus every identifier handed out so far
    taken: HashSet<String>,
}

impl EmissionState {
    /// `reserved` holds identifiers owned by IR nodes; derived identifiers
    /// never reuse them.
    pub fn new(reserved: impl IntoIterator<Item = String>) -> Self {
        Self {
            taken: reserved.into_iter().collect(),
            ..Self::default()
        }
    }

    /// `base`, or `base_<n>` if `base` is already in use.
    pub fn fresh(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    pub fn declare_input(&mut self, info: ValueInfo) {
        self.inputs.push(info.ident.clone());
        self.statements.push(Statement::Input(info));
    }

    pub fn declare_output(&mut self, info: ValueInfo) {
        self.outputs.push(info.ident.clone());
        self.statements.push(Statement::Output(info));
    }

    /// Weight tensor as a `Constant` node.
    pub fn declare_constant(&mut self, decl: ConstantDecl) {
        self.nodes.push(decl.ident.clone());
        self.statements.push(Statement::Constant(decl));
    }

    /// Weight tensor as a graph initializer.
    pub fn declare_initializer(&mut self, decl: ConstantDecl) {
        self.initializers.push(decl.ident.clone());
        self.statements.push(Statement::Initializer(decl));
    }

    pub fn declare_node(&mut self, node: OpNode) {
        self.nodes.push(node.ident.clone());
        self.statements.push(Statement::Node(node));
    }

    pub fn skip(&mut self, node: &IrNode, reason: impl Into<String>) {
        self.skipped.push(SkippedNode {
            name: node.name.clone(),
            op: node.op.tag().to_string(),
            reason: reason.into(),
        });
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn initializers(&self) -> &[String] {
        &self.initializers
    }

    pub fn skipped(&self) -> &[SkippedNode] {
        &self.skipped
    }

    pub fn finish(self, graph_name: &str) -> (OnnxProgram, Vec<SkippedNode>) {
        let program = OnnxProgram {
            graph_name: graph_name.to_string(),
            statements: self.statements,
            inputs: self.inputs,
            outputs: self.outputs,
            nodes: self.nodes,
            initializers: self.initializers,
        };
        (program, self.skipped)
    }
}
