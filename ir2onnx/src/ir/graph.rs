//! Immutable IR graph: nodes, producer edges, topological order and outputs.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::ir::node::{Edge, IrNode, NodeId};
use crate::ir::op::OpKind;
use crate::ir::types::AttrValue;

/// Identifiers a node variable must not take: Python keywords and the names
/// the rendered program binds itself.
const RESERVED_IDENTS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield", "json", "np", "onnx", "helper", "TensorProto",
    "load_weights", "constant_tensor", "KitModel", "build_model", "weights", "weight_file",
    "graph",
];

/// Unresolved node declaration, as read from an IR file.
#[derive(Debug, Clone)]
pub struct NodeDecl {
    pub name: String,
    pub op: String,
    /// Producer references, `name` or `name:index`
    pub inputs: Vec<String>,
    pub attrs: Vec<(String, AttrValue)>,
}

impl NodeDecl {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            inputs: Vec::new(),
            attrs: Vec::new(),
        }
    }

    pub fn input(&mut self, producer: impl Into<String>) -> &mut Self {
        self.inputs.push(producer.into());
        self
    }

    pub fn attr(&mut self, key: impl Into<String>, value: AttrValue) -> &mut Self {
        self.attrs.push((key.into(), value));
        self
    }
}

/// Collects node declarations and resolves them into an `IrGraph`.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    decls: Vec<NodeDecl>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&mut self, name: impl Into<String>, op: impl Into<String>) -> &mut NodeDecl {
        self.decls.push(NodeDecl::new(name, op));
        let last = self.decls.len() - 1;
        &mut self.decls[last]
    }

    pub fn push(&mut self, decl: NodeDecl) {
        self.decls.push(decl);
    }

    pub fn build(self) -> Result<IrGraph> {
        IrGraph::from_decls(self.decls)
    }
}

#[derive(Debug)]
pub struct IrGraph {
    nodes: Vec<IrNode>,
    by_name: HashMap<String, NodeId>,
    order: Vec<NodeId>,
    outputs: Vec<NodeId>,
}

impl IrGraph {
    pub fn from_decls(decls: Vec<NodeDecl>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(decls.len());
        for (id, decl) in decls.iter().enumerate() {
            if by_name.insert(decl.name.clone(), id).is_some() {
                return Err(Error::DuplicateNode(decl.name.clone()));
            }
        }

        let mut taken: HashSet<String> = RESERVED_IDENTS.iter().map(|s| s.to_string()).collect();
        let mut nodes = Vec::with_capacity(decls.len());
        for (id, decl) in decls.into_iter().enumerate() {
            let inputs = decl
                .inputs
                .iter()
                .map(|input| resolve_edge(&by_name, &decl.name, input))
                .collect::<Result<Vec<_>>>()?;
            let variable = unique_variable(&decl.name, &mut taken);
            nodes.push(IrNode {
                id,
                name: decl.name,
                op: OpKind::from_tag(&decl.op),
                attrs: decl.attrs,
                inputs,
                variable,
            });
        }

        let order = topological_sort(&nodes)?;

        let mut consumed = vec![false; nodes.len()];
        for node in &nodes {
            for edge in &node.inputs {
                consumed[edge.producer] = true;
            }
        }
        let outputs = (0..nodes.len()).filter(|&id| !consumed[id]).collect();

        Ok(Self {
            nodes,
            by_name,
            order,
            outputs,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &IrNode {
        &self.nodes[id]
    }

    pub fn get(&self, name: &str) -> Option<&IrNode> {
        self.by_name.get(name).map(|&id| &self.nodes[id])
    }

    /// Nodes with every producer ahead of its consumers.
    pub fn topological_order(&self) -> impl Iterator<Item = &IrNode> {
        self.order.iter().map(|&id| &self.nodes[id])
    }

    /// Nodes no other node consumes, in declaration order.
    pub fn output_nodes(&self) -> impl Iterator<Item = &IrNode> {
        self.outputs.iter().map(|&id| &self.nodes[id])
    }

    /// Producer feeding input edge `edge` of `node`, with the producer output index.
    pub fn parent(&self, node: &IrNode, edge: usize) -> Option<(&IrNode, usize)> {
        node.inputs
            .get(edge)
            .map(|e| (&self.nodes[e.producer], e.output))
    }

    /// Emitted identifier of the tensor feeding input edge `edge` of `node`.
    pub fn parent_ident(&self, node: &IrNode, edge: usize) -> Result<String> {
        self.parent(node, edge)
            .map(|(producer, output)| producer.output_ident(output))
            .ok_or_else(|| Error::MissingProducer {
                node: node.name.clone(),
                edge,
            })
    }
}

/// Parse `name` or `name:index` and look the producer up.
fn resolve_edge(by_name: &HashMap<String, NodeId>, node: &str, input: &str) -> Result<Edge> {
    let (name, output) = match input.rsplit_once(':') {
        Some((name, idx)) => match idx.parse::<usize>() {
            Ok(output) => (name, output),
            Err(_) => (input, 0),
        },
        None => (input, 0),
    };
    by_name
        .get(name)
        .map(|&producer| Edge { producer, output })
        .ok_or_else(|| Error::UnknownProducer {
            node: node.to_string(),
            input: input.to_string(),
        })
}

/// Sanitize a node name into an identifier and make it unique.
fn unique_variable(name: &str, taken: &mut HashSet<String>) -> String {
    let mut base: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if base.is_empty() || base.starts_with(|c: char| c.is_ascii_digit()) {
        base.insert(0, '_');
    }

    let mut candidate = base.clone();
    let mut n = 1;
    while taken.contains(&candidate) {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Kahn's algorithm; ties go to the earliest declared node.
fn topological_sort(nodes: &[IrNode]) -> Result<Vec<NodeId>> {
    let mut indegree = vec![0usize; nodes.len()];
    let mut consumers: Vec<Vec<NodeId>> = vec![Vec::new(); nodes.len()];
    for node in nodes {
        for edge in &node.inputs {
            indegree[node.id] += 1;
            consumers[edge.producer].push(node.id);
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| Reverse(id))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for &consumer in &consumers[id] {
            indegree[consumer] -= 1;
            if indegree[consumer] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck = nodes
            .iter()
            .filter(|n| indegree[n.id] > 0)
            .map(|n| n.name.clone())
            .collect();
        return Err(Error::Cycle(stuck));
    }
    Ok(order)
}
