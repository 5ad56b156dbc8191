use crate::error::{Error, Result};
use crate::ir::{IrGraph, IrNode, OpKind};
use crate::weights::WeightStore;

use super::plan::*;
use super::shapes;
use super::state::EmissionState;
use super::{ConstantMode, EmitOptions};

/// IR convolution kernels are (kH, kW, Cin, Cout); ONNX wants (Cout, Cin, kH, kW).
pub const CONV_WEIGHT_PERM: [usize; 4] = [3, 2, 0, 1];

const DEFAULT_BN_EPSILON: f64 = 1e-5;

/// Lowers IR nodes one at a time into the shared emission state.
pub struct Lowerer<'a> {
    graph: &'a IrGraph,
    weights: &'a WeightStore,
    options: &'a EmitOptions,
    pub state: EmissionState,
}

impl<'a> Lowerer<'a> {
    pub fn new(graph: &'a IrGraph, weights: &'a WeightStore, options: &'a EmitOptions) -> Self {
        let reserved = graph.topological_order().map(|n| n.variable.clone());
        Self {
            graph,
            weights,
            options,
            state: EmissionState::new(reserved),
        }
    }

    /// Dispatch on operator kind. Unsupported operators are recorded and
    /// skipped; malformed supported ones are errors.
    pub fn lower_node(&mut self, node: &IrNode) -> Result<()> {
        log::debug!("lowering {} [{}]", node.name, node.op);
        match &node.op {
            OpKind::DataInput => self.lower_data_input(node),
            OpKind::Conv => self.lower_conv(node),
            OpKind::BatchNorm => self.lower_batch_norm(node),
            OpKind::Relu => self.lower_unary(node, "Relu"),
            OpKind::Add => self.lower_add(node),
            OpKind::Pool => self.lower_pool(node),
            OpKind::FullyConnected => self.lower_fully_connected(node),
            OpKind::Pad => self.lower_pad(node),
            OpKind::Concat => self.lower_concat(node),
            OpKind::Flatten => self.lower_unary(node, "Flatten"),
            OpKind::Softmax => self.lower_unary(node, "Softmax"),
            OpKind::Unsupported(tag) => {
                self.unsupported(node, format!("operator [{tag}] is not supported"));
                Ok(())
            }
        }
    }

    fn unsupported(&mut self, node: &IrNode, reason: String) {
        log::warn!("skipping node {}: {reason}", node.name);
        self.state.skip(node, reason);
    }

    fn lower_data_input(&mut self, node: &IrNode) -> Result<()> {
        let shape = node.shape("shape")?;
        let elem_type = map_dtype(node)?;
        self.state.declare_input(ValueInfo {
            ident: node.variable.clone(),
            tensor: node.variable.clone(),
            elem_type,
            dims: shapes::concrete_dims(shape),
        });
        Ok(())
    }

    fn lower_conv(&mut self, node: &IrNode) -> Result<()> {
        let kernel_shape = node.ints("kernel_shape")?;
        if kernel_shape.len() < 3 {
            return Err(node.invalid(
                "kernel_shape",
                format!("expected spatial dims plus Cin, Cout; got {kernel_shape:?}"),
            ));
        }
        let kernel_shape = kernel_shape[..kernel_shape.len() - 2].to_vec();
        let strides = inner(node, "strides")?;
        let dilations = match node.attr("dilations") {
            Some(_) => inner(node, "dilations")?,
            None => vec![1; kernel_shape.len()],
        };
        let pads = spatial_pads(node)?;
        let group = node.int_or("group", 1)?;
        let input = self.graph.parent_ident(node, 0)?;

        let weight = self.constant(node, "weights", "weight", Some(&CONV_WEIGHT_PERM[..]))?;
        let mut inputs = vec![input, weight];
        if node.bool_or("use_bias", false)? {
            inputs.push(self.constant(node, "bias", "bias", None)?);
        }

        self.state.declare_node(
            OpNode::new(&node.variable, "Conv", inputs)
                .with("dilations", AttrLiteral::Ints(dilations))
                .with("group", AttrLiteral::Int(group))
                .with("kernel_shape", AttrLiteral::Ints(kernel_shape))
                .with("pads", AttrLiteral::Ints(pads))
                .with("strides", AttrLiteral::Ints(strides)),
        );
        Ok(())
    }

    fn lower_batch_norm(&mut self, node: &IrNode) -> Result<()> {
        let epsilon = node.float_or("epsilon", DEFAULT_BN_EPSILON)?;
        let mut inputs = vec![self.graph.parent_ident(node, 0)?];
        for role in ["scale", "bias", "mean", "var"] {
            inputs.push(self.constant(node, role, role, None)?);
        }
        self.state.declare_node(
            OpNode::new(&node.variable, "BatchNormalization", inputs)
                .with("epsilon", AttrLiteral::Float(epsilon)),
        );
        Ok(())
    }

    fn lower_unary(&mut self, node: &IrNode, op_type: &'static str) -> Result<()> {
        let input = self.graph.parent_ident(node, 0)?;
        self.state
            .declare_node(OpNode::new(&node.variable, op_type, vec![input]));
        Ok(())
    }

    fn lower_add(&mut self, node: &IrNode) -> Result<()> {
        let inputs = self.all_parents(node)?;
        self.state
            .declare_node(OpNode::new(&node.variable, "Add", inputs));
        Ok(())
    }

    fn lower_concat(&mut self, node: &IrNode) -> Result<()> {
        let axis = node.int("axis")?;
        let inputs = self.all_parents(node)?;
        self.state.declare_node(
            OpNode::new(&node.variable, "Concat", inputs).with("axis", AttrLiteral::Int(axis)),
        );
        Ok(())
    }

    fn lower_pool(&mut self, node: &IrNode) -> Result<()> {
        let kind = node.string_or("pooling_type", "")?;
        let global = node.bool_or("global_pooling", false)?;

        if global {
            if kind != "AVG" {
                self.unsupported(node, format!("global pooling type [{kind}] is not supported"));
                return Ok(());
            }
            return self.lower_unary(node, "GlobalAveragePool");
        }

        let op_type = match kind {
            "AVG" => "AveragePool",
            "MAX" => "MaxPool",
            other => {
                self.unsupported(node, format!("pooling type [{other}] is not supported"));
                return Ok(());
            }
        };
        let kernel_shape = inner(node, "kernel_shape")?;
        let pads = spatial_pads(node)?;
        let strides = inner(node, "strides")?;
        let input = self.graph.parent_ident(node, 0)?;

        self.state.declare_node(
            OpNode::new(&node.variable, op_type, vec![input])
                .with("kernel_shape", AttrLiteral::Ints(kernel_shape))
                .with("pads", AttrLiteral::Ints(pads))
                .with("strides", AttrLiteral::Ints(strides)),
        );
        Ok(())
    }

    fn lower_fully_connected(&mut self, node: &IrNode) -> Result<()> {
        let input = self.graph.parent_ident(node, 0)?;
        let weight = self.constant(node, "weights", "weight", None)?;
        let bias = self.constant(node, "bias", "bias", None)?;
        self.state
            .declare_node(OpNode::new(&node.variable, "Gemm", vec![input, weight, bias]));
        Ok(())
    }

    fn lower_pad(&mut self, node: &IrNode) -> Result<()> {
        let mode = node.string_or("mode", "constant")?.to_string();
        let raw = node.ints("pads")?;
        let pads = shapes::full_pads(&raw).ok_or_else(|| bad_pads(node, &raw))?;
        let input = self.graph.parent_ident(node, 0)?;
        self.state.declare_node(
            OpNode::new(&node.variable, "Pad", vec![input])
                .with("mode", AttrLiteral::Str(mode))
                .with("pads", AttrLiteral::Ints(pads)),
        );
        Ok(())
    }

    /// One identifier per incoming edge, in edge order.
    fn all_parents(&self, node: &IrNode) -> Result<Vec<String>> {
        if node.inputs.is_empty() {
            return Err(Error::MissingProducer {
                node: node.name.clone(),
                edge: 0,
            });
        }
        (0..node.inputs.len())
            .map(|edge| self.graph.parent_ident(node, edge))
            .collect()
    }

    /// Declare the weight array stored under (node, role) and return its
    /// identifier, `<variable>_<suffix>`.
    fn constant(
        &mut self,
        node: &IrNode,
        role: &str,
        suffix: &str,
        permutation: Option<&[usize]>,
    ) -> Result<String> {
        let array = self.weights.require(&node.name, role)?;
        let value = match permutation {
            Some(axes) => array.permute(axes).map_err(|reason| Error::WeightLayout {
                node: node.name.clone(),
                role: role.to_string(),
                reason,
            })?,
            None => array.clone(),
        };

        let ident = self.state.fresh(&format!("{}_{suffix}", node.variable));
        let decl = ConstantDecl {
            ident: ident.clone(),
            source: WeightSource {
                node: node.name.clone(),
                role: role.to_string(),
            },
            permutation: permutation.map(<[usize]>::to_vec),
            value,
        };
        match self.options.constants {
            ConstantMode::Node => self.state.declare_constant(decl),
            ConstantMode::Initializer => self.state.declare_initializer(decl),
        }
        Ok(ident)
    }
}

/// Element type of a node's `dtype` attribute.
pub fn map_dtype(node: &IrNode) -> Result<TensorType> {
    let dtype = node.dtype()?;
    shapes::tensor_type(dtype).ok_or_else(|| Error::UnmappedDType {
        node: node.name.clone(),
        dtype,
    })
}

fn inner(node: &IrNode, key: &str) -> Result<Vec<i64>> {
    let values = node.ints(key)?;
    shapes::inner_axes(&values)
        .map(<[i64]>::to_vec)
        .ok_or_else(|| node.invalid(key, format!("need at least 2 entries, got {values:?}")))
}

fn spatial_pads(node: &IrNode) -> Result<Vec<i64>> {
    let raw = node.ints("pads")?;
    shapes::spatial_pads(&raw).ok_or_else(|| bad_pads(node, &raw))
}

fn bad_pads(node: &IrNode, raw: &[i64]) -> Error {
    node.invalid(
        "pads",
        format!("expected an even list of at least 4 entries, got {raw:?}"),
    )
}
