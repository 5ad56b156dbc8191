//! Renders an `OnnxProgram` as a Python script built on `onnx.helper`, or
//! as JSON.
//!
//! The script defines `KitModel(weight_file = None)`, which loads the weight
//! file into a local dictionary and passes it to `build_model`.

use crate::error::Result;

use super::plan::*;

const HEADER: &str = r#"import json

import numpy as np
import onnx
from onnx import helper, TensorProto


def load_weights(weight_file):
    if weight_file is None:
        return {}
    with open(weight_file) as f:
        raw = json.load(f)
    weights = {}
    for node, roles in raw.items():
        weights[node] = {}
        for role, value in roles.items():
            if isinstance(value, dict) and 'data' in value:
                array = np.array(value['data'], dtype=value.get('dtype', 'float32'))
                weights[node][role] = array.reshape(value['shape'])
            else:
                weights[node][role] = np.array(value, dtype='float32')
    return weights


def constant_tensor(name, array):
    return helper.make_tensor(
        name=name,
        data_type=helper.np_dtype_to_tensor_dtype(array.dtype),
        dims=array.shape,
        vals=array.flatten().tolist())


def KitModel(weight_file = None):
    weights = load_weights(weight_file)
    return build_model(weights)
"#;

pub fn render_python(program: &OnnxProgram) -> String {
    let mut out = String::from(HEADER);
    out.push_str("\n\ndef build_model(weights):\n");

    for stmt in &program.statements {
        let rhs = match stmt {
            Statement::Input(info) | Statement::Output(info) => render_value_info(info),
            Statement::Constant(decl) => render_constant_node(decl),
            Statement::Initializer(decl) => render_constant_tensor(decl),
            Statement::Node(node) => render_node(node),
        };
        out.push_str(&format!("    {:<15}= {rhs}\n", stmt.ident()));
    }

    out.push_str(&format!(
        "    graph = helper.make_graph([{}], {}, [{}], [{}], [{}])\n",
        program.nodes.join(", "),
        py_str(&program.graph_name),
        program.inputs.join(", "),
        program.outputs.join(", "),
        program.initializers.join(", "),
    ));
    out.push_str("    return helper.make_model(graph)\n");
    out
}

/// Pretty-printed JSON dump of the program, constant values included.
pub fn render_json(program: &OnnxProgram) -> Result<String> {
    Ok(serde_json::to_string_pretty(program)?)
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

fn render_value_info(info: &ValueInfo) -> String {
    format!(
        "helper.make_tensor_value_info({}, {}, {})",
        py_str(&info.tensor),
        info.elem_type.literal(),
        py_tuple(&info.dims)
    )
}

/// `weights['node']['role']`, transposed when the constant carries a permutation.
fn weight_expr(decl: &ConstantDecl) -> String {
    let lookup = format!(
        "weights[{}][{}]",
        py_str(&decl.source.node),
        py_str(&decl.source.role)
    );
    match &decl.permutation {
        Some(axes) => {
            let axes: Vec<String> = axes.iter().map(|a| a.to_string()).collect();
            format!("{lookup}.transpose([{}])", axes.join(", "))
        }
        None => lookup,
    }
}

fn render_constant_tensor(decl: &ConstantDecl) -> String {
    format!("constant_tensor({}, {})", py_str(&decl.ident), weight_expr(decl))
}

fn render_constant_node(decl: &ConstantDecl) -> String {
    format!(
        "helper.make_node('Constant', inputs=[], outputs=[{}], value={})",
        py_str(&decl.ident),
        render_constant_tensor(decl)
    )
}

fn render_node(node: &OpNode) -> String {
    let inputs: Vec<String> = node.inputs.iter().map(|i| py_str(i)).collect();
    let mut call = format!(
        "helper.make_node({}, inputs=[{}], outputs=[{}]",
        py_str(node.op_type),
        inputs.join(", "),
        py_str(&node.output)
    );
    for (name, value) in &node.attrs {
        call.push_str(&format!(", {name}={}", py_literal(value)));
    }
    call.push(')');
    call
}

// ---------------------------------------------------------------------------
// Python literals
// ---------------------------------------------------------------------------

fn py_literal(value: &AttrLiteral) -> String {
    match value {
        AttrLiteral::Int(v) => v.to_string(),
        AttrLiteral::Float(v) => py_float(*v),
        AttrLiteral::Ints(vs) => {
            let items: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
            format!("[{}]", items.join(", "))
        }
        AttrLiteral::Str(s) => py_str(s),
    }
}

/// Float literal that Python reads back as a float, never an int.
fn py_float(v: f64) -> String {
    if v.is_nan() {
        "float('nan')".to_string()
    } else if v == f64::INFINITY {
        "float('inf')".to_string()
    } else if v == f64::NEG_INFINITY {
        "float('-inf')".to_string()
    } else {
        // Debug keeps a fractional part or exponent: 1.0, 1e-5
        format!("{v:?}")
    }
}

fn py_tuple(dims: &[i64]) -> String {
    match dims {
        [] => "()".to_string(),
        [single] => format!("({single},)"),
        _ => {
            let items: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", items.join(", "))
        }
    }
}

fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::WeightArray;

    fn conv_program() -> OnnxProgram {
        let weight = WeightArray::new(vec![1, 1, 1, 1], vec![0.5]).unwrap();
        OnnxProgram {
            graph_name: "net".into(),
            statements: vec![
                Statement::Input(ValueInfo {
                    ident: "data".into(),
                    tensor: "data".into(),
                    elem_type: TensorType::Float,
                    dims: vec![1, 4, 4, 1],
                }),
                Statement::Constant(ConstantDecl {
                    ident: "conv_weight".into(),
                    source: WeightSource {
                        node: "conv".into(),
                        role: "weights".into(),
                    },
                    permutation: Some(vec![3, 2, 0, 1]),
                    value: weight,
                }),
                Statement::Node(
                    OpNode::new("conv", "Conv", vec!["data".into(), "conv_weight".into()])
                        .with("group", AttrLiteral::Int(1))
                        .with("pads", AttrLiteral::Ints(vec![0, 0, 0, 0])),
                ),
                Statement::Output(ValueInfo {
                    ident: "conv_out".into(),
                    tensor: "conv".into(),
                    elem_type: TensorType::Float,
                    dims: vec![1, 4, 4, 1],
                }),
            ],
            inputs: vec!["data".into()],
            outputs: vec!["conv_out".into()],
            nodes: vec!["conv_weight".into(), "conv".into()],
            initializers: vec![],
        }
    }

    #[test]
    fn python_body() {
        let text = render_python(&conv_program());
        let body = text
            .split("def build_model(weights):\n")
            .nth(1)
            .unwrap();
        let expected = "    \
data           = helper.make_tensor_value_info('data', TensorProto.FLOAT, (1, 4, 4, 1))
    conv_weight    = helper.make_node('Constant', inputs=[], outputs=['conv_weight'], value=constant_tensor('conv_weight', weights['conv']['weights'].transpose([3, 2, 0, 1])))
    conv           = helper.make_node('Conv', inputs=['data', 'conv_weight'], outputs=['conv'], group=1, pads=[0, 0, 0, 0])
    conv_out       = helper.make_tensor_value_info('conv', TensorProto.FLOAT, (1, 4, 4, 1))
    graph = helper.make_graph([conv_weight, conv], 'net', [data], [conv_out], [])
    return helper.make_model(graph)
";
        assert_eq!(body, expected);
    }

    #[test]
    fn weights_are_local_to_kit_model() {
        let text = render_python(&conv_program());
        assert!(text.contains("def KitModel(weight_file = None):"));
        assert!(text.contains("    weights = load_weights(weight_file)\n    return build_model(weights)"));
        assert!(!text.contains("global"));
    }

    #[test]
    fn initializers_render_as_tensors() {
        let mut program = conv_program();
        if let Statement::Constant(decl) = program.statements[1].clone() {
            program.statements[1] = Statement::Initializer(decl);
        }
        program.nodes = vec!["conv".into()];
        program.initializers = vec!["conv_weight".into()];

        let text = render_python(&program);
        assert!(text.contains(
            "    conv_weight    = constant_tensor('conv_weight', weights['conv']['weights'].transpose([3, 2, 0, 1]))\n"
        ));
        assert!(text.contains("helper.make_graph([conv], 'net', [data], [conv_out], [conv_weight])"));
    }

    #[test]
    fn float_literals_stay_floats() {
        assert_eq!(py_float(1.0), "1.0");
        assert_eq!(py_float(0.001), "0.001");
        let small = py_float(1e-5);
        assert!(small.contains('e') || small.contains('.'), "got: {small}");
        assert_eq!(small.parse::<f64>().unwrap(), 1e-5);
        assert_eq!(py_float(f64::NAN), "float('nan')");
        assert_eq!(py_float(f64::NEG_INFINITY), "float('-inf')");
    }

    #[test]
    fn tuples_handle_low_rank() {
        assert_eq!(py_tuple(&[]), "()");
        assert_eq!(py_tuple(&[10]), "(10,)");
        assert_eq!(py_tuple(&[1, 10]), "(1, 10)");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(py_str("it's"), r"'it\'s'");
        assert_eq!(py_str(r"a\b"), r"'a\\b'");
        assert_eq!(py_str("split:1"), "'split:1'");
    }

    #[test]
    fn json_tags_statements() {
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&conv_program()).unwrap()).unwrap();
        let statements = json["statements"].as_array().unwrap();
        assert_eq!(statements[0]["kind"], "input");
        assert_eq!(statements[0]["elem_type"], "FLOAT");
        assert_eq!(statements[1]["kind"], "constant");
        assert_eq!(statements[1]["value"]["shape"], serde_json::json!([1, 1, 1, 1]));
        assert_eq!(statements[2]["op_type"], "Conv");
        assert_eq!(json["graph_name"], "net");
    }
}
