//! IR graph loader for the protobuf-JSON rendering of a `GraphDef`.
//!
//! Follows the proto3 JSON mapping: int64 values may arrive as strings,
//! enums as names or numbers, bytes as base64, and default-valued fields
//! may be omitted.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ir::{AttrList, AttrValue, DType, Dim, GraphBuilder, IrGraph, NodeDecl, Shape};

#[derive(Debug, Deserialize)]
struct GraphDefJson {
    #[serde(default)]
    node: Vec<NodeDefJson>,
}

#[derive(Debug, Deserialize)]
struct NodeDefJson {
    name: String,
    op: String,
    #[serde(default)]
    input: Vec<String>,
    #[serde(default)]
    attr: BTreeMap<String, AttrValueJson>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Int64Json {
    Num(i64),
    Str(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FloatJson {
    Num(f64),
    /// `"NaN"`, `"Infinity"`, `"-Infinity"` or a quoted number
    Str(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DTypeJson {
    Code(i64),
    Name(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DimJson {
    size: Option<Int64Json>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShapeJson {
    dim: Vec<DimJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListJson {
    s: Vec<String>,
    i: Vec<Int64Json>,
    f: Vec<FloatJson>,
    b: Vec<bool>,
    #[serde(rename = "type")]
    type_: Vec<DTypeJson>,
    shape: Vec<ShapeJson>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AttrValueJson {
    list: Option<ListJson>,
    s: Option<String>,
    i: Option<Int64Json>,
    f: Option<FloatJson>,
    b: Option<bool>,
    #[serde(rename = "type")]
    type_: Option<DTypeJson>,
    shape: Option<ShapeJson>,
}

/// Load and build an IR graph from a file.
pub fn load_graph(path: &Path) -> Result<IrGraph> {
    if !path.exists() {
        return Err(Error::NotFound {
            what: "IR architecture",
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let def: GraphDefJson = serde_json::from_str(&text).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let graph = build(def)?;
    log::info!("loaded IR graph with {} nodes from {}", graph.len(), path.display());
    Ok(graph)
}

/// Build an IR graph from JSON text.
pub fn graph_from_str(text: &str) -> Result<IrGraph> {
    let def: GraphDefJson = serde_json::from_str(text).map_err(|e| Error::Malformed {
        what: "IR graph",
        reason: e.to_string(),
    })?;
    build(def)
}

fn build(def: GraphDefJson) -> Result<IrGraph> {
    let mut builder = GraphBuilder::new();
    for node in def.node {
        let mut decl = NodeDecl::new(node.name, node.op);
        decl.inputs = node.input;
        for (key, value) in node.attr {
            let value = convert_attr(value).map_err(|reason| Error::InvalidAttribute {
                node: decl.name.clone(),
                attr: key.clone(),
                reason,
            })?;
            decl.attrs.push((key, value));
        }
        builder.push(decl);
    }
    builder.build()
}

type Conv<T> = std::result::Result<T, String>;

fn convert_attr(value: AttrValueJson) -> Conv<AttrValue> {
    if let Some(list) = value.list {
        return convert_list(list).map(AttrValue::List);
    }
    if let Some(i) = value.i {
        return convert_int(i).map(AttrValue::Int);
    }
    if let Some(f) = value.f {
        return convert_float(f).map(AttrValue::Float);
    }
    if let Some(b) = value.b {
        return Ok(AttrValue::Bool(b));
    }
    if let Some(s) = value.s {
        return Ok(AttrValue::Str(decode_bytes(&s)));
    }
    if let Some(t) = value.type_ {
        return convert_dtype(t).map(AttrValue::Type);
    }
    if let Some(shape) = value.shape {
        return convert_shape(shape).map(AttrValue::Shape);
    }
    Err("attribute value has no payload".to_string())
}

fn convert_list(list: ListJson) -> Conv<AttrList> {
    Ok(AttrList {
        ints: list.i.into_iter().map(convert_int).collect::<Conv<_>>()?,
        floats: list.f.into_iter().map(convert_float).collect::<Conv<_>>()?,
        bools: list.b,
        strs: list.s.iter().map(|s| decode_bytes(s)).collect(),
        types: list.type_.into_iter().map(convert_dtype).collect::<Conv<_>>()?,
        shapes: list
            .shape
            .into_iter()
            .map(convert_shape)
            .collect::<Conv<_>>()?,
    })
}

fn convert_int(value: Int64Json) -> Conv<i64> {
    match value {
        Int64Json::Num(n) => Ok(n),
        Int64Json::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("'{s}' is not an integer")),
    }
}

fn convert_float(value: FloatJson) -> Conv<f64> {
    match value {
        FloatJson::Num(n) => Ok(n),
        FloatJson::Str(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => other
                .trim()
                .parse()
                .map_err(|_| format!("'{other}' is not a float")),
        },
    }
}

fn convert_dtype(value: DTypeJson) -> Conv<DType> {
    match value {
        DTypeJson::Code(code) => {
            DType::from_code(code).ok_or_else(|| format!("unknown dtype code {code}"))
        }
        DTypeJson::Name(name) => {
            DType::from_name(&name).ok_or_else(|| format!("unknown dtype '{name}'"))
        }
    }
}

fn convert_shape(shape: ShapeJson) -> Conv<Shape> {
    let dims = shape
        .dim
        .into_iter()
        .map(|d| -> Conv<Dim> {
            // proto3 omits zero sizes
            let size = d.size.map(convert_int).transpose()?.unwrap_or(0);
            Ok(if size < 0 { Dim::Unknown } else { Dim::Known(size) })
        })
        .collect::<Conv<_>>()?;
    Ok(Shape { dims })
}

/// Bytes fields are base64 in proto3 JSON. Text that does not decode to
/// UTF-8 is taken verbatim, so hand-written files may use plain strings.
fn decode_bytes(s: &str) -> String {
    STANDARD
        .decode(s)
        .or_else(|_| URL_SAFE.decode(s))
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::OpKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const LENET_HEAD: &str = r#"{
      "node": [
        {
          "name": "input",
          "op": "DataInput",
          "attr": {
            "dtype": {"type": "DT_FLOAT32"},
            "shape": {"shape": {"dim": [{"size": "-1"}, {"size": "28"}, {"size": "28"}, {"size": "1"}]}}
          }
        },
        {
          "name": "conv1",
          "op": "Conv",
          "input": ["input"],
          "attr": {
            "group": {"i": "1"},
            "pads": {"list": {"i": ["0", "2", "2", "0", "0", "2", "2", "0"]}},
            "epsilon": {"f": 0.001},
            "use_bias": {"b": true},
            "dtype": {"type": 10},
            "_output_shapes": {"list": {"shape": [{"dim": [{"size": -1}, {}, {"size": 28}]}]}}
          }
        },
        {
          "name": "pad",
          "op": "Pad",
          "input": ["conv1:0"],
          "attr": {"mode": {"s": "Y29uc3RhbnQ="}, "kind": {"s": "MAX"}}
        }
      ]
    }"#;

    #[test]
    fn parses_protobuf_json() {
        let g = graph_from_str(LENET_HEAD).unwrap();
        assert_eq!(g.len(), 3);

        let input = g.get("input").unwrap();
        assert_eq!(input.op, OpKind::DataInput);
        assert_eq!(input.dtype().unwrap(), DType::Float32);
        assert_eq!(
            input.shape("shape").unwrap(),
            &Shape::from_sizes(&[-1, 28, 28, 1])
        );

        let conv = g.get("conv1").unwrap();
        assert_eq!(conv.int("group").unwrap(), 1);
        assert_eq!(conv.ints("pads").unwrap(), vec![0, 2, 2, 0, 0, 2, 2, 0]);
        assert_eq!(conv.float_or("epsilon", 0.0).unwrap(), 0.001);
        assert!(conv.bool_or("use_bias", false).unwrap());
        assert_eq!(conv.dtype().unwrap(), DType::Float32);
        // omitted size means 0
        assert_eq!(
            conv.output_shape().unwrap().dims,
            vec![Dim::Unknown, Dim::Known(0), Dim::Known(28)]
        );
    }

    #[test]
    fn strings_decode_base64_or_pass_through() {
        let g = graph_from_str(LENET_HEAD).unwrap();
        let pad = g.get("pad").unwrap();
        assert_eq!(pad.string("mode").unwrap(), "constant");
        assert_eq!(pad.string("kind").unwrap(), "MAX");
        assert_eq!(g.parent_ident(pad, 0).unwrap(), "conv1");
    }

    #[test]
    fn bad_integer_names_node_and_attr() {
        let text = r#"{"node": [{"name": "c", "op": "Conv", "attr": {"group": {"i": "one"}}}]}"#;
        let err = graph_from_str(text).unwrap_err().to_string();
        assert!(err.contains("'c'") && err.contains("'group'"), "got: {err}");
    }

    #[test]
    fn unknown_dtype_rejected() {
        let text = r#"{"node": [{"name": "c", "op": "Relu", "attr": {"dtype": {"type": "DT_QINT8"}}}]}"#;
        assert!(graph_from_str(text).is_err());
    }

    #[test]
    fn empty_attr_rejected() {
        let text = r#"{"node": [{"name": "c", "op": "Relu", "attr": {"x": {}}}]}"#;
        let err = graph_from_str(text).unwrap_err().to_string();
        assert!(err.contains("no payload"), "got: {err}");
    }

    #[test]
    fn load_missing_file() {
        let err = load_graph(Path::new("/nonexistent/model.json")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "IR architecture file [/nonexistent/model.json] is not found"
        );
    }

    #[test]
    fn load_from_disk() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "{LENET_HEAD}").unwrap();
        let g = load_graph(tmp.path()).unwrap();
        let outputs: Vec<&str> = g.output_nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(outputs, ["pad"]);
    }
}
