//! Weight store: node name -> parameter role -> dense array.
//!
//! Weight files are JSON and come in two encodings:
//!
//! - record: `{"conv1": {"weights": {"shape": [3,3,1,8], "dtype": "float32", "data": [...]}}}`
//! - nested: `{"conv1": {"weights": [[[[...]]]]}}`, shape taken from the nesting
//!
//! The record encoding is tried first; the whole file is re-read as nested
//! lists if that fails.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

fn default_dtype() -> String {
    "float32".to_string()
}

/// Dense row-major array. Elements are widened to `f64`; `dtype` keeps the
/// declared element type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightArray {
    pub shape: Vec<usize>,
    #[serde(default = "default_dtype")]
    pub dtype: String,
    pub data: Vec<f64>,
}

impl WeightArray {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> std::result::Result<Self, String> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(format!(
                "shape {shape:?} needs {expected} elements, got {}",
                data.len()
            ));
        }
        Ok(Self {
            shape,
            dtype: default_dtype(),
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reorder axes: output axis `i` is input axis `axes[i]`.
    pub fn permute(&self, axes: &[usize]) -> std::result::Result<Self, String> {
        let rank = self.shape.len();
        if axes.len() != rank {
            return Err(format!(
                "permutation {axes:?} does not match rank {rank} (shape {:?})",
                self.shape
            ));
        }
        let mut seen = vec![false; rank];
        for &a in axes {
            if a >= rank || seen[a] {
                return Err(format!("{axes:?} is not a permutation of 0..{rank}"));
            }
            seen[a] = true;
        }

        let in_strides = strides(&self.shape);
        let out_shape: Vec<usize> = axes.iter().map(|&a| self.shape[a]).collect();
        // Input stride for each output axis.
        let step: Vec<usize> = axes.iter().map(|&a| in_strides[a]).collect();

        let mut data = Vec::with_capacity(self.data.len());
        let mut index = vec![0usize; rank];
        for _ in 0..self.data.len() {
            let src: usize = index.iter().zip(&step).map(|(i, s)| i * s).sum();
            data.push(self.data[src]);
            // Odometer increment over the output shape.
            for axis in (0..rank).rev() {
                index[axis] += 1;
                if index[axis] < out_shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }

        Ok(Self {
            shape: out_shape,
            dtype: self.dtype.clone(),
            data,
        })
    }
}

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

#[derive(Debug, Clone, Default)]
pub struct WeightStore {
    layers: HashMap<String, HashMap<String, WeightArray>>,
}

impl WeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a weight file in either encoding.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound {
                what: "IR weight",
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_value(value)?;
        log::info!(
            "loaded {} weight arrays for {} nodes from {}",
            store.array_count(),
            store.layers.len(),
            path.display()
        );
        Ok(store)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let primary = match serde_json::from_value::<HashMap<String, HashMap<String, WeightArray>>>(
            value.clone(),
        ) {
            Ok(layers) => Self::checked(layers),
            Err(e) => Err(e.to_string()),
        };
        let primary_err = match primary {
            Ok(store) => return Ok(store),
            Err(e) => e,
        };

        log::debug!("record encoding rejected ({primary_err}), re-reading as nested lists");
        match from_nested(&value) {
            Ok(layers) => Ok(Self { layers }),
            Err(nested_err) => Err(Error::Malformed {
                what: "weight file",
                reason: format!("record encoding: {primary_err}; nested encoding: {nested_err}"),
            }),
        }
    }

    fn checked(
        layers: HashMap<String, HashMap<String, WeightArray>>,
    ) -> std::result::Result<Self, String> {
        for (node, roles) in &layers {
            for (role, array) in roles {
                let expected: usize = array.shape.iter().product();
                if expected != array.data.len() {
                    return Err(format!(
                        "{node}/{role}: shape {:?} needs {expected} elements, got {}",
                        array.shape,
                        array.data.len()
                    ));
                }
            }
        }
        Ok(Self { layers })
    }

    pub fn insert(&mut self, node: impl Into<String>, role: impl Into<String>, array: WeightArray) {
        self.layers
            .entry(node.into())
            .or_default()
            .insert(role.into(), array);
    }

    pub fn get(&self, node: &str, role: &str) -> Option<&WeightArray> {
        self.layers.get(node).and_then(|roles| roles.get(role))
    }

    /// Like `get`, but a missing entry is an error naming node and role.
    pub fn require(&self, node: &str, role: &str) -> Result<&WeightArray> {
        self.get(node, role).ok_or_else(|| Error::MissingWeight {
            node: node.to_string(),
            role: role.to_string(),
        })
    }

    pub fn array_count(&self) -> usize {
        self.layers.values().map(|roles| roles.len()).sum()
    }
}

fn from_nested(
    value: &Value,
) -> std::result::Result<HashMap<String, HashMap<String, WeightArray>>, String> {
    let nodes = value.as_object().ok_or("top level is not an object")?;
    let mut layers = HashMap::with_capacity(nodes.len());
    for (node, roles) in nodes {
        let roles = roles
            .as_object()
            .ok_or_else(|| format!("{node}: expected an object of roles"))?;
        let mut arrays = HashMap::with_capacity(roles.len());
        for (role, nested) in roles {
            let mut shape = Vec::new();
            let mut data = Vec::new();
            flatten_nested(nested, 0, &mut shape, &mut data)
                .map_err(|e| format!("{node}/{role}: {e}"))?;
            arrays.insert(
                role.clone(),
                WeightArray {
                    shape,
                    dtype: default_dtype(),
                    data,
                },
            );
        }
        layers.insert(node.clone(), arrays);
    }
    Ok(layers)
}

/// Walk nested lists depth-first, fixing each axis length on first visit.
fn flatten_nested(
    value: &Value,
    depth: usize,
    shape: &mut Vec<usize>,
    data: &mut Vec<f64>,
) -> std::result::Result<(), String> {
    match value {
        Value::Number(n) => {
            if depth != shape.len() {
                return Err(format!("ragged nesting: scalar at depth {depth}"));
            }
            let v = n.as_f64().ok_or("number out of range")?;
            data.push(v);
            Ok(())
        }
        Value::Array(items) => {
            if depth == shape.len() {
                if !data.is_empty() {
                    return Err(format!("ragged nesting: list at depth {depth}"));
                }
                shape.push(items.len());
            } else if depth > shape.len() || shape[depth] != items.len() {
                return Err(format!(
                    "ragged nesting: expected {} items at depth {depth}, got {}",
                    shape.get(depth).copied().unwrap_or(0),
                    items.len()
                ));
            }
            for item in items {
                flatten_nested(item, depth + 1, shape, data)?;
            }
            Ok(())
        }
        other => Err(format!("unexpected {} in array", json_kind(other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Element value encodes its own index: 1000*a + 100*b + 10*c + d.
    fn marked(shape: [usize; 4]) -> WeightArray {
        let mut data = Vec::new();
        for a in 0..shape[0] {
            for b in 0..shape[1] {
                for c in 0..shape[2] {
                    for d in 0..shape[3] {
                        data.push((1000 * a + 100 * b + 10 * c + d) as f64);
                    }
                }
            }
        }
        WeightArray::new(shape.to_vec(), data).unwrap()
    }

    #[test]
    fn conv_permutation_moves_axes() {
        // (kH, kW, Cin, Cout) = (2, 3, 4, 5)
        let w = marked([2, 3, 4, 5]);
        let p = w.permute(&[3, 2, 0, 1]).unwrap();
        assert_eq!(p.shape, vec![5, 4, 2, 3]);

        // p[co][ci][h][w] == w[h][w][ci][co]
        let ps = strides(&p.shape);
        for co in 0..5 {
            for ci in 0..4 {
                for h in 0..2 {
                    for x in 0..3 {
                        let v = p.data[co * ps[0] + ci * ps[1] + h * ps[2] + x * ps[3]];
                        assert_eq!(v, (1000 * h + 100 * x + 10 * ci + co) as f64);
                    }
                }
            }
        }
    }

    #[test]
    fn identity_permutation_is_noop() {
        let w = marked([2, 2, 2, 2]);
        assert_eq!(w.permute(&[0, 1, 2, 3]).unwrap(), w);
    }

    #[test]
    fn permutation_rank_mismatch() {
        let w = WeightArray::new(vec![2, 3], vec![0.0; 6]).unwrap();
        let err = w.permute(&[3, 2, 0, 1]).unwrap_err();
        assert!(err.contains("does not match rank 2"), "got: {err}");
        assert!(w.permute(&[0, 0]).is_err());
    }

    #[test]
    fn element_count_checked() {
        assert!(WeightArray::new(vec![2, 2], vec![1.0; 3]).is_err());
    }

    #[test]
    fn record_encoding() {
        let store = WeightStore::from_value(json!({
            "fc": {
                "weights": {"shape": [2, 2], "dtype": "float32", "data": [1, 2, 3, 4]},
                "bias": {"shape": [2], "data": [0.5, 0.25]}
            }
        }))
        .unwrap();
        let w = store.get("fc", "weights").unwrap();
        assert_eq!(w.shape, vec![2, 2]);
        assert_eq!(w.data, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(store.get("fc", "bias").unwrap().dtype, "float32");
        assert_eq!(store.array_count(), 2);
    }

    #[test]
    fn nested_encoding_fallback() {
        let store = WeightStore::from_value(json!({
            "bn": {
                "mean": [0.0, 1.0, 2.0],
                "kernel": [[[1, 2], [3, 4]], [[5, 6], [7, 8]], [[9, 10], [11, 12]]]
            }
        }))
        .unwrap();
        assert_eq!(store.get("bn", "mean").unwrap().shape, vec![3]);
        let k = store.get("bn", "kernel").unwrap();
        assert_eq!(k.shape, vec![3, 2, 2]);
        assert_eq!(k.data[11], 12.0);
    }

    #[test]
    fn ragged_nesting_rejected() {
        let err = WeightStore::from_value(json!({"x": {"w": [[1, 2], [3]]}})).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ragged"), "got: {msg}");
    }

    #[test]
    fn record_with_bad_count_falls_through_to_error() {
        let err = WeightStore::from_value(json!({
            "x": {"w": {"shape": [3], "data": [1, 2]}}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn require_reports_missing_role() {
        let store = WeightStore::new();
        let err = store.require("conv1", "weights").unwrap_err();
        assert_eq!(err.to_string(), "no weights for role 'weights' of node 'conv1'");
    }

    #[test]
    fn load_missing_file() {
        let err = WeightStore::load(Path::new("/nonexistent/weights.json")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(err.to_string().contains("is not found"));
    }

    #[test]
    fn load_from_disk() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, r#"{{"relu": {{}}, "fc": {{"bias": [1, 2]}}}}"#).unwrap();
        let store = WeightStore::load(tmp.path()).unwrap();
        assert_eq!(store.get("fc", "bias").unwrap().data, vec![1.0, 2.0]);
    }

    #[test]
    fn load_invalid_json() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "not json").unwrap();
        assert!(matches!(
            WeightStore::load(tmp.path()).unwrap_err(),
            Error::Json { .. }
        ));
    }
}
