//! Value types carried by IR node attributes.

use std::fmt;

/// IR element type, numbered as in the IR's `DataType` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Undefined,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Bool,
    String,
}

const DTYPES: [(DType, &str); 16] = [
    (DType::Undefined, "DT_UNDEFINED"),
    (DType::Int8, "DT_INT8"),
    (DType::Int16, "DT_INT16"),
    (DType::Int32, "DT_INT32"),
    (DType::Int64, "DT_INT64"),
    (DType::UInt8, "DT_UINT8"),
    (DType::UInt16, "DT_UINT16"),
    (DType::UInt32, "DT_UINT32"),
    (DType::UInt64, "DT_UINT64"),
    (DType::Float16, "DT_FLOAT16"),
    (DType::Float32, "DT_FLOAT32"),
    (DType::Float64, "DT_FLOAT64"),
    (DType::Complex64, "DT_COMPLEX64"),
    (DType::Complex128, "DT_COMPLEX128"),
    (DType::Bool, "DT_BOOL"),
    (DType::String, "DT_STRING"),
];

impl DType {
    /// Numeric enum value.
    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| DTYPES.get(i))
            .map(|(dt, _)| *dt)
    }

    /// Enum name, e.g. `DT_FLOAT32`.
    pub fn from_name(name: &str) -> Option<Self> {
        DTYPES.iter().find(|(_, n)| *n == name).map(|(dt, _)| *dt)
    }

    pub fn name(self) -> &'static str {
        DTYPES
            .iter()
            .find(|(dt, _)| *dt == self)
            .map(|(_, n)| *n)
            .unwrap_or("DT_UNDEFINED")
    }

    /// Undefined element types are treated as 32-bit float.
    pub fn or_float32(self) -> Self {
        match self {
            DType::Undefined => DType::Float32,
            other => other,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One dimension of a shape descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Known(i64),
    /// Dynamic dimension, serialized as `-1`
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Shape {
    pub dims: Vec<Dim>,
}

impl Shape {
    /// Build from raw sizes; negative sizes become `Dim::Unknown`.
    pub fn from_sizes(sizes: &[i64]) -> Self {
        let dims = sizes
            .iter()
            .map(|&s| if s < 0 { Dim::Unknown } else { Dim::Known(s) })
            .collect();
        Self { dims }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .dims
            .iter()
            .map(|d| match d {
                Dim::Known(n) => n.to_string(),
                Dim::Unknown => "?".to_string(),
            })
            .collect();
        write!(f, "[{}]", dims.join(", "))
    }
}

/// Repeated attribute payload. At most one field is expected to be non-empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttrList {
    pub ints: Vec<i64>,
    pub floats: Vec<f64>,
    pub bools: Vec<bool>,
    pub strs: Vec<String>,
    pub types: Vec<DType>,
    pub shapes: Vec<Shape>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Type(DType),
    Shape(Shape),
    List(AttrList),
}

impl AttrValue {
    pub fn ints(values: &[i64]) -> Self {
        AttrValue::List(AttrList {
            ints: values.to_vec(),
            ..AttrList::default()
        })
    }

    pub fn shapes(shapes: Vec<Shape>) -> Self {
        AttrValue::List(AttrList {
            shapes,
            ..AttrList::default()
        })
    }

    /// Short name of the payload kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Bool(_) => "bool",
            AttrValue::Str(_) => "string",
            AttrValue::Type(_) => "type",
            AttrValue::Shape(_) => "shape",
            AttrValue::List(_) => "list",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_codes_follow_ir_numbering() {
        assert_eq!(DType::from_code(0), Some(DType::Undefined));
        assert_eq!(DType::from_code(10), Some(DType::Float32));
        assert_eq!(DType::from_code(15), Some(DType::String));
        assert_eq!(DType::from_code(16), None);
        assert_eq!(DType::from_code(-1), None);
    }

    #[test]
    fn dtype_names_round_trip() {
        assert_eq!(DType::from_name("DT_FLOAT64"), Some(DType::Float64));
        assert_eq!(DType::Float64.name(), "DT_FLOAT64");
        assert_eq!(DType::from_name("FLOAT"), None);
    }

    #[test]
    fn undefined_becomes_float32() {
        assert_eq!(DType::Undefined.or_float32(), DType::Float32);
        assert_eq!(DType::Int64.or_float32(), DType::Int64);
    }

    #[test]
    fn negative_sizes_are_unknown() {
        let shape = Shape::from_sizes(&[-1, 3, 224, 224]);
        assert_eq!(shape.dims[0], Dim::Unknown);
        assert_eq!(shape.dims[1], Dim::Known(3));
        assert_eq!(shape.to_string(), "[?, 3, 224, 224]");
    }
}
