//! Shape, padding and element-type conversions between IR and ONNX conventions.
//!
//! IR attributes describe every axis of a channels-last tensor (batch first,
//! channel last); ONNX attributes describe spatial axes only.

use crate::ir::{DType, Dim, Shape};

use super::plan::TensorType;

/// Concrete dimensions, with unknown dimensions pinned to 1.
pub fn concrete_dims(shape: &Shape) -> Vec<i64> {
    shape
        .dims
        .iter()
        .map(|d| match d {
            Dim::Known(n) => *n,
            Dim::Unknown => 1,
        })
        .collect()
}

/// `"1, 3, 224, 224"` for `[?, 3, 224, 224]`; empty for a rank-0 shape.
pub fn format_shape(shape: &Shape) -> String {
    join(&concrete_dims(shape))
}

pub fn join(values: &[i64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Drop the batch (first) and channel (last) entries.
pub fn inner_axes(values: &[i64]) -> Option<&[i64]> {
    if values.len() < 2 {
        return None;
    }
    Some(&values[1..values.len() - 1])
}

/// Spatial pads from a `[all lows][all highs]` list over every axis.
///
/// `[0, 1, 2, 0, 0, 3, 4, 0]` (N, H, W, C lows then highs) gives
/// `[1, 2, 3, 4]`, ONNX's begin-then-end order.
pub fn spatial_pads(pads: &[i64]) -> Option<Vec<i64>> {
    let len = pads.len();
    if len < 4 || len % 2 != 0 {
        return None;
    }
    let half = len / 2;
    let mut out = Vec::with_capacity(len - 4);
    out.extend_from_slice(&pads[1..half - 1]);
    out.extend_from_slice(&pads[half + 1..len - 1]);
    Some(out)
}

/// Pads for an ONNX `Pad` node over an NCHW tensor: batch and channel
/// entries are zero, spatial entries come from the IR list.
pub fn full_pads(pads: &[i64]) -> Option<Vec<i64>> {
    let spatial = spatial_pads(pads)?;
    let (lows, highs) = spatial.split_at(spatial.len() / 2);
    let mut out = Vec::with_capacity(pads.len());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(lows);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(highs);
    Some(out)
}

/// ONNX element type for an IR dtype; `Undefined` maps as float32.
pub fn tensor_type(dtype: DType) -> Option<TensorType> {
    let ty = match dtype.or_float32() {
        DType::Float32 => TensorType::Float,
        DType::Float64 => TensorType::Double,
        DType::Float16 => TensorType::Float16,
        DType::Int8 => TensorType::Int8,
        DType::Int16 => TensorType::Int16,
        DType::Int32 => TensorType::Int32,
        DType::Int64 => TensorType::Int64,
        DType::UInt8 => TensorType::Uint8,
        DType::UInt16 => TensorType::Uint16,
        DType::UInt32 => TensorType::Uint32,
        DType::UInt64 => TensorType::Uint64,
        DType::Bool => TensorType::Bool,
        DType::Complex64 | DType::Complex128 | DType::String | DType::Undefined => return None,
    };
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_dims_format_as_one() {
        let shape = Shape::from_sizes(&[-1, 3, 224, 224]);
        assert_eq!(format_shape(&shape), "1, 3, 224, 224");
    }

    #[test]
    fn empty_shape_formats_empty() {
        assert_eq!(format_shape(&Shape::default()), "");
    }

    #[test]
    fn inner_axes_drop_batch_and_channel() {
        assert_eq!(inner_axes(&[1, 2, 2, 1]), Some(&[2, 2][..]));
        assert_eq!(inner_axes(&[1, 1]), Some(&[][..]));
        assert_eq!(inner_axes(&[1]), None);
    }

    #[test]
    fn spatial_pads_keep_interior_pairs() {
        // lows: N=0 H=5 W=6 C=0, highs: N=0 H=7 W=8 C=0
        assert_eq!(
            spatial_pads(&[0, 5, 6, 0, 0, 7, 8, 0]),
            Some(vec![5, 6, 7, 8])
        );
    }

    #[test]
    fn spatial_pads_ignore_batch_and_channel_values() {
        assert_eq!(
            spatial_pads(&[9, 1, 2, 9, 9, 3, 4, 9]),
            Some(vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn spatial_pads_one_dimensional() {
        // N, W, C
        assert_eq!(spatial_pads(&[0, 2, 0, 0, 3, 0]), Some(vec![2, 3]));
    }

    #[test]
    fn spatial_pads_reject_odd_or_short() {
        assert_eq!(spatial_pads(&[0, 1, 1]), None);
        assert_eq!(spatial_pads(&[0, 0]), None);
        assert_eq!(spatial_pads(&[0, 1, 2, 0, 0, 3, 4]), None);
    }

    #[test]
    fn full_pads_zero_batch_and_channel() {
        assert_eq!(
            full_pads(&[0, 1, 2, 0, 0, 3, 4, 0]),
            Some(vec![0, 0, 1, 2, 0, 0, 3, 4])
        );
    }

    #[test]
    fn undefined_maps_like_float32() {
        assert_eq!(tensor_type(DType::Undefined), tensor_type(DType::Float32));
        assert_eq!(tensor_type(DType::Float32), Some(TensorType::Float));
    }

    #[test]
    fn complex_and_string_are_unmapped() {
        assert_eq!(tensor_type(DType::Complex64), None);
        assert_eq!(tensor_type(DType::String), None);
    }
}
