//! Model output to mask conversion

use crate::{
    error::{BgStudioError, Result},
    types::SegmentationMask,
};
use ndarray::{Array4, Axis};

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Convert the first output channel of an NCHW tensor into a mask
///
/// With `apply_sigmoid` the raw values are treated as logits. Probabilities
/// are scaled by 255 and truncated, so 0.999 maps to 254.
///
/// # Errors
/// - Empty batch or channel dimension
pub fn tensor_to_mask(tensor: &Array4<f32>, apply_sigmoid: bool) -> Result<SegmentationMask> {
    let (batch, channels, height, width) = tensor.dim();
    if batch == 0 || channels == 0 {
        return Err(BgStudioError::inference(format!(
            "Unexpected output tensor shape {:?}",
            tensor.shape()
        )));
    }

    let plane = tensor.index_axis(Axis(0), 0);
    let plane = plane.index_axis(Axis(0), 0);
    let data = plane
        .iter()
        .map(|&value| {
            let probability = if apply_sigmoid { sigmoid(value) } else { value };
            (probability.clamp(0.0, 1.0) * 255.0) as u8
        })
        .collect();

    SegmentationMask::new(data, (width as u32, height as u32))
}
