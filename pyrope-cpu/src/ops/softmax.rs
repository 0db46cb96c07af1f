//! Numerically stable softmax.

use pyrope::tensor::{Tensor, TensorView};
use pyrope::{Error, Result};

/// Softmax over the last axis.
///
/// Each row has its maximum subtracted before exponentiation, so any
/// finite row produces a well-defined distribution. Output is F32
/// with the input's shape.
///
/// # Errors
/// `InvalidShape` for a 0-D input.
pub fn softmax(x: &TensorView<'_>) -> Result<Tensor> {
    if x.ndim() == 0 {
        return Err(Error::InvalidShape(
            "softmax: input must have at least one dimension".into(),
        ));
    }
    let width = x.shape()[x.ndim() - 1];
    let mut data = x.to_f32_vec();

    for row in data.chunks_exact_mut(width) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        if sum > 0.0 {
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
    }
    Ok(Tensor::from_f32(x.shape(), &data))
}
