//! RMS normalization.

use pyrope::tensor::{Tensor, TensorView};
use pyrope::{Error, Result};

/// Default epsilon when a model config does not provide one.
pub const DEFAULT_EPS: f32 = 1e-5;

/// Root-mean-square normalization over the last dimension.
///
/// For every row `r`: `y[r, i] = x[r, i] · gain[i] / sqrt(ms + eps)`
/// where `ms` is the mean of the squared row. Output shape equals the
/// input shape, dtype F32.
///
/// # Errors
/// `InvalidShape` for a 0-D input; `ShapeMismatch` when `gain` is not
/// `[last_dim]`.
pub fn rms_norm(x: &TensorView<'_>, gain: &TensorView<'_>, eps: f32) -> Result<Tensor> {
    if x.ndim() == 0 {
        return Err(Error::InvalidShape("rms_norm: input must have at least one dimension".into()));
    }
    let hidden = x.shape()[x.ndim() - 1];
    if gain.shape() != [hidden] {
        return Err(Error::ShapeMismatch {
            expected: vec![hidden],
            got: gain.shape().to_vec(),
        });
    }

    let data = x.to_f32_vec();
    let gain_data = gain.to_f32_vec();
    let num_rows = data.len() / hidden;

    #[allow(clippy::cast_precision_loss)]
    let inv_n = 1.0 / hidden as f32;
    let mut out = vec![0.0f32; data.len()];
    for row in 0..num_rows {
        let start = row * hidden;
        let row_in = &data[start..start + hidden];
        let row_out = &mut out[start..start + hidden];

        let mut sum_sq = 0.0f32;
        for &v in row_in {
            sum_sq = v.mul_add(v, sum_sq);
        }
        let inv_rms = 1.0 / (sum_sq * inv_n + eps).sqrt();
        for ((y, &v), &g) in row_out.iter_mut().zip(row_in).zip(&gain_data) {
            *y = v * g * inv_rms;
        }
    }
    Ok(Tensor::from_f32(x.shape(), &out))
}
