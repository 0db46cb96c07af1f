//! SiLU and GELU activations.

use pyrope::tensor::{Tensor, TensorView};
use pyrope::Result;

/// Logistic sigmoid.
#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// GELU, tanh approximation:
/// `0.5 · x · (1 + tanh(√(2/π) · (x + 0.044715 · x³)))`.
#[inline]
fn gelu_tanh(x: f32) -> f32 {
    let coeff = 0.797_884_6; // sqrt(2/π)
    let inner = coeff * x.mul_add(0.044_715 * x * x, x);
    0.5 * x * (1.0 + inner.tanh())
}

/// GELU, exact form: `0.5 · x · (1 + erf(x / √2))`.
#[inline]
fn gelu_erf(x: f32) -> f32 {
    0.5 * x * (1.0 + libm::erff(x / std::f32::consts::SQRT_2))
}

/// Elementwise `y = x · σ(x)`.
///
/// # Errors
/// None beyond dtype decode; present for uniformity with the other
/// kernels.
pub fn silu(x: &TensorView<'_>) -> Result<Tensor> {
    let mut data = x.to_f32_vec();
    for v in &mut data {
        *v *= sigmoid(*v);
    }
    Ok(Tensor::from_f32(x.shape(), &data))
}

/// Elementwise GELU; `exact` selects the erf form over the default
/// tanh approximation.
///
/// # Errors
/// None beyond dtype decode.
pub fn gelu(x: &TensorView<'_>, exact: bool) -> Result<Tensor> {
    let mut data = x.to_f32_vec();
    if exact {
        for v in &mut data {
            *v = gelu_erf(*v);
        }
    } else {
        for v in &mut data {
            *v = gelu_tanh(*v);
        }
    }
    Ok(Tensor::from_f32(x.shape(), &data))
}
