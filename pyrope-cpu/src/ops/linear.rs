//! Mixed-dtype linear projection.
//!
//! Weights are stored out-dim-first (`[d_out, d_in]`), the PyTorch
//! `nn.Linear.weight` layout, so each output element is a dot product
//! of the activation row against one contiguous weight row. There is
//! no transpose flag.

use pyrope::dtype::DType;
use pyrope::tensor::{Tensor, TensorView};
use pyrope::{Error, Result};

/// Dot product of an f32 activation row against one stored weight
/// row. The dtype dispatch is hoisted out of the inner loop.
#[inline]
fn dot_row(x: &[f32], row: &[u8], dtype: DType) -> f32 {
    let mut acc = 0.0f32;
    match dtype {
        DType::F32 => {
            for (b, &xv) in row.chunks_exact(4).zip(x) {
                acc = xv.mul_add(f32::from_le_bytes([b[0], b[1], b[2], b[3]]), acc);
            }
        }
        DType::F16 => {
            for (b, &xv) in row.chunks_exact(2).zip(x) {
                let w = half::f16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32();
                acc = xv.mul_add(w, acc);
            }
        }
        DType::BF16 => {
            for (b, &xv) in row.chunks_exact(2).zip(x) {
                let w = half::bf16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32();
                acc = xv.mul_add(w, acc);
            }
        }
        DType::I8 => {
            for (&b, &xv) in row.iter().zip(x) {
                acc = xv.mul_add(f32::from(b as i8), acc);
            }
        }
    }
    acc
}

/// `y[n, o] = Σ_k x[n, k] · w[o, k] + bias[o]`, accumulated in f32.
///
/// `x` is `[n, d_in]` or `[d_in]`; `w` is `[d_out, d_in]`; the
/// optional bias is `[d_out]`. The output rank follows `x`. Input and
/// weight dtypes are independent.
///
/// # Errors
/// `InvalidShape` for a non-2-D weight or an input of rank > 2;
/// `ShapeMismatch` when the inner dimensions or the bias length
/// disagree.
pub fn linear(
    x: &TensorView<'_>,
    w: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
) -> Result<Tensor> {
    let w_shape = w.shape();
    if w.ndim() != 2 {
        return Err(Error::InvalidShape(format!(
            "linear: weight must be 2-D, got {w_shape:?}"
        )));
    }
    let d_out = w_shape[0];
    let d_in = w_shape[1];

    let x_shape = x.shape();
    let (n, x_last) = match x.ndim() {
        1 => (1, x_shape[0]),
        2 => (x_shape[0], x_shape[1]),
        _ => {
            return Err(Error::InvalidShape(format!(
                "linear: input must be 1-D or 2-D, got {x_shape:?}"
            )));
        }
    };
    if x_last != d_in {
        return Err(Error::ShapeMismatch {
            expected: vec![n, d_in],
            got: x_shape.to_vec(),
        });
    }
    if let Some(b) = bias {
        if b.shape() != [d_out] {
            return Err(Error::ShapeMismatch {
                expected: vec![d_out],
                got: b.shape().to_vec(),
            });
        }
    }

    // Activations are f32 in practice; decode other dtypes once.
    let x_owned;
    let x_data: &[f32] = match x.as_f32() {
        Some(s) => s,
        None => {
            x_owned = x.to_f32_vec();
            &x_owned
        }
    };
    let bias_data = bias.map(TensorView::to_f32_vec);

    let mut out = vec![0.0f32; n * d_out];
    for r in 0..n {
        let x_row = &x_data[r * d_in..(r + 1) * d_in];
        let out_row = &mut out[r * d_out..(r + 1) * d_out];
        for (o, y) in out_row.iter_mut().enumerate() {
            *y = dot_row(x_row, w.row(o), w.dtype());
        }
        if let Some(b) = &bias_data {
            for (y, bv) in out_row.iter_mut().zip(b) {
                *y += bv;
            }
        }
    }

    let out_shape: Vec<usize> = if x.ndim() == 1 {
        vec![d_out]
    } else {
        vec![n, d_out]
    };
    Ok(Tensor::from_f32(&out_shape, &out))
}
