//! Plain matrix multiplication.
//!
//! Used by tests and non-attention paths; the projection hot path is
//! `ops::linear` and attention reads the KV cache directly.

use pyrope::tensor::{Tensor, TensorView};
use pyrope::{Error, Result};

/// `A (M,K) × B (K,N) → C (M,N)` in f32, or `A (M,K) × Bᵀ` when
/// `transpose_b` and B is `(N,K)`.
///
/// # Errors
/// `InvalidShape` for non-2-D operands; `ShapeMismatch` when the
/// contraction dimensions disagree.
pub fn matmul(a: &TensorView<'_>, b: &TensorView<'_>, transpose_b: bool) -> Result<Tensor> {
    if a.ndim() != 2 || b.ndim() != 2 {
        return Err(Error::InvalidShape(format!(
            "matmul: operands must be 2-D, got {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    let m = a.shape()[0];
    let k = a.shape()[1];
    let (b_k, n) = if transpose_b {
        (b.shape()[1], b.shape()[0])
    } else {
        (b.shape()[0], b.shape()[1])
    };
    if b_k != k {
        return Err(Error::ShapeMismatch {
            expected: vec![k, n],
            got: b.shape().to_vec(),
        });
    }

    let a_data = a.to_f32_vec();
    let b_data = b.to_f32_vec();
    let mut c = vec![0.0f32; m * n];

    if transpose_b {
        // C[m,n] = dot(A[m,:], B[n,:]), both rows contiguous.
        for row in 0..m {
            let a_row = &a_data[row * k..(row + 1) * k];
            let c_row = &mut c[row * n..(row + 1) * n];
            for (col, y) in c_row.iter_mut().enumerate() {
                let b_row = &b_data[col * k..(col + 1) * k];
                let mut acc = 0.0f32;
                for (&av, &bv) in a_row.iter().zip(b_row) {
                    acc = av.mul_add(bv, acc);
                }
                *y = acc;
            }
        }
    } else {
        // B[:,n] is strided; iterate K in the outer loop and stream
        // whole B rows.
        for row in 0..m {
            let a_row = &a_data[row * k..(row + 1) * k];
            let c_row = &mut c[row * n..(row + 1) * n];
            for (ki, &a_val) in a_row.iter().enumerate() {
                let b_row = &b_data[ki * n..(ki + 1) * n];
                for (y, &bv) in c_row.iter_mut().zip(b_row) {
                    *y = a_val.mul_add(bv, *y);
                }
            }
        }
    }

    Ok(Tensor::from_f32(&[m, n], &c))
}
