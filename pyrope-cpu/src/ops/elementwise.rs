//! Elementwise arithmetic.

use pyrope::tensor::{Tensor, TensorView};
use pyrope::{Error, Result};

fn check_same_shape(a: &TensorView<'_>, b: &TensorView<'_>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            expected: a.shape().to_vec(),
            got: b.shape().to_vec(),
        });
    }
    Ok(())
}

/// `y = a + b`; shapes must match exactly.
///
/// # Errors
/// `ShapeMismatch` when shapes differ.
pub fn add(a: &TensorView<'_>, b: &TensorView<'_>) -> Result<Tensor> {
    check_same_shape(a, b)?;
    let mut out = a.to_f32_vec();
    for (i, y) in out.iter_mut().enumerate() {
        *y += b.read_f32(i);
    }
    Ok(Tensor::from_f32(a.shape(), &out))
}

/// `y = a · b`; shapes must match exactly.
///
/// # Errors
/// `ShapeMismatch` when shapes differ.
pub fn mul(a: &TensorView<'_>, b: &TensorView<'_>) -> Result<Tensor> {
    check_same_shape(a, b)?;
    let mut out = a.to_f32_vec();
    for (i, y) in out.iter_mut().enumerate() {
        *y *= b.read_f32(i);
    }
    Ok(Tensor::from_f32(a.shape(), &out))
}

/// `a += b` on an owned F32 tensor (the residual path).
///
/// # Errors
/// `ShapeMismatch` when shapes differ.
pub fn add_inplace(a: &mut Tensor, b: &TensorView<'_>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            expected: a.shape().to_vec(),
            got: b.shape().to_vec(),
        });
    }
    if let Some(b_data) = b.as_f32() {
        for (av, &bv) in a.as_f32_slice_mut().iter_mut().zip(b_data) {
            *av += bv;
        }
    } else {
        for (i, av) in a.as_f32_slice_mut().iter_mut().enumerate() {
            *av += b.read_f32(i);
        }
    }
    Ok(())
}
