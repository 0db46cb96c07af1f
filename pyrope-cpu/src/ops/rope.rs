//! Rotary position embeddings.
//!
//! The rotated width is treated as consecutive `(x, y)` pairs, the
//! layout Mistral/LLaMA checkpoints are trained with, not the
//! half-rotation split some engines use. Q and K at the same decode
//! position share one table.

use pyrope::tensor::{Tensor, TensorView};
use pyrope::{Error, Result};

/// Cos/sin values for one sequence position, laid out `[pairs, 2]`.
pub struct RopeTable {
    cos_sin: Vec<f32>,
    pairs: usize,
}

impl RopeTable {
    /// Build the table for `pos` over `rotary_dim` dimensions:
    /// `θ_i = theta^(−2i / rotary_dim)`, entry `i` is
    /// `(cos(pos·θ_i), sin(pos·θ_i))`.
    ///
    /// # Errors
    /// `InvalidShape` when `rotary_dim` is zero or odd.
    #[allow(clippy::cast_precision_loss)]
    pub fn for_position(pos: usize, rotary_dim: usize, theta: f32) -> Result<Self> {
        if rotary_dim == 0 || rotary_dim % 2 != 0 {
            return Err(Error::InvalidShape(format!(
                "rotary_dim must be even and nonzero, got {rotary_dim}"
            )));
        }
        let pairs = rotary_dim / 2;
        let mut cos_sin = vec![0.0f32; pairs * 2];
        for i in 0..pairs {
            let theta_i = theta.powf(-2.0 * i as f32 / rotary_dim as f32);
            let angle = pos as f32 * theta_i;
            cos_sin[2 * i] = angle.cos();
            cos_sin[2 * i + 1] = angle.sin();
        }
        Ok(Self { cos_sin, pairs })
    }

    /// Number of rotated pairs (`rotary_dim / 2`).
    #[must_use]
    pub fn pairs(&self) -> usize {
        self.pairs
    }
}

/// Rotate the first `2 · pairs` entries of every head of `x`
/// (`[n_heads, head_dim]`): each pair `(x, y)` becomes
/// `(x·c − y·s, x·s + y·c)`. The tail past the rotary width is copied
/// through untouched.
///
/// # Errors
/// `InvalidShape` for a non-2-D input or a head narrower than the
/// table's rotary width.
pub fn apply_rope(x: &TensorView<'_>, table: &RopeTable) -> Result<Tensor> {
    if x.ndim() != 2 {
        return Err(Error::InvalidShape(format!(
            "rope: input must be [n_heads, head_dim], got {:?}",
            x.shape()
        )));
    }
    let n_heads = x.shape()[0];
    let head_dim = x.shape()[1];
    if 2 * table.pairs > head_dim {
        return Err(Error::InvalidShape(format!(
            "rope: rotary width {} exceeds head_dim {head_dim}",
            2 * table.pairs
        )));
    }

    let mut out = x.to_f32_vec();
    for h in 0..n_heads {
        let head = &mut out[h * head_dim..(h + 1) * head_dim];
        for i in 0..table.pairs {
            let c = table.cos_sin[2 * i];
            let s = table.cos_sin[2 * i + 1];
            let x0 = head[2 * i];
            let y0 = head[2 * i + 1];
            head[2 * i] = x0 * c - y0 * s;
            head[2 * i + 1] = x0 * s + y0 * c;
        }
    }
    Ok(Tensor::from_f32(x.shape(), &out))
}
