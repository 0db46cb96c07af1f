//! Gated feed-forward block (SwiGLU, or its GELU variant).

use pyrope::tensor::{Tensor, TensorView};
use pyrope::weights::MlpWeights;
use pyrope::{Error, Result};

use crate::ops;

/// Geometry and activation choice for the MLP.
#[derive(Debug, Clone)]
pub struct MlpConfig {
    pub d_model: usize,
    pub d_ff: usize,
    /// GELU (tanh form) on the gate when true, SiLU otherwise.
    pub use_gelu: bool,
}

/// `y = W2 · (act(W1·x) ⊙ W3·x)`.
///
/// The gate (`w1`) and up (`w3`) projections are independent; the
/// binding layer guarantees both exist.
///
/// # Errors
/// `ShapeMismatch` when a projection disagrees with the config.
pub fn mlp_forward(
    x: &TensorView<'_>,
    weights: &MlpWeights<'_>,
    cfg: &MlpConfig,
) -> Result<Tensor> {
    for w in [&weights.w1, &weights.w3] {
        if w.shape() != [cfg.d_ff, cfg.d_model] {
            return Err(Error::ShapeMismatch {
                expected: vec![cfg.d_ff, cfg.d_model],
                got: w.shape().to_vec(),
            });
        }
    }
    if weights.w2.shape() != [cfg.d_model, cfg.d_ff] {
        return Err(Error::ShapeMismatch {
            expected: vec![cfg.d_model, cfg.d_ff],
            got: weights.w2.shape().to_vec(),
        });
    }

    let gate_lin = ops::linear(x, &weights.w1, weights.b1.as_ref())?;
    let gate = if cfg.use_gelu {
        ops::gelu(&gate_lin.view(), false)?
    } else {
        ops::silu(&gate_lin.view())?
    };
    let up = ops::linear(x, &weights.w3, weights.b3.as_ref())?;
    let hidden = ops::mul(&gate.view(), &up.view())?;
    ops::linear(&hidden.view(), &weights.w2, weights.b2.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swiglu_reference() {
        // d_model = 2, d_ff = 2, identity-ish projections.
        let w1 = Tensor::from_f32(&[2, 2], &[1.0, 0.0, 0.0, 1.0]);
        let w3 = Tensor::from_f32(&[2, 2], &[2.0, 0.0, 0.0, 2.0]);
        let w2 = Tensor::from_f32(&[2, 2], &[1.0, 0.0, 0.0, 1.0]);
        let weights = MlpWeights {
            w1: w1.view(),
            w3: w3.view(),
            w2: w2.view(),
            b1: None,
            b3: None,
            b2: None,
        };
        let cfg = MlpConfig {
            d_model: 2,
            d_ff: 2,
            use_gelu: false,
        };

        let x_data = [1.0f32, -0.5];
        let x = Tensor::from_f32(&[2], &x_data);
        let y = mlp_forward(&x.view(), &weights, &cfg).unwrap();

        for (out, &v) in y.as_f32_slice().iter().zip(&x_data) {
            let silu = v / (1.0 + (-v).exp());
            let expect = silu * (2.0 * v);
            assert!((out - expect).abs() < 1e-5, "{out} vs {expect}");
        }
    }

    #[test]
    fn test_gelu_variant_differs() {
        let w1 = Tensor::from_f32(&[2, 2], &[1.0, 0.0, 0.0, 1.0]);
        let w3 = Tensor::from_f32(&[2, 2], &[1.0, 0.0, 0.0, 1.0]);
        let w2 = Tensor::from_f32(&[2, 2], &[1.0, 0.0, 0.0, 1.0]);
        let weights = MlpWeights {
            w1: w1.view(),
            w3: w3.view(),
            w2: w2.view(),
            b1: None,
            b3: None,
            b2: None,
        };
        let x = Tensor::from_f32(&[2], &[0.7, -1.3]);

        let silu_out = mlp_forward(
            &x.view(),
            &weights,
            &MlpConfig {
                d_model: 2,
                d_ff: 2,
                use_gelu: false,
            },
        )
        .unwrap();
        let gelu_out = mlp_forward(
            &x.view(),
            &weights,
            &MlpConfig {
                d_model: 2,
                d_ff: 2,
                use_gelu: true,
            },
        )
        .unwrap();
        assert_ne!(
            silu_out.as_f32_slice()[0].to_bits(),
            gelu_out.as_f32_slice()[0].to_bits()
        );
    }

    #[test]
    fn test_rejects_wrong_ff_width() {
        let w1 = Tensor::from_f32(&[3, 2], &[0.0; 6]);
        let w3 = Tensor::from_f32(&[3, 2], &[0.0; 6]);
        let w2 = Tensor::from_f32(&[2, 3], &[0.0; 6]);
        let weights = MlpWeights {
            w1: w1.view(),
            w3: w3.view(),
            w2: w2.view(),
            b1: None,
            b3: None,
            b2: None,
        };
        let cfg = MlpConfig {
            d_model: 2,
            d_ff: 4, // weights carry 3
            use_gelu: false,
        };
        let x = Tensor::from_f32(&[2], &[0.0; 2]);
        assert!(matches!(
            mlp_forward(&x.view(), &weights, &cfg),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
