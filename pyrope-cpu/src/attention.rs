//! Grouped-query self-attention for a single decode position.

use pyrope::config::ModelConfig;
use pyrope::tensor::{Tensor, TensorView};
use pyrope::weights::AttentionWeights;
use pyrope::{DType, Error, Result};

use crate::kv_cache::KvCache;
use crate::ops::{self, RopeTable};

/// Geometry the attention kernel needs from the model config.
#[derive(Debug, Clone)]
pub struct AttentionConfig {
    pub d_model: usize,
    pub n_q_heads: usize,
    pub n_kv_heads: usize,
    pub head_dim: usize,
    pub rope_theta: f32,
    /// 0 means "rotate the full head".
    pub rope_dim: usize,
}

impl AttentionConfig {
    #[must_use]
    pub fn from_model(cfg: &ModelConfig) -> Self {
        Self {
            d_model: cfg.d_model,
            n_q_heads: cfg.n_q_heads,
            n_kv_heads: cfg.n_kv_heads,
            head_dim: cfg.head_dim(),
            rope_theta: cfg.rope_theta,
            rope_dim: cfg.rope_dim,
        }
    }
}

/// One attention step at sequence position `pos`.
///
/// Projects q/k/v from `x` (`[d_model]` or `[1, d_model]`), rotates q
/// and k for `pos`, appends k/v to the cache at `(layer_idx, pos)`,
/// then attends over cache positions `0..=pos`. Query head `h` reads
/// KV head `h / (n_q_heads / n_kv_heads)`; consecutive query-head
/// groups share one KV head. No causal mask is needed because later
/// slots are never read.
///
/// # Errors
/// `ShapeMismatch` when a projection disagrees with the config,
/// `Config` when the cache geometry does not match, plus anything the
/// cache append or the kernels report.
pub fn attention_forward(
    x: &TensorView<'_>,
    weights: &AttentionWeights<'_>,
    cfg: &AttentionConfig,
    cache: &mut KvCache,
    layer_idx: usize,
    pos: usize,
) -> Result<Tensor> {
    let q_dim = cfg.n_q_heads * cfg.head_dim;
    let kv_dim = cfg.n_kv_heads * cfg.head_dim;

    for (w, rows) in [
        (&weights.wq, q_dim),
        (&weights.wk, kv_dim),
        (&weights.wv, kv_dim),
    ] {
        if w.shape() != [rows, cfg.d_model] {
            return Err(Error::ShapeMismatch {
                expected: vec![rows, cfg.d_model],
                got: w.shape().to_vec(),
            });
        }
    }
    if weights.wo.shape() != [cfg.d_model, q_dim] {
        return Err(Error::ShapeMismatch {
            expected: vec![cfg.d_model, q_dim],
            got: weights.wo.shape().to_vec(),
        });
    }
    {
        let ccfg = cache.config();
        if ccfg.n_kv_heads != cfg.n_kv_heads || ccfg.head_dim != cfg.head_dim {
            return Err(Error::Config(format!(
                "cache geometry ({} kv heads x {}) does not match attention ({} kv heads x {})",
                ccfg.n_kv_heads, ccfg.head_dim, cfg.n_kv_heads, cfg.head_dim
            )));
        }
    }

    // Projections, reshaped to per-head rows.
    let q = ops::linear(x, &weights.wq, weights.bq.as_ref())?
        .reshape(&[cfg.n_q_heads, cfg.head_dim]);
    let k = ops::linear(x, &weights.wk, weights.bk.as_ref())?
        .reshape(&[cfg.n_kv_heads, cfg.head_dim]);
    let v = ops::linear(x, &weights.wv, weights.bv.as_ref())?
        .reshape(&[cfg.n_kv_heads, cfg.head_dim]);

    // RoPE on q and k; v is not rotated.
    let rotary_dim = if cfg.rope_dim == 0 {
        cfg.head_dim
    } else {
        cfg.rope_dim
    };
    let table = RopeTable::for_position(pos, rotary_dim, cfg.rope_theta)?;
    let q = ops::apply_rope(&q.view(), &table)?;
    let k = ops::apply_rope(&k.view(), &table)?;

    cache.append(layer_idx, pos, &k.view(), &v.view())?;

    // Scores against every cached position, GQA-mapped.
    let seq_len = pos + 1;
    let group = cfg.n_q_heads / cfg.n_kv_heads;
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / (cfg.head_dim as f32).sqrt();
    let q_data = q.as_f32_slice();
    let k_store = cache.k_data();

    let mut scores = vec![0.0f32; cfg.n_q_heads * seq_len];
    for h in 0..cfg.n_q_heads {
        let kv_h = h / group;
        let q_head = &q_data[h * cfg.head_dim..(h + 1) * cfg.head_dim];
        for t in 0..seq_len {
            let base = cache.offset(layer_idx, t, kv_h);
            let mut dot = 0.0f32;
            for (d, &qv) in q_head.iter().enumerate() {
                dot = qv.mul_add(k_store[base + d].to_f32(), dot);
            }
            scores[h * seq_len + t] = dot * scale;
        }
    }

    let scores_view = TensorView::new(
        bytemuck::cast_slice(&scores),
        DType::F32,
        &[cfg.n_q_heads, seq_len],
    )?;
    let attn = ops::softmax(&scores_view)?;
    let attn_data = attn.as_f32_slice();

    // Context: probability-weighted sum of cached V rows.
    let v_store = cache.v_data();
    let mut context = vec![0.0f32; q_dim];
    for h in 0..cfg.n_q_heads {
        let kv_h = h / group;
        let ctx_head = &mut context[h * cfg.head_dim..(h + 1) * cfg.head_dim];
        for t in 0..seq_len {
            let weight = attn_data[h * seq_len + t];
            if weight > 0.0 {
                let base = cache.offset(layer_idx, t, kv_h);
                for (d, c) in ctx_head.iter_mut().enumerate() {
                    *c = weight.mul_add(v_store[base + d].to_f32(), *c);
                }
            }
        }
    }

    // Flatten and project back to the model dimension, matching the
    // input's rank so the residual add lines up.
    let ctx_shape: Vec<usize> = if x.ndim() == 2 {
        vec![1, q_dim]
    } else {
        vec![q_dim]
    };
    let context = Tensor::from_f32(&ctx_shape, &context);
    ops::linear(&context.view(), &weights.wo, weights.bo.as_ref())
}
