//! The single-token decode pipeline.

use pyrope::config::ModelConfig;
use pyrope::weights::ModelWeights;
use pyrope::{Error, Result};

use crate::attention::{attention_forward, AttentionConfig};
use crate::kv_cache::{KvCache, KvCacheConfig};
use crate::mlp::{mlp_forward, MlpConfig};
use crate::ops;

/// One decode context: config, weights and a private KV cache.
///
/// The cache is the only mutable state carried across calls; the
/// weights (and the mapping behind them) stay read-only, so distinct
/// contexts may share one [`ModelWeights`]. A context is
/// single-threaded; positions passed to [`Self::forward_decode`] must
/// increase across a generation run. A failed decode leaves the cache
/// partially written, so treat it as terminal for the context.
pub struct RuntimeCtx {
    cfg: ModelConfig,
    weights: ModelWeights,
    cache: KvCache,
    max_seq_len: usize,
}

impl RuntimeCtx {
    /// Validate the config and allocate the cache.
    ///
    /// # Errors
    /// `Config` for invalid geometry, a zero `max_seq_len`, or a
    /// weight binding whose layer count disagrees with the config.
    pub fn new(cfg: ModelConfig, weights: ModelWeights, max_seq_len: usize) -> Result<Self> {
        cfg.validate()?;
        if max_seq_len == 0 {
            return Err(Error::Config("max_seq_len must be positive".into()));
        }
        if weights.n_layers() != cfg.n_layers {
            return Err(Error::Config(format!(
                "weights carry {} layers but the config says {}",
                weights.n_layers(),
                cfg.n_layers
            )));
        }
        let cache = KvCache::new(KvCacheConfig {
            n_layers: cfg.n_layers,
            max_seq_len,
            n_q_heads: cfg.n_q_heads,
            n_kv_heads: cfg.n_kv_heads,
            head_dim: cfg.head_dim(),
        });
        log::debug!(
            "decode context: {} layers, d_model {}, max_seq_len {max_seq_len}",
            cfg.n_layers,
            cfg.d_model
        );
        Ok(Self {
            cfg,
            weights,
            cache,
            max_seq_len,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.cfg
    }

    #[must_use]
    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    /// Next-token logits for `token_id` at sequence position `pos`.
    ///
    /// Embedding lookup, then per layer: pre-norm → attention (reads
    /// and appends the cache at `pos`) → residual → pre-norm → MLP →
    /// residual; finally the output norm and the LM head. Absent
    /// per-layer norms are skipped.
    ///
    /// # Errors
    /// `OutOfRange` for a bad token id or position; every kernel and
    /// binding failure propagates unchanged.
    pub fn forward_decode(&mut self, token_id: u32, pos: usize) -> Result<Vec<f32>> {
        if pos >= self.max_seq_len {
            return Err(Error::OutOfRange(format!(
                "position {pos} in a context of max_seq_len {}",
                self.max_seq_len
            )));
        }

        let mut x = ops::embedding_row(&self.weights.token_embeddings()?, token_id)?;
        let attn_cfg = AttentionConfig::from_model(&self.cfg);

        for l in 0..self.cfg.n_layers {
            let layer = self.weights.layer(l)?;

            let normed = match &layer.attn_norm {
                Some(gain) => ops::rms_norm(&x.view(), gain, self.cfg.rms_norm_eps)?,
                None => x.clone(),
            };
            let attn_out =
                attention_forward(&normed.view(), &layer.attn, &attn_cfg, &mut self.cache, l, pos)?;
            ops::add_inplace(&mut x, &attn_out.view())?;

            let normed = match &layer.ffn_norm {
                Some(gain) => ops::rms_norm(&x.view(), gain, self.cfg.rms_norm_eps)?,
                None => x.clone(),
            };
            let mlp_cfg = MlpConfig {
                d_model: self.cfg.d_model,
                d_ff: layer.mlp.w1.shape()[0],
                use_gelu: self.cfg.use_gelu,
            };
            let mlp_out = mlp_forward(&normed.view(), &layer.mlp, &mlp_cfg)?;
            ops::add_inplace(&mut x, &mlp_out.view())?;
        }

        let x = ops::rms_norm(&x.view(), &self.weights.final_norm()?, self.cfg.rms_norm_eps)?;
        let logits = ops::linear(&x.view(), &self.weights.lm_head()?, None)?;
        Ok(logits.into_f32_vec())
    }

    /// Run the prompt through positions `0..tokens.len()` and return
    /// the logits after the last token. Positions restart at zero, so
    /// this is only valid on a fresh context (or to re-process the
    /// same prompt).
    ///
    /// # Errors
    /// `InvalidShape` for an empty prompt; otherwise whatever
    /// [`Self::forward_decode`] reports.
    pub fn prefill(&mut self, tokens: &[u32]) -> Result<Vec<f32>> {
        if tokens.is_empty() {
            return Err(Error::InvalidShape("prefill: empty token sequence".into()));
        }
        let mut last = Vec::new();
        for (pos, &token) in tokens.iter().enumerate() {
            last = self.forward_decode(token, pos)?;
        }
        Ok(last)
    }
}
