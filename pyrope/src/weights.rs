//! Typed views onto the safetensors backing, organized per layer.
//!
//! [`ModelWeights`] owns an `Arc` handle to the reader so the memory
//! mapping stays alive for as long as the weights do; every view it
//! hands out is borrow-bounded by the `ModelWeights` value itself.

use std::sync::Arc;

use crate::config::ModelConfig;
use crate::safetensors::SafeTensorReader;
use crate::tensor::TensorView;
use crate::{Error, Result};

/// Checkpoint naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightNaming {
    /// Mistral `consolidated.safetensors` names
    /// (`tok_embeddings.weight`, `layers.N.attention.wq.weight`, …).
    Consolidated,
    /// HuggingFace names
    /// (`model.embed_tokens.weight`, `model.layers.N.self_attn.q_proj.weight`, …).
    HuggingFace,
}

/// Per-layer attention projection views.
pub struct AttentionWeights<'a> {
    /// `[n_q_heads * head_dim, d_model]`
    pub wq: TensorView<'a>,
    /// `[n_kv_heads * head_dim, d_model]`
    pub wk: TensorView<'a>,
    /// `[n_kv_heads * head_dim, d_model]`
    pub wv: TensorView<'a>,
    /// `[d_model, n_q_heads * head_dim]`
    pub wo: TensorView<'a>,
    pub bq: Option<TensorView<'a>>,
    pub bk: Option<TensorView<'a>>,
    pub bv: Option<TensorView<'a>>,
    pub bo: Option<TensorView<'a>>,
}

/// Per-layer gated-MLP projection views.
pub struct MlpWeights<'a> {
    /// Gate projection `[d_ff, d_model]`
    pub w1: TensorView<'a>,
    /// Up projection `[d_ff, d_model]`
    pub w3: TensorView<'a>,
    /// Down projection `[d_model, d_ff]`
    pub w2: TensorView<'a>,
    pub b1: Option<TensorView<'a>>,
    pub b3: Option<TensorView<'a>>,
    pub b2: Option<TensorView<'a>>,
}

/// All views for one transformer layer.
pub struct LayerWeights<'a> {
    pub attn: AttentionWeights<'a>,
    pub mlp: MlpWeights<'a>,
    /// Pre-attention RMSNorm gain `[d_model]`.
    pub attn_norm: Option<TensorView<'a>>,
    /// Pre-MLP RMSNorm gain `[d_model]`.
    pub ffn_norm: Option<TensorView<'a>>,
}

#[derive(Clone)]
struct LayerNames {
    wq: String,
    wk: String,
    wv: String,
    wo: String,
    w1: String,
    w3: String,
    w2: String,
    bq: Option<String>,
    bk: Option<String>,
    bv: Option<String>,
    bo: Option<String>,
    b1: Option<String>,
    b3: Option<String>,
    b2: Option<String>,
    attn_norm: Option<String>,
    ffn_norm: Option<String>,
}

/// Weight binding for a whole model.
///
/// Cloning is cheap (names + a shared reader handle); distinct decode
/// contexts may share one `ModelWeights` since the mapping is
/// read-only.
#[derive(Clone)]
pub struct ModelWeights {
    reader: Arc<SafeTensorReader>,
    naming: WeightNaming,
    token_embeddings: String,
    lm_head: String,
    final_norm: String,
    layers: Vec<LayerNames>,
}

fn bias_name(weight: &str) -> String {
    weight
        .strip_suffix(".weight")
        .map_or_else(|| format!("{weight}.bias"), |stem| format!("{stem}.bias"))
}

fn optional(reader: &SafeTensorReader, name: String) -> Option<String> {
    reader.contains(&name).then_some(name)
}

impl LayerNames {
    fn resolve(naming: WeightNaming, layer: usize, reader: &SafeTensorReader) -> Self {
        let (wq, wk, wv, wo, w1, w3, w2, attn_norm, ffn_norm) = match naming {
            WeightNaming::Consolidated => {
                let p = format!("layers.{layer}.");
                (
                    format!("{p}attention.wq.weight"),
                    format!("{p}attention.wk.weight"),
                    format!("{p}attention.wv.weight"),
                    format!("{p}attention.wo.weight"),
                    format!("{p}feed_forward.w1.weight"),
                    format!("{p}feed_forward.w3.weight"),
                    format!("{p}feed_forward.w2.weight"),
                    format!("{p}attention_norm.weight"),
                    format!("{p}ffn_norm.weight"),
                )
            }
            WeightNaming::HuggingFace => {
                let p = format!("model.layers.{layer}.");
                (
                    format!("{p}self_attn.q_proj.weight"),
                    format!("{p}self_attn.k_proj.weight"),
                    format!("{p}self_attn.v_proj.weight"),
                    format!("{p}self_attn.o_proj.weight"),
                    format!("{p}mlp.gate_proj.weight"),
                    format!("{p}mlp.up_proj.weight"),
                    format!("{p}mlp.down_proj.weight"),
                    format!("{p}input_layernorm.weight"),
                    format!("{p}post_attention_layernorm.weight"),
                )
            }
        };
        Self {
            bq: optional(reader, bias_name(&wq)),
            bk: optional(reader, bias_name(&wk)),
            bv: optional(reader, bias_name(&wv)),
            bo: optional(reader, bias_name(&wo)),
            b1: optional(reader, bias_name(&w1)),
            b3: optional(reader, bias_name(&w3)),
            b2: optional(reader, bias_name(&w2)),
            attn_norm: optional(reader, attn_norm),
            ffn_norm: optional(reader, ffn_norm),
            wq,
            wk,
            wv,
            wo,
            w1,
            w3,
            w2,
        }
    }
}

impl ModelWeights {
    /// Bind every required tensor and validate its shape against the
    /// config.
    ///
    /// The naming scheme is detected from the embedding tensor. The
    /// LM head binds to the token embeddings only when the head
    /// tensor is absent *and* `tie_word_embeddings` is set; a missing
    /// up projection (`w3`) is always an error, never aliased to the
    /// gate.
    ///
    /// # Errors
    /// `TensorNotFound` for missing tensors, `ShapeMismatch` when a
    /// tensor disagrees with the config geometry, `UnsupportedDtype`
    /// for tensors stored in a dtype the engine cannot read.
    pub fn bind(
        reader: Arc<SafeTensorReader>,
        cfg: &ModelConfig,
        tie_word_embeddings: bool,
    ) -> Result<Self> {
        let naming = if reader.contains("tok_embeddings.weight") {
            WeightNaming::Consolidated
        } else if reader.contains("model.embed_tokens.weight") {
            WeightNaming::HuggingFace
        } else {
            return Err(Error::TensorNotFound(
                "tok_embeddings.weight or model.embed_tokens.weight \
                 (unrecognized checkpoint naming)"
                    .into(),
            ));
        };

        let (token_embeddings, head, final_norm) = match naming {
            WeightNaming::Consolidated => ("tok_embeddings.weight", "output.weight", "norm.weight"),
            WeightNaming::HuggingFace => (
                "model.embed_tokens.weight",
                "lm_head.weight",
                "model.norm.weight",
            ),
        };

        let lm_head = if reader.contains(head) {
            head.to_string()
        } else if tie_word_embeddings {
            token_embeddings.to_string()
        } else {
            return Err(Error::TensorNotFound(format!(
                "{head} (absent and tie_word_embeddings is not set)"
            )));
        };

        let mut layers = Vec::with_capacity(cfg.n_layers);
        for l in 0..cfg.n_layers {
            let names = LayerNames::resolve(naming, l, &reader);
            if !reader.contains(&names.w3) {
                return Err(Error::TensorNotFound(format!(
                    "{} (a gated MLP needs an up projection independent of the gate)",
                    names.w3
                )));
            }
            layers.push(names);
        }

        let weights = Self {
            reader,
            naming,
            token_embeddings: token_embeddings.to_string(),
            lm_head,
            final_norm: final_norm.to_string(),
            layers,
        };
        weights.validate_shapes(cfg)?;
        Ok(weights)
    }

    fn validate_shapes(&self, cfg: &ModelConfig) -> Result<()> {
        let d_model = cfg.d_model;
        let q_dim = cfg.n_q_heads * cfg.head_dim();
        let kv_dim = cfg.n_kv_heads * cfg.head_dim();

        self.expect_shape(&self.token_embeddings, &[cfg.vocab_size, d_model])?;
        self.expect_shape(&self.lm_head, &[cfg.vocab_size, d_model])?;
        self.expect_shape(&self.final_norm, &[d_model])?;

        let mut d_ff = None;
        for names in &self.layers {
            self.expect_shape(&names.wq, &[q_dim, d_model])?;
            self.expect_shape(&names.wk, &[kv_dim, d_model])?;
            self.expect_shape(&names.wv, &[kv_dim, d_model])?;
            self.expect_shape(&names.wo, &[d_model, q_dim])?;

            let w1 = self.reader.tensor(&names.w1)?;
            if w1.ndim() != 2 || w1.shape()[1] != d_model {
                return Err(Error::ShapeMismatch {
                    expected: vec![d_ff.unwrap_or(0), d_model],
                    got: w1.shape().to_vec(),
                });
            }
            let ff = w1.shape()[0];
            match d_ff {
                None => d_ff = Some(ff),
                Some(prev) if prev != ff => {
                    return Err(Error::Config(format!(
                        "inconsistent feed-forward width across layers: {prev} vs {ff}"
                    )));
                }
                Some(_) => {}
            }
            self.expect_shape(&names.w3, &[ff, d_model])?;
            self.expect_shape(&names.w2, &[d_model, ff])?;

            if let Some(n) = &names.attn_norm {
                self.expect_shape(n, &[d_model])?;
            }
            if let Some(n) = &names.ffn_norm {
                self.expect_shape(n, &[d_model])?;
            }
            for (bias, dim) in [
                (&names.bq, q_dim),
                (&names.bk, kv_dim),
                (&names.bv, kv_dim),
                (&names.bo, d_model),
                (&names.b1, ff),
                (&names.b3, ff),
                (&names.b2, d_model),
            ] {
                if let Some(n) = bias {
                    self.expect_shape(n, &[dim])?;
                }
            }
        }
        Ok(())
    }

    fn expect_shape(&self, name: &str, expected: &[usize]) -> Result<()> {
        let view = self.reader.tensor(name)?;
        if view.shape() != expected {
            return Err(Error::ShapeMismatch {
                expected: expected.to_vec(),
                got: view.shape().to_vec(),
            });
        }
        Ok(())
    }

    fn view(&self, name: &str) -> Result<TensorView<'_>> {
        self.reader.tensor(name)
    }

    fn opt_view(&self, name: Option<&String>) -> Result<Option<TensorView<'_>>> {
        name.map(|n| self.reader.tensor(n)).transpose()
    }

    #[must_use]
    pub fn naming(&self) -> WeightNaming {
        self.naming
    }

    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// True when the LM head shares the embedding tensor.
    #[must_use]
    pub fn tied_lm_head(&self) -> bool {
        self.lm_head == self.token_embeddings
    }

    /// `[vocab_size, d_model]` token embedding table.
    ///
    /// # Errors
    /// Propagates reader failures (cannot occur after a successful
    /// bind unless the name set was mutated).
    pub fn token_embeddings(&self) -> Result<TensorView<'_>> {
        self.view(&self.token_embeddings)
    }

    /// `[vocab_size, d_model]` LM head.
    ///
    /// # Errors
    /// Propagates reader failures.
    pub fn lm_head(&self) -> Result<TensorView<'_>> {
        self.view(&self.lm_head)
    }

    /// `[d_model]` final RMSNorm gain.
    ///
    /// # Errors
    /// Propagates reader failures.
    pub fn final_norm(&self) -> Result<TensorView<'_>> {
        self.view(&self.final_norm)
    }

    /// All views for layer `idx`.
    ///
    /// # Errors
    /// `OutOfRange` for a bad layer index.
    pub fn layer(&self, idx: usize) -> Result<LayerWeights<'_>> {
        let names = self.layers.get(idx).ok_or_else(|| {
            Error::OutOfRange(format!("layer {idx} of a {}-layer model", self.layers.len()))
        })?;
        Ok(LayerWeights {
            attn: AttentionWeights {
                wq: self.view(&names.wq)?,
                wk: self.view(&names.wk)?,
                wv: self.view(&names.wv)?,
                wo: self.view(&names.wo)?,
                bq: self.opt_view(names.bq.as_ref())?,
                bk: self.opt_view(names.bk.as_ref())?,
                bv: self.opt_view(names.bv.as_ref())?,
                bo: self.opt_view(names.bo.as_ref())?,
            },
            mlp: MlpWeights {
                w1: self.view(&names.w1)?,
                w3: self.view(&names.w3)?,
                w2: self.view(&names.w2)?,
                b1: self.opt_view(names.b1.as_ref())?,
                b3: self.opt_view(names.b3.as_ref())?,
                b2: self.opt_view(names.b2.as_ref())?,
            },
            attn_norm: self.opt_view(names.attn_norm.as_ref())?,
            ffn_norm: self.opt_view(names.ffn_norm.as_ref())?,
        })
    }
}
