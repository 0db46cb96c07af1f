//! Model configuration.
//!
//! [`ModelConfig`] is the engine-facing geometry; [`PretrainedConfig`]
//! is the serde view of a HuggingFace-style `config.json` and
//! resolves into a validated `ModelConfig`.

use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// Geometry of a decoder-only model as the engine consumes it.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Hidden dimension.
    pub d_model: usize,
    /// Number of transformer layers.
    pub n_layers: usize,
    /// Number of query heads.
    pub n_q_heads: usize,
    /// Number of key/value heads (GQA; equals `n_q_heads` for MHA).
    pub n_kv_heads: usize,
    /// Vocabulary size.
    pub vocab_size: usize,
    /// RoPE base frequency.
    pub rope_theta: f32,
    /// Rotated width per head; 0 means "use the full head dim".
    pub rope_dim: usize,
    /// RMSNorm epsilon.
    pub rms_norm_eps: f32,
    /// Gate activation: GELU (tanh form) when true, SiLU otherwise.
    pub use_gelu: bool,
}

impl ModelConfig {
    /// Per-head dimension, `d_model / n_q_heads`.
    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.d_model / self.n_q_heads
    }

    /// Query heads per key/value head.
    #[must_use]
    pub fn gqa_group(&self) -> usize {
        self.n_q_heads / self.n_kv_heads
    }

    /// Rotated width with the `rope_dim == 0` default applied.
    #[must_use]
    pub fn rotary_dim(&self) -> usize {
        if self.rope_dim == 0 {
            self.head_dim()
        } else {
            self.rope_dim
        }
    }

    /// Check the structural invariants.
    ///
    /// # Errors
    /// Returns `Config` when any field is zero where it may not be,
    /// `n_q_heads` does not divide `d_model`, `n_kv_heads` does not
    /// divide `n_q_heads`, or `rope_dim` is odd or wider than the
    /// head.
    pub fn validate(&self) -> Result<()> {
        if self.d_model == 0
            || self.n_layers == 0
            || self.n_q_heads == 0
            || self.n_kv_heads == 0
            || self.vocab_size == 0
        {
            return Err(Error::Config(
                "d_model, n_layers, n_q_heads, n_kv_heads and vocab_size must be positive".into(),
            ));
        }
        if self.d_model % self.n_q_heads != 0 {
            return Err(Error::Config(format!(
                "n_q_heads {} does not divide d_model {}",
                self.n_q_heads, self.d_model
            )));
        }
        if self.n_q_heads % self.n_kv_heads != 0 {
            return Err(Error::Config(format!(
                "n_kv_heads {} does not divide n_q_heads {}",
                self.n_kv_heads, self.n_q_heads
            )));
        }
        if self.rope_dim != 0 {
            if self.rope_dim % 2 != 0 {
                return Err(Error::Config(format!(
                    "rope_dim {} must be even",
                    self.rope_dim
                )));
            }
            if self.rope_dim > self.head_dim() {
                return Err(Error::Config(format!(
                    "rope_dim {} exceeds head_dim {}",
                    self.rope_dim,
                    self.head_dim()
                )));
            }
        }
        Ok(())
    }
}

/// Configuration parsed from a model's `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct PretrainedConfig {
    /// Vocabulary size.
    pub vocab_size: usize,

    /// Hidden dimension size.
    pub hidden_size: usize,

    /// Intermediate size for the MLP (FFN).
    pub intermediate_size: usize,

    /// Number of transformer layers.
    pub num_hidden_layers: usize,

    /// Number of attention heads.
    pub num_attention_heads: usize,

    /// Number of key-value heads (defaults to `num_attention_heads`).
    #[serde(default)]
    pub num_key_value_heads: Option<usize>,

    /// Maximum sequence length the model was trained for.
    #[serde(default = "default_max_position_embeddings")]
    pub max_position_embeddings: usize,

    /// RMS norm epsilon.
    #[serde(default = "default_rms_norm_eps")]
    pub rms_norm_eps: f32,

    /// Rotary position embedding base frequency.
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f32,

    /// MLP gate activation name (`"silu"` or a GELU variant).
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,

    /// Tie word embeddings with the LM head.
    #[serde(default)]
    pub tie_word_embeddings: bool,
}

fn default_max_position_embeddings() -> usize {
    2048
}

fn default_rms_norm_eps() -> f32 {
    1e-5
}

fn default_rope_theta() -> f32 {
    10000.0
}

fn default_hidden_act() -> String {
    "silu".to_string()
}

impl PretrainedConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Number of key-value heads with the MHA fallback applied.
    #[must_use]
    pub fn num_kv_heads(&self) -> usize {
        self.num_key_value_heads.unwrap_or(self.num_attention_heads)
    }

    /// Resolve into a validated [`ModelConfig`].
    ///
    /// # Errors
    /// Returns `Config` when the resulting geometry is invalid.
    pub fn resolve(&self) -> Result<ModelConfig> {
        let config = ModelConfig {
            d_model: self.hidden_size,
            n_layers: self.num_hidden_layers,
            n_q_heads: self.num_attention_heads,
            n_kv_heads: self.num_kv_heads(),
            vocab_size: self.vocab_size,
            rope_theta: self.rope_theta,
            rope_dim: 0,
            rms_norm_eps: self.rms_norm_eps,
            use_gelu: self.hidden_act.starts_with("gelu"),
        };
        config.validate()?;
        Ok(config)
    }
}
