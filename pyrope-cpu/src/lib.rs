//! CPU decode engine for pyrope.
//!
//! A single-request, single-threaded forward path for Mistral/LLaMA
//! family decoder models: dtype-aware scalar kernels ([`ops`]), the
//! preallocated F16 [`kv_cache`], grouped-query [`attention`], the
//! gated [`mlp`] and the per-token [`runtime`] pipeline.
//!
//! All compute accumulates in f32; F16/BF16/I8 weights are decoded on
//! load inside the kernels. This engine favours clarity over
//! throughput: there is no batching and no intra-kernel threading.

#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod attention;
pub mod kv_cache;
pub mod logits;
pub mod mlp;
pub mod ops;
pub mod runtime;

pub use attention::{attention_forward, AttentionConfig};
pub use kv_cache::{KvCache, KvCacheConfig};
pub use logits::argmax;
pub use mlp::{mlp_forward, MlpConfig};
pub use runtime::RuntimeCtx;
