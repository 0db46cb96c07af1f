//! Core types and safetensors I/O for the pyrope decode engine.
//!
//! pyrope is a single-request, CPU-only inference engine for
//! decoder-only models in the Mistral/LLaMA family (pre-norm, RoPE,
//! grouped-query attention, SwiGLU). This crate holds the pieces the
//! kernels build on:
//!
//! - [`dtype`]: storage types and scalar element access
//! - [`tensor`]: borrowed views and owning tensors
//! - [`safetensors`]: the memory-mapped container reader
//! - [`config`]: model geometry and `config.json` parsing
//! - [`weights`] / [`loader`]: per-layer weight binding over the
//!   mapping
//!
//! The numeric kernels and the decode runtime live in `pyrope-cpu`.

#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

pub mod config;
pub mod dtype;
pub mod error;
pub mod loader;
pub mod safetensors;
pub mod tensor;
pub mod weights;

pub use config::{ModelConfig, PretrainedConfig};
pub use dtype::DType;
pub use error::{Error, Result};
pub use loader::load_model;
pub use safetensors::{SafeTensorInfo, SafeTensorReader};
pub use tensor::{Tensor, TensorView};
pub use weights::{AttentionWeights, LayerWeights, MlpWeights, ModelWeights, WeightNaming};
