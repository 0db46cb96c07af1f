//! The numeric kernel library.
//!
//! Every kernel accepts views of any stored dtype, validates shapes
//! on entry, accumulates in f32 and returns owned F32 tensors.

pub mod activation;
pub mod elementwise;
pub mod embed;
pub mod linear;
pub mod matmul;
pub mod norm;
pub mod rope;
pub mod softmax;

pub use activation::{gelu, silu};
pub use elementwise::{add, add_inplace, mul};
pub use embed::embedding_row;
pub use linear::linear;
pub use matmul::matmul;
pub use norm::{rms_norm, DEFAULT_EPS};
pub use rope::{apply_rope, RopeTable};
pub use softmax::softmax;
