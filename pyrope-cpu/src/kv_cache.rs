//! Preallocated F16 key/value cache.
//!
//! Two contiguous stores of shape `[n_layers, max_seq_len,
//! n_kv_heads, head_dim]`, written once per (layer, position) and
//! read by attention for every position up to the current one. The
//! full allocation happens at construction:
//! `2 · n_layers · max_seq_len · n_kv_heads · head_dim · 2` bytes.

use half::f16;

use pyrope::dtype::DType;
use pyrope::tensor::TensorView;
use pyrope::{Error, Result};

/// Cache geometry. Storage dtype is always F16.
#[derive(Debug, Clone)]
pub struct KvCacheConfig {
    pub n_layers: usize,
    pub max_seq_len: usize,
    pub n_q_heads: usize,
    pub n_kv_heads: usize,
    pub head_dim: usize,
}

impl KvCacheConfig {
    /// Elements in one K (or V) store.
    #[must_use]
    pub fn store_numel(&self) -> usize {
        self.n_layers * self.max_seq_len * self.n_kv_heads * self.head_dim
    }
}

/// The per-context key/value store.
pub struct KvCache {
    cfg: KvCacheConfig,
    k: Vec<f16>,
    v: Vec<f16>,
}

impl KvCache {
    /// Allocate both stores up front.
    #[must_use]
    pub fn new(cfg: KvCacheConfig) -> Self {
        let numel = cfg.store_numel();
        log::debug!(
            "kv cache: {} layers x {} positions x {} kv heads x {} dims, f16, {} bytes",
            cfg.n_layers,
            cfg.max_seq_len,
            cfg.n_kv_heads,
            cfg.head_dim,
            2 * numel * DType::F16.size_in_bytes()
        );
        Self {
            k: vec![f16::ZERO; numel],
            v: vec![f16::ZERO; numel],
            cfg,
        }
    }

    #[must_use]
    pub fn config(&self) -> &KvCacheConfig {
        &self.cfg
    }

    /// Flat element offset of `(layer, pos, kv_head, 0)`.
    #[inline]
    #[must_use]
    pub fn offset(&self, layer: usize, pos: usize, kv_head: usize) -> usize {
        ((layer * self.cfg.max_seq_len + pos) * self.cfg.n_kv_heads + kv_head) * self.cfg.head_dim
    }

    /// Write K and V for `(layer, pos)`, converting F32 rows to F16
    /// (round-to-nearest-even). Rewriting an already-written position
    /// overwrites it; that is how prompt re-processing works.
    ///
    /// # Errors
    /// `OutOfRange` for a bad layer or position; `ShapeMismatch` when
    /// K or V is not `[n_kv_heads, head_dim]`.
    pub fn append(
        &mut self,
        layer: usize,
        pos: usize,
        k: &TensorView<'_>,
        v: &TensorView<'_>,
    ) -> Result<()> {
        if layer >= self.cfg.n_layers {
            return Err(Error::OutOfRange(format!(
                "layer {layer} of a {}-layer cache",
                self.cfg.n_layers
            )));
        }
        if pos >= self.cfg.max_seq_len {
            return Err(Error::OutOfRange(format!(
                "position {pos} in a cache of max_seq_len {}",
                self.cfg.max_seq_len
            )));
        }
        let expected = [self.cfg.n_kv_heads, self.cfg.head_dim];
        for t in [k, v] {
            if t.shape() != expected {
                return Err(Error::ShapeMismatch {
                    expected: expected.to_vec(),
                    got: t.shape().to_vec(),
                });
            }
        }

        let base = self.offset(layer, pos, 0);
        let row = self.cfg.n_kv_heads * self.cfg.head_dim;
        for i in 0..row {
            self.k[base + i] = f16::from_f32(k.read_f32(i));
            self.v[base + i] = f16::from_f32(v.read_f32(i));
        }
        Ok(())
    }

    /// F16 view over the whole K store,
    /// `[n_layers, max_seq_len, n_kv_heads, head_dim]`.
    #[must_use]
    pub fn k_view(&self) -> TensorView<'_> {
        self.store_view(&self.k)
    }

    /// F16 view over the whole V store.
    #[must_use]
    pub fn v_view(&self) -> TensorView<'_> {
        self.store_view(&self.v)
    }

    fn store_view<'a>(&'a self, store: &'a [f16]) -> TensorView<'a> {
        let shape = [
            self.cfg.n_layers,
            self.cfg.max_seq_len,
            self.cfg.n_kv_heads,
            self.cfg.head_dim,
        ];
        TensorView::new(bytemuck::cast_slice(store), DType::F16, &shape)
            .expect("cache store length matches its shape")
    }

    /// Raw K elements, indexed with [`Self::offset`].
    #[must_use]
    pub fn k_data(&self) -> &[f16] {
        &self.k
    }

    /// Raw V elements.
    #[must_use]
    pub fn v_data(&self) -> &[f16] {
        &self.v
    }
}
