//! Shared helpers for decode integration tests.
//!
//! Builds tiny random models on disk as real safetensors checkpoints
//! so the tests exercise the full mmap → bind → decode path.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One tensor to serialize: name, shape, f32 data.
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, shape: &[usize], data: Vec<f32>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(numel, data.len(), "tensor data does not match shape");
        Self {
            name: name.into(),
            shape: shape.to_vec(),
            data,
        }
    }
}

/// Serialize `tensors` as a single-file safetensors container.
pub fn write_safetensors(path: &Path, tensors: &[TensorSpec]) {
    let mut header = serde_json::Map::new();
    let mut data: Vec<u8> = Vec::new();
    for t in tensors {
        let begin = data.len();
        data.extend_from_slice(bytemuck::cast_slice(&t.data));
        header.insert(
            t.name.clone(),
            serde_json::json!({
                "dtype": "F32",
                "shape": t.shape,
                "data_offsets": [begin, data.len()],
            }),
        );
    }
    let header_bytes = serde_json::to_vec(&header).expect("serialize header");
    let mut f = std::fs::File::create(path).expect("create safetensors file");
    f.write_all(&(header_bytes.len() as u64).to_le_bytes())
        .expect("write header length");
    f.write_all(&header_bytes).expect("write header");
    f.write_all(&data).expect("write data");
}

/// Geometry for the test models.
#[derive(Clone, Copy)]
pub struct TinyGeometry {
    pub d_model: usize,
    pub n_layers: usize,
    pub n_q_heads: usize,
    pub n_kv_heads: usize,
    pub vocab_size: usize,
    pub d_ff: usize,
}

/// The small-model geometry the decode properties are stated for.
pub fn tiny_geometry() -> TinyGeometry {
    TinyGeometry {
        d_model: 32,
        n_layers: 2,
        n_q_heads: 4,
        n_kv_heads: 2,
        vocab_size: 256,
        d_ff: 64,
    }
}

fn rand_data(rng: &mut StdRng, shape: &[usize]) -> Vec<f32> {
    let numel: usize = shape.iter().product();
    (0..numel).map(|_| rng.gen_range(-0.08f32..0.08)).collect()
}

fn gain_data(rng: &mut StdRng, n: usize) -> Vec<f32> {
    (0..n).map(|_| 1.0 + rng.gen_range(-0.05f32..0.05)).collect()
}

/// Write `config.json` for `g`.
pub fn write_config(dir: &Path, g: TinyGeometry, tie_word_embeddings: bool) {
    let config = serde_json::json!({
        "vocab_size": g.vocab_size,
        "hidden_size": g.d_model,
        "intermediate_size": g.d_ff,
        "num_hidden_layers": g.n_layers,
        "num_attention_heads": g.n_q_heads,
        "num_key_value_heads": g.n_kv_heads,
        "rope_theta": 10000.0,
        "rms_norm_eps": 1e-5,
        "hidden_act": "silu",
        "tie_word_embeddings": tie_word_embeddings,
    });
    std::fs::write(
        dir.join("config.json"),
        serde_json::to_string_pretty(&config).unwrap(),
    )
    .expect("write config.json");
}

/// Seeded random model with HuggingFace tensor names, written as
/// `model.safetensors` next to its `config.json`.
pub fn write_hf_model(dir: &Path, g: TinyGeometry, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let d = g.d_model;
    let kv_dim = g.n_kv_heads * (d / g.n_q_heads);

    let mut tensors = vec![
        TensorSpec::new(
            "model.embed_tokens.weight",
            &[g.vocab_size, d],
            rand_data(&mut rng, &[g.vocab_size, d]),
        ),
        TensorSpec::new(
            "lm_head.weight",
            &[g.vocab_size, d],
            rand_data(&mut rng, &[g.vocab_size, d]),
        ),
        TensorSpec::new("model.norm.weight", &[d], gain_data(&mut rng, d)),
    ];
    for l in 0..g.n_layers {
        let p = format!("model.layers.{l}.");
        tensors.push(TensorSpec::new(
            format!("{p}self_attn.q_proj.weight"),
            &[d, d],
            rand_data(&mut rng, &[d, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}self_attn.k_proj.weight"),
            &[kv_dim, d],
            rand_data(&mut rng, &[kv_dim, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}self_attn.v_proj.weight"),
            &[kv_dim, d],
            rand_data(&mut rng, &[kv_dim, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}self_attn.o_proj.weight"),
            &[d, d],
            rand_data(&mut rng, &[d, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}mlp.gate_proj.weight"),
            &[g.d_ff, d],
            rand_data(&mut rng, &[g.d_ff, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}mlp.up_proj.weight"),
            &[g.d_ff, d],
            rand_data(&mut rng, &[g.d_ff, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}mlp.down_proj.weight"),
            &[d, g.d_ff],
            rand_data(&mut rng, &[d, g.d_ff]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}input_layernorm.weight"),
            &[d],
            gain_data(&mut rng, d),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}post_attention_layernorm.weight"),
            &[d],
            gain_data(&mut rng, d),
        ));
    }

    write_config(dir, g, false);
    write_safetensors(&dir.join("model.safetensors"), &tensors);
}

/// Seeded random model with Mistral consolidated names, written as
/// `consolidated.safetensors`. `with_head` and `with_w3` control
/// whether `output.weight` / the up projections are present.
pub fn write_consolidated_model(
    dir: &Path,
    g: TinyGeometry,
    seed: u64,
    with_head: bool,
    with_w3: bool,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    let d = g.d_model;
    let kv_dim = g.n_kv_heads * (d / g.n_q_heads);

    let mut tensors = vec![
        TensorSpec::new(
            "tok_embeddings.weight",
            &[g.vocab_size, d],
            rand_data(&mut rng, &[g.vocab_size, d]),
        ),
        TensorSpec::new("norm.weight", &[d], gain_data(&mut rng, d)),
    ];
    if with_head {
        tensors.push(TensorSpec::new(
            "output.weight",
            &[g.vocab_size, d],
            rand_data(&mut rng, &[g.vocab_size, d]),
        ));
    }
    for l in 0..g.n_layers {
        let p = format!("layers.{l}.");
        tensors.push(TensorSpec::new(
            format!("{p}attention.wq.weight"),
            &[d, d],
            rand_data(&mut rng, &[d, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}attention.wk.weight"),
            &[kv_dim, d],
            rand_data(&mut rng, &[kv_dim, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}attention.wv.weight"),
            &[kv_dim, d],
            rand_data(&mut rng, &[kv_dim, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}attention.wo.weight"),
            &[d, d],
            rand_data(&mut rng, &[d, d]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}feed_forward.w1.weight"),
            &[g.d_ff, d],
            rand_data(&mut rng, &[g.d_ff, d]),
        ));
        if with_w3 {
            tensors.push(TensorSpec::new(
                format!("{p}feed_forward.w3.weight"),
                &[g.d_ff, d],
                rand_data(&mut rng, &[g.d_ff, d]),
            ));
        }
        tensors.push(TensorSpec::new(
            format!("{p}feed_forward.w2.weight"),
            &[d, g.d_ff],
            rand_data(&mut rng, &[d, g.d_ff]),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}attention_norm.weight"),
            &[d],
            gain_data(&mut rng, d),
        ));
        tensors.push(TensorSpec::new(
            format!("{p}ffn_norm.weight"),
            &[d],
            gain_data(&mut rng, d),
        ));
    }

    write_config(dir, g, !with_head);
    write_safetensors(&dir.join("consolidated.safetensors"), &tensors);
}
