//! Model directory loading.
//!
//! A model directory holds a `config.json` plus a single-file
//! checkpoint named `consolidated.safetensors` (Mistral releases) or
//! `model.safetensors` (HuggingFace exports).

use std::path::Path;
use std::sync::Arc;

use crate::config::{ModelConfig, PretrainedConfig};
use crate::safetensors::SafeTensorReader;
use crate::weights::ModelWeights;
use crate::{Error, Result};

const CHECKPOINT_FILES: [&str; 2] = ["consolidated.safetensors", "model.safetensors"];

/// Load a model directory into a validated config and weight binding.
///
/// # Errors
/// Propagates config-parse, container and binding failures; a
/// directory with no recognized checkpoint file is `Io` (not found).
pub fn load_model(dir: impl AsRef<Path>) -> Result<(ModelConfig, ModelWeights)> {
    let dir = dir.as_ref();
    let pretrained = PretrainedConfig::from_file(dir.join("config.json"))?;
    let cfg = pretrained.resolve()?;

    let checkpoint = CHECKPOINT_FILES
        .iter()
        .map(|f| dir.join(f))
        .find(|p| p.exists())
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "no consolidated.safetensors or model.safetensors in {}",
                    dir.display()
                ),
            ))
        })?;

    let reader = Arc::new(SafeTensorReader::open(&checkpoint)?);
    let tensor_count = reader.names().len();
    let weights = ModelWeights::bind(reader, &cfg, pretrained.tie_word_embeddings)?;

    log::info!(
        "loaded {} ({tensor_count} tensors, {} layers, d_model={}, vocab={})",
        checkpoint.display(),
        cfg.n_layers,
        cfg.d_model,
        cfg.vocab_size
    );
    Ok((cfg, weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_model_missing_checkpoint() {
        let dir = std::env::temp_dir().join("pyrope_test_empty_model");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.json"),
            r#"{
                "vocab_size": 10,
                "hidden_size": 8,
                "intermediate_size": 16,
                "num_hidden_layers": 1,
                "num_attention_heads": 2,
                "num_key_value_heads": 1
            }"#,
        )
        .unwrap();

        assert!(matches!(load_model(&dir), Err(Error::Io(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_model_roundtrip() {
        let dir = std::env::temp_dir().join("pyrope_test_model_dir");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.json"),
            r#"{
                "vocab_size": 10,
                "hidden_size": 8,
                "intermediate_size": 16,
                "num_hidden_layers": 1,
                "num_attention_heads": 2,
                "num_key_value_heads": 1,
                "tie_word_embeddings": true
            }"#,
        )
        .unwrap();

        // Minimal tied-head consolidated checkpoint, all zeros.
        let d = 8usize;
        let ff = 16usize;
        let tensors: Vec<(String, Vec<usize>)> = vec![
            ("tok_embeddings.weight".into(), vec![10, d]),
            ("norm.weight".into(), vec![d]),
            ("layers.0.attention.wq.weight".into(), vec![d, d]),
            ("layers.0.attention.wk.weight".into(), vec![4, d]),
            ("layers.0.attention.wv.weight".into(), vec![4, d]),
            ("layers.0.attention.wo.weight".into(), vec![d, d]),
            ("layers.0.feed_forward.w1.weight".into(), vec![ff, d]),
            ("layers.0.feed_forward.w3.weight".into(), vec![ff, d]),
            ("layers.0.feed_forward.w2.weight".into(), vec![d, ff]),
            ("layers.0.attention_norm.weight".into(), vec![d]),
            ("layers.0.ffn_norm.weight".into(), vec![d]),
        ];
        let mut header = serde_json::Map::new();
        let mut data = Vec::new();
        for (name, shape) in &tensors {
            let begin = data.len();
            data.extend(std::iter::repeat(0u8).take(shape.iter().product::<usize>() * 4));
            header.insert(
                name.clone(),
                serde_json::json!({
                    "dtype": "F32",
                    "shape": shape,
                    "data_offsets": [begin, data.len()],
                }),
            );
        }
        let header_bytes = serde_json::to_vec(&header).unwrap();
        let mut f = std::fs::File::create(dir.join("consolidated.safetensors")).unwrap();
        f.write_all(&(header_bytes.len() as u64).to_le_bytes())
            .unwrap();
        f.write_all(&header_bytes).unwrap();
        f.write_all(&data).unwrap();
        drop(f);

        let (cfg, weights) = load_model(&dir).unwrap();
        assert_eq!(cfg.d_model, 8);
        assert_eq!(cfg.n_kv_heads, 1);
        assert!(weights.tied_lm_head());
        assert_eq!(weights.token_embeddings().unwrap().shape(), &[10, 8]);

        std::fs::remove_dir_all(&dir).ok();
    }
}
