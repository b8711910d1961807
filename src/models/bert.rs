// BERT text tower: encoder config and tokenizer retrieval, pooled sentence output
use std::path::{Path, PathBuf};

use anyhow::Context;
use candle::{IndexOp, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use serde::Deserialize;

use super::text::TextEncoder;

/// BERT hyper-parameters plus the hidden width, which the text projection needs.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub bert: Config,
    pub hidden_size: usize,
}

#[derive(Deserialize)]
struct HiddenSize {
    hidden_size: usize,
}

impl EncoderConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let bert: Config = serde_json::from_str(json)?;
        let HiddenSize { hidden_size } = serde_json::from_str(json)?;
        Ok(Self { bert, hidden_size })
    }
}

/// Where the tokenizer and encoder config come from. Local files win over the hub.
#[derive(Debug, Clone)]
pub struct EncoderSource {
    pub repo: String,
    pub revision: String,
    pub tokenizer_file: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

impl EncoderSource {
    pub fn load(&self) -> anyhow::Result<(TextEncoder, EncoderConfig)> {
        let files = (&self.tokenizer_file, &self.config_file);
        let (tokenizer_filename, config_filename) = match files {
            (Some(tokenizer), Some(config)) => (tokenizer.clone(), config.clone()),
            (tokenizer, config) => {
                log::info!("fetching encoder files from {}@{}", self.repo, self.revision);
                let repo = Repo::with_revision(
                    self.repo.clone(),
                    RepoType::Model,
                    self.revision.clone(),
                );
                let api = Api::new()?.repo(repo);
                let tokenizer = match tokenizer {
                    Some(path) => path.clone(),
                    None => api.get("tokenizer.json")?,
                };
                let config = match config {
                    Some(path) => path.clone(),
                    None => api.get("config.json")?,
                };
                (tokenizer, config)
            }
        };

        let config = read_config(&config_filename)?;
        let tokenizer = TextEncoder::from_file(&tokenizer_filename)
            .with_context(|| format!("loading tokenizer from {}", tokenizer_filename.display()))?;
        Ok((tokenizer, config))
    }
}

fn read_config(path: &Path) -> anyhow::Result<EncoderConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading encoder config {}", path.display()))?;
    EncoderConfig::from_json(&json)
}

/// BERT encoder followed by the standard pooler (`tanh(dense(h_cls))`).
pub struct BertPooled {
    model: BertModel,
    pooler: Linear,
}

impl BertPooled {
    /// `vb` must point at the `bert` prefix of the checkpoint.
    pub fn load(vb: VarBuilder, config: &EncoderConfig) -> candle::Result<Self> {
        let model = BertModel::load(vb.clone(), &config.bert)?;
        let pooler = candle_nn::linear(
            config.hidden_size,
            config.hidden_size,
            vb.pp("pooler").pp("dense"),
        )?;
        Ok(Self { model, pooler })
    }

    /// Returns a `batch x hidden` pooled representation.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> candle::Result<Tensor> {
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self
            .model
            .forward(input_ids, &token_type_ids, Some(attention_mask))?;
        let cls = hidden.i((.., 0))?;
        self.pooler.forward(&cls)?.tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_keeps_hidden_size_alongside_bert_settings() {
        let json = r#"{
            "vocab_size": 30522,
            "hidden_size": 768,
            "num_hidden_layers": 12,
            "num_attention_heads": 12,
            "intermediate_size": 3072,
            "hidden_act": "gelu",
            "hidden_dropout_prob": 0.1,
            "max_position_embeddings": 512,
            "type_vocab_size": 2,
            "initializer_range": 0.02,
            "layer_norm_eps": 1e-12,
            "pad_token_id": 0,
            "model_type": "bert"
        }"#;
        let config = EncoderConfig::from_json(json).unwrap();
        assert_eq!(config.hidden_size, 768);
    }

    #[test]
    fn local_files_skip_the_hub() {
        let source = EncoderSource {
            repo: "bert-base-uncased".into(),
            revision: "main".into(),
            tokenizer_file: Some(PathBuf::from("/nonexistent/tokenizer.json")),
            config_file: Some(PathBuf::from("/nonexistent/config.json")),
        };
        let err = source.load().err().unwrap();
        assert!(format!("{:#}", err).contains("/nonexistent/config.json"));
    }
}
