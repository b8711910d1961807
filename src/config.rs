// Command line and environment configuration
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::models::bert::EncoderSource;

/// Checkpoint locations tried in order when `MODEL_PATH` is not set.
pub const CHECKPOINT_SEARCH_PATHS: &[&str] = &[
    "./models/multimodal_model.safetensors",
    "./models/multimodal_model.pth",
    "./app/models/multimodal_model.pth",
    "/app/app/models/multimodal_model.pth",
];

#[derive(Parser, Debug, Clone)]
#[command(name = "news_classifier", about = "Multimodal news classification API")]
pub struct ServerConfig {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Trained checkpoint (.safetensors, or a PyTorch .pth state dict).
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Hub repository providing tokenizer.json and config.json.
    #[arg(long, env = "ENCODER_REPO", default_value = "bert-base-uncased")]
    pub encoder_repo: String,

    #[arg(long, default_value = "main")]
    pub encoder_revision: String,

    #[arg(long, env = "TOKENIZER_FILE")]
    pub tokenizer_file: Option<PathBuf>,

    #[arg(long, env = "ENCODER_CONFIG_FILE")]
    pub encoder_config_file: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    pub image_timeout_secs: u64,

    /// HTTP worker threads, defaults to the number of physical cores.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Run on CPU even if CUDA is available.
    #[arg(long)]
    pub cpu: bool,
}

impl ServerConfig {
    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }

    pub fn encoder_source(&self) -> EncoderSource {
        EncoderSource {
            repo: self.encoder_repo.clone(),
            revision: self.encoder_revision.clone(),
            tokenizer_file: self.tokenizer_file.clone(),
            config_file: self.encoder_config_file.clone(),
        }
    }

    pub fn checkpoint(&self) -> anyhow::Result<PathBuf> {
        let candidates: Vec<PathBuf> = CHECKPOINT_SEARCH_PATHS.iter().map(PathBuf::from).collect();
        resolve_checkpoint(self.model_path.as_deref(), &candidates)
    }
}

/// An explicit path is returned as-is, even if missing, so the loader reports
/// the path the operator asked for. Otherwise the first existing candidate wins.
pub fn resolve_checkpoint(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    candidates
        .iter()
        .find(|path| path.exists())
        .cloned()
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no model checkpoint found; set MODEL_PATH or place one at {:?}",
                candidates
            )
        })
}
