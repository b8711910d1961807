// Request orchestration: encode, fetch, classify
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};
use crate::fetch::{FetchOutcome, ImageFetcher};
use crate::models::fusion::Label;
use crate::models::MultimodalModel;

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationRequest {
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ClassificationRequest {
    pub fn validate(&self) -> Result<()> {
        if self.text.is_empty() {
            return Err(ServiceError::Validation("text must not be empty".to_string()));
        }
        Ok(())
    }

    /// The image url, if one was given and is not blank.
    pub fn image_url(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "text-only")]
    TextOnly,
    #[serde(rename = "multimodal")]
    Multimodal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Label,
    pub confidence: f32,
    pub mode: Mode,
}

#[derive(Clone)]
pub struct Pipeline {
    model: Arc<MultimodalModel>,
    fetcher: ImageFetcher,
}

impl Pipeline {
    pub fn new(model: Arc<MultimodalModel>, fetcher: ImageFetcher) -> Self {
        Self { model, fetcher }
    }

    pub async fn predict(&self, request: ClassificationRequest) -> Result<PredictionResult> {
        request.validate()?;

        let image = match request.image_url() {
            Some(url) => match self.fetcher.fetch(url).await {
                FetchOutcome::Image(image) => Some(image),
                FetchOutcome::Unavailable(reason) => {
                    log::warn!("image {} unavailable, using text-only mode: {}", url, reason);
                    None
                }
            },
            None => {
                log::debug!("no image url provided, using text-only mode");
                None
            }
        };
        let mode = if image.is_some() {
            Mode::Multimodal
        } else {
            Mode::TextOnly
        };

        let model = Arc::clone(&self.model);
        let text = request.text;
        let prediction = tokio::task::spawn_blocking(move || {
            let encoding = model.encode(&text)?;
            model.predict(&encoding, image.as_ref())
        })
        .await??;

        log::info!(
            "prediction: {} ({:.4}), mode {:?}",
            prediction.label,
            prediction.confidence,
            mode
        );
        Ok(PredictionResult {
            label: prediction.label,
            confidence: prediction.confidence,
            mode,
        })
    }
}
