// Shared state handed to every worker
use std::sync::Arc;

use candle::Device;

use crate::fetch::ImageFetcher;
use crate::models::MultimodalModel;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(model: MultimodalModel, fetcher: ImageFetcher) -> Self {
        Self {
            pipeline: Pipeline::new(Arc::new(model), fetcher),
        }
    }

    pub fn with_timeout(
        model: MultimodalModel,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Self> {
        let device: Device = model.device().clone();
        let fetcher = ImageFetcher::new(timeout, device)?;
        Ok(Self::new(model, fetcher))
    }
}
