//! Multimodal news classification service.
//!
//! A `POST /predict` request carries a text and an optional image url. The
//! text is encoded with BERT, the image (when it can be fetched) with
//! ResNet-50, and the fused features are scored over six labels. An image
//! that cannot be fetched or decoded never fails a request; it only switches
//! the prediction to text-only mode.

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod state;

pub use error::{Result, ServiceError};
pub use models::fusion::{Label, Prediction};
pub use models::MultimodalModel;
pub use pipeline::{ClassificationRequest, Mode, Pipeline, PredictionResult};
pub use state::AppState;
