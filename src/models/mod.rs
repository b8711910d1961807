// Model loading and the process-wide multimodal model
pub mod bert;
pub mod fusion;
pub mod text;

use std::path::Path;

use anyhow::Context;
use candle::Device;
use candle_nn::VarBuilder;
use candle_transformers::models::bert::DTYPE;

use crate::error::Result;
use crate::fetch::ImageTensor;
use bert::EncoderSource;
use fusion::{FusionClassifier, Prediction};
use text::{TextEncoder, TextEncoding};

/// Tokenizer and classifier, loaded once at startup and only read afterwards.
pub struct MultimodalModel {
    encoder: TextEncoder,
    classifier: FusionClassifier,
    device: Device,
}

impl MultimodalModel {
    pub fn new(encoder: TextEncoder, classifier: FusionClassifier, device: Device) -> Self {
        Self {
            encoder,
            classifier,
            device,
        }
    }

    /// Loads the tokenizer and encoder config from `source` and the trained
    /// weights from `checkpoint`.
    pub fn load(checkpoint: &Path, source: &EncoderSource, device: Device) -> anyhow::Result<Self> {
        let (encoder, config) = source.load()?;
        log::info!("loading checkpoint from {}", checkpoint.display());
        let vb = checkpoint_var_builder(checkpoint, &device)?;
        let classifier = FusionClassifier::with_resnet50(vb, &config)
            .with_context(|| {
                format!("checkpoint {} does not match the model", checkpoint.display())
            })?;
        log::info!("model loaded on {:?}", device);
        Ok(Self::new(encoder, classifier, device))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn encode(&self, text: &str) -> Result<TextEncoding> {
        self.encoder.encode(text)
    }

    pub fn predict(
        &self,
        encoding: &TextEncoding,
        image: Option<&ImageTensor>,
    ) -> Result<Prediction> {
        let (input_ids, attention_mask) = encoding.to_tensors(&self.device)?;
        let image = image.map(ImageTensor::tensor);
        Ok(self.classifier.classify(&input_ids, &attention_mask, image)?)
    }
}

/// PyTorch state dicts (`.pth`/`.pt`) are read through the pickle loader,
/// everything else is memory-mapped as safetensors.
fn checkpoint_var_builder(path: &Path, device: &Device) -> anyhow::Result<VarBuilder<'static>> {
    if !path.exists() {
        anyhow::bail!("model checkpoint not found at {}", path.display());
    }
    let is_pickle = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("pth") | Some("pt")
    );
    let vb = if is_pickle {
        VarBuilder::from_pth(path, DTYPE, device)?
    } else {
        unsafe { VarBuilder::from_mmaped_safetensors(&[path], DTYPE, device)? }
    };
    Ok(vb)
}

pub fn select_device(cpu: bool) -> anyhow::Result<Device> {
    if cpu {
        return Ok(Device::Cpu);
    }
    Ok(Device::cuda_if_available(0)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_checkpoint_is_reported_with_its_path() {
        let path = Path::new("/nonexistent/multimodal_model.pth");
        let err = checkpoint_var_builder(path, &Device::Cpu).err().unwrap();
        assert!(err.to_string().contains("/nonexistent/multimodal_model.pth"));
    }

    #[test]
    fn cpu_flag_forces_cpu() {
        assert!(matches!(select_device(true).unwrap(), Device::Cpu));
    }
}
