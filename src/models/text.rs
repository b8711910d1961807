// Tokenizer wrapper producing fixed-length BERT inputs
use candle::{Device, Tensor};
use tokenizers::{PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use crate::error::{Result, ServiceError};

pub const MAX_TOKENS: usize = 128;
const PAD_TOKEN: &str = "[PAD]";

/// Input ids and attention mask for a single text, always [`MAX_TOKENS`] long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEncoding {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

impl TextEncoding {
    /// Returns `(input_ids, attention_mask)` as `1 x MAX_TOKENS` tensors.
    pub fn to_tensors(&self, device: &Device) -> candle::Result<(Tensor, Tensor)> {
        let input_ids = Tensor::new(self.input_ids.as_slice(), device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(self.attention_mask.as_slice(), device)?.unsqueeze(0)?;
        Ok((input_ids, attention_mask))
    }
}

pub struct TextEncoder {
    tokenizer: Tokenizer,
}

impl TextEncoder {
    /// Configures `tokenizer` to truncate and right-pad to [`MAX_TOKENS`].
    pub fn new(mut tokenizer: Tokenizer) -> anyhow::Result<Self> {
        let pad_id = tokenizer.token_to_id(PAD_TOKEN).unwrap_or(0);
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(MAX_TOKENS),
            direction: PaddingDirection::Right,
            pad_id,
            pad_token: PAD_TOKEN.to_string(),
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(anyhow::Error::msg)?;
        Ok(Self { tokenizer })
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(anyhow::Error::msg)?;
        Self::new(tokenizer)
    }

    pub fn encode(&self, text: &str) -> Result<TextEncoding> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ServiceError::Tokenization(e.to_string()))?;

        let input_ids = encoding.get_ids().to_vec();
        let attention_mask = encoding.get_attention_mask().to_vec();
        if input_ids.len() != MAX_TOKENS || attention_mask.len() != MAX_TOKENS {
            return Err(ServiceError::Tokenization(format!(
                "expected {} tokens, tokenizer produced {}",
                MAX_TOKENS,
                input_ids.len()
            )));
        }
        Ok(TextEncoding {
            input_ids,
            attention_mask,
        })
    }
}
