// Text + image feature fusion classifier
use std::fmt;

use candle::{DType, Module, Tensor, D};
use candle_nn::{Func, Linear, VarBuilder};
use candle_transformers::models::resnet;
use serde::{Deserialize, Serialize};

use super::bert::{BertPooled, EncoderConfig};

pub const TEXT_FEATURES: usize = 256;
pub const IMAGE_FEATURES: usize = 256;
pub const BACKBONE_FEATURES: usize = 2048;
pub const FUSED_FEATURES: usize = TEXT_FEATURES + IMAGE_FEATURES;
pub const NUM_LABELS: usize = 6;

/// Serialized through [`Label::as_str`], so the wire names live in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Label {
    Real,
    Fake,
    Satire,
    Clickbait,
    Bias,
    Conspiracy,
}

impl Label {
    /// In logit order.
    pub const ALL: [Label; NUM_LABELS] = [
        Label::Real,
        Label::Fake,
        Label::Satire,
        Label::Clickbait,
        Label::Bias,
        Label::Conspiracy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Real => "real",
            Label::Fake => "fake",
            Label::Satire => "satire",
            Label::Clickbait => "clickbait",
            Label::Bias => "bias",
            Label::Conspiracy => "conspiracy",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Label> for &'static str {
    fn from(label: Label) -> Self {
        label.as_str()
    }
}

impl TryFrom<String> for Label {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Label::ALL
            .into_iter()
            .find(|label| label.as_str() == name)
            .ok_or_else(|| format!("unknown label `{}`", name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f32,
    pub probabilities: [f32; NUM_LABELS],
}

impl Prediction {
    fn from_probabilities(probabilities: [f32; NUM_LABELS]) -> Self {
        // First maximum wins on ties.
        let mut best = 0;
        for (index, &p) in probabilities.iter().enumerate().skip(1) {
            if p > probabilities[best] {
                best = index;
            }
        }
        Self {
            label: Label::ALL[best],
            confidence: probabilities[best],
            probabilities,
        }
    }
}

/// BERT text tower and a frozen ResNet image tower, each projected to 256
/// features, concatenated and scored by a two-layer head.
///
/// Without an image the image slot is filled with zeros, so text-only inference
/// runs through the same head rather than a separately trained one.
pub struct FusionClassifier {
    bert: BertPooled,
    text_fc: Linear,
    backbone: Func<'static>,
    image_fc: Linear,
    hidden: Linear,
    output: Linear,
}

impl FusionClassifier {
    /// Builds the classifier around an arbitrary image backbone that maps a
    /// `batch x 3 x 224 x 224` tensor to `batch x 2048` features.
    pub fn new(
        vb: VarBuilder,
        config: &EncoderConfig,
        backbone: Func<'static>,
    ) -> candle::Result<Self> {
        let bert = BertPooled::load(vb.pp("bert"), config)?;
        let text_fc = candle_nn::linear(config.hidden_size, TEXT_FEATURES, vb.pp("text_fc"))?;
        let image_fc = candle_nn::linear(BACKBONE_FEATURES, IMAGE_FEATURES, vb.pp("image_fc"))?;
        // classifier.0 and classifier.2 are the ReLUs
        let hidden = candle_nn::linear(FUSED_FEATURES, 256, vb.pp("classifier.1"))?;
        let output = candle_nn::linear(256, NUM_LABELS, vb.pp("classifier.3"))?;
        Ok(Self {
            bert,
            text_fc,
            backbone,
            image_fc,
            hidden,
            output,
        })
    }

    pub fn with_resnet50(vb: VarBuilder<'static>, config: &EncoderConfig) -> candle::Result<Self> {
        let backbone = resnet::resnet50_no_final_layer(vb.pp("resnet"))?;
        Self::new(vb, config, backbone)
    }

    pub fn text_features(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle::Result<Tensor> {
        let pooled = self.bert.forward(input_ids, attention_mask)?;
        self.text_fc.forward(&pooled)
    }

    pub fn image_features(&self, image: &Tensor) -> candle::Result<Tensor> {
        let features = self.backbone.forward(image)?;
        self.image_fc.forward(&features)
    }

    /// Unnormalized scores, `batch x 6`.
    pub fn logits(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        image: Option<&Tensor>,
    ) -> candle::Result<Tensor> {
        let text = self.text_features(input_ids, attention_mask)?;
        let image = match image {
            Some(image) => self.image_features(image)?,
            None => Tensor::zeros((text.dim(0)?, IMAGE_FEATURES), text.dtype(), text.device())?,
        };
        let fused = Tensor::cat(&[&text, &image], D::Minus1)?;
        let hidden = self.hidden.forward(&fused.relu()?)?.relu()?;
        self.output.forward(&hidden)
    }

    /// Scores a single-item batch.
    pub fn classify(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        image: Option<&Tensor>,
    ) -> candle::Result<Prediction> {
        let logits = self.logits(input_ids, attention_mask, image)?;
        let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)?
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;
        let probabilities: [f32; NUM_LABELS] = probabilities.try_into().map_err(|p: Vec<f32>| {
            candle::Error::Msg(format!("expected {} scores, got {}", NUM_LABELS, p.len()))
        })?;
        Ok(Prediction::from_probabilities(probabilities))
    }
}
