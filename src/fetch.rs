// Remote image retrieval and ImageNet preprocessing
use std::fmt;
use std::time::Duration;

use candle::{DType, Device, Tensor};
use image::imageops::FilterType;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};

pub const IMAGE_SIZE: usize = 224;
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Bodies larger than this are not downloaded.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

// Some hosts refuse requests without a browser user agent.
const USER_AGENT: &str = "Mozilla/5.0";

/// A normalized `1x3x224x224` image batch, ready for the ResNet backbone.
#[derive(Debug, Clone)]
pub struct ImageTensor(Tensor);

impl ImageTensor {
    pub fn tensor(&self) -> &Tensor {
        &self.0
    }
}

/// Why an image could not be used. None of these fail the request.
#[derive(Debug)]
pub enum Unavailable {
    InvalidUrl(String),
    Request(reqwest::Error),
    Status(StatusCode),
    NotAnImage(String),
    TooLarge(usize),
    Decode(String),
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(msg) => write!(f, "invalid image url: {}", msg),
            Self::Request(err) => write!(f, "request failed: {}", err),
            Self::Status(status) => write!(f, "unexpected status {}", status),
            Self::NotAnImage(content_type) => {
                write!(f, "content type is not an image: {:?}", content_type)
            }
            Self::TooLarge(limit) => write!(f, "image body exceeds {} bytes", limit),
            Self::Decode(msg) => write!(f, "could not decode image: {}", msg),
        }
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Image(ImageTensor),
    Unavailable(Unavailable),
}

#[derive(Clone)]
pub struct ImageFetcher {
    client: Client,
    device: Device,
    max_bytes: usize,
}

impl ImageFetcher {
    pub fn new(timeout: Duration, device: Device) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            device,
            max_bytes: MAX_IMAGE_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Downloads and preprocesses `url`. Every failure is folded into
    /// [`FetchOutcome::Unavailable`]; this never returns an error.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let bytes = match self.download(url).await {
            Ok(bytes) => bytes,
            Err(reason) => return FetchOutcome::Unavailable(reason),
        };
        log::debug!("downloaded {} bytes from {}", bytes.len(), url);

        let device = self.device.clone();
        match tokio::task::spawn_blocking(move || preprocess(&bytes, &device)).await {
            Ok(Ok(image)) => FetchOutcome::Image(image),
            Ok(Err(reason)) => FetchOutcome::Unavailable(reason),
            Err(join_error) => {
                FetchOutcome::Unavailable(Unavailable::Decode(join_error.to_string()))
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, Unavailable> {
        let url = Url::parse(url).map_err(|e| Unavailable::InvalidUrl(e.to_string()))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Unavailable::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Unavailable::Status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_image_content_type(&content_type) {
            return Err(Unavailable::NotAnImage(content_type));
        }

        self.read_capped(response).await
    }

    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Vec<u8>, Unavailable> {
        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(Unavailable::TooLarge(self.max_bytes));
            }
        }
        // Content-Length may be absent or wrong, so the cap is enforced while reading too.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(Unavailable::Request)? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(Unavailable::TooLarge(self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

pub fn is_image_content_type(content_type: &str) -> bool {
    content_type.contains("image")
}

/// Decodes `bytes`, resizes to 224x224 without cropping and applies the
/// ImageNet per-channel normalization.
pub fn preprocess(bytes: &[u8], device: &Device) -> Result<ImageTensor, Unavailable> {
    let image = image::load_from_memory(bytes).map_err(|e| Unavailable::Decode(e.to_string()))?;
    let size = IMAGE_SIZE as u32;
    let rgb = image
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8()
        .into_raw();

    to_tensor(rgb, device).map_err(|e| Unavailable::Decode(e.to_string()))
}

fn to_tensor(rgb: Vec<u8>, device: &Device) -> candle::Result<ImageTensor> {
    let pixels = Tensor::from_vec(rgb, (IMAGE_SIZE, IMAGE_SIZE, 3), device)?.permute((2, 0, 1))?;
    let mean = Tensor::new(&IMAGENET_MEAN, device)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGENET_STD, device)?.reshape((3, 1, 1))?;
    let normalized = (pixels.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?;
    Ok(ImageTensor(normalized.unsqueeze(0)?))
}
