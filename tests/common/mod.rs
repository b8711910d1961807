// Shared fixtures: a tiny randomly initialised model and a local image host
#![allow(dead_code)]
use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use candle::{DType, Device, D};
use candle_nn::{Func, VarBuilder, VarMap};
use image::{ImageFormat, Rgb, RgbImage};
use news_classifier::models::bert::EncoderConfig;
use news_classifier::models::fusion::{FusionClassifier, BACKBONE_FEATURES};
use news_classifier::models::text::TextEncoder;
use news_classifier::{AppState, MultimodalModel};
use tokenizers::Tokenizer;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(2);

pub fn word_level_tokenizer() -> Tokenizer {
    let words = [
        "[PAD]", "[UNK]", "breaking", "news", "update", "scientists", "confirm", "the", "moon",
        "is", "made", "of", "cheese",
    ];
    let vocab: serde_json::Map<String, serde_json::Value> = words
        .iter()
        .enumerate()
        .map(|(id, word)| (word.to_string(), serde_json::Value::from(id)))
        .collect();
    let json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]" }
    });
    Tokenizer::from_bytes(json.to_string().as_bytes()).unwrap()
}

fn tiny_config() -> EncoderConfig {
    let json = serde_json::json!({
        "vocab_size": 32,
        "hidden_size": 16,
        "num_hidden_layers": 1,
        "num_attention_heads": 2,
        "intermediate_size": 32,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.0,
        "max_position_embeddings": 128,
        "type_vocab_size": 2,
        "initializer_range": 0.02,
        "layer_norm_eps": 1e-12,
        "pad_token_id": 0,
        "model_type": "bert"
    });
    EncoderConfig::from_json(&json.to_string()).unwrap()
}

/// A model whose image backbone pools each channel and widens the result to
/// `backbone_width` features. Any width other than 2048 breaks the image path.
pub fn tiny_model(backbone_width: usize) -> MultimodalModel {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let widen = candle_nn::linear(3, backbone_width, vb.pp("resnet.widen")).unwrap();
    let backbone = Func::new(move |xs| xs.mean(D::Minus1)?.mean(D::Minus1)?.apply(&widen));
    let classifier = FusionClassifier::new(vb, &tiny_config(), backbone).unwrap();
    let encoder = TextEncoder::new(word_level_tokenizer()).unwrap();
    MultimodalModel::new(encoder, classifier, Device::Cpu)
}

pub fn app_state(backbone_width: usize) -> AppState {
    AppState::with_timeout(tiny_model(backbone_width), FETCH_TIMEOUT).unwrap()
}

pub fn default_state() -> AppState {
    app_state(BACKBONE_FEATURES)
}

fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// Serves `/photo.png` (a real PNG), `/unsized.png` (the same PNG without a
/// Content-Length), `/slow.png` (the PNG after twice [`FETCH_TIMEOUT`]),
/// `/page.html` (HTML), `/mislabelled.jpg` (garbage declared as an image) and
/// 404 for anything else.
pub struct ImageHost {
    addr: SocketAddr,
}

impl ImageHost {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let png = png_bytes();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let png = png.clone();
                thread::spawn(move || serve(stream, &png));
            }
        });
        Self { addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn serve(mut stream: TcpStream, png: &[u8]) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    let request = String::from_utf8_lossy(&request);
    let path = request.split_whitespace().nth(1).unwrap_or("/");

    let html = b"<html><body>news</body></html>".to_vec();
    let (status, content_type, body): (&str, &str, Vec<u8>) = match path {
        "/photo.png" | "/unsized.png" => ("200 OK", "image/png", png.to_vec()),
        "/slow.png" => {
            thread::sleep(FETCH_TIMEOUT * 2);
            ("200 OK", "image/png", png.to_vec())
        }
        "/page.html" => ("200 OK", "text/html; charset=utf-8", html),
        "/mislabelled.jpg" => ("200 OK", "image/jpeg", b"definitely not a jpeg".to_vec()),
        _ => ("404 Not Found", "text/plain", b"not found".to_vec()),
    };
    let length = if path == "/unsized.png" {
        String::new()
    } else {
        format!("Content-Length: {}\r\n", body.len())
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\n{}Connection: close\r\n\r\n",
        status, content_type, length
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
}
