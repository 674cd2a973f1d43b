use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ImageBackend, ImageFuture, model_url, post_json};
use crate::data::{InlineImage, JPEG_MIME};

pub(crate) const DEFAULT_IMAGEN_MODEL: &str = "imagen-4.0-generate-001";

/// Dedicated image model called through `:predict`.
#[derive(Debug, Clone)]
pub struct Imagen {
    model: String,
    client: reqwest::Client,
}

impl Imagen {
    pub fn new() -> Self {
        Self {
            model: DEFAULT_IMAGEN_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }
}

impl Default for Imagen {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBackend for Imagen {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate<'a>(&'a self, key: &'a str, prompt: &'a str) -> ImageFuture<'a> {
        Box::pin(async move {
            let body = predict_request(prompt);
            let url = model_url(&self.model, "predict");
            let text = post_json(&self.client, "Imagen", &url, key, &body).await?;
            extract_prediction(&text)
        })
    }
}

fn predict_request(prompt: &str) -> Value {
    json!({
        "instances": [{"prompt": prompt}],
        "parameters": {
            "sampleCount": 1,
            "aspectRatio": "16:9",
            "outputOptions": {"mimeType": JPEG_MIME}
        }
    })
}

pub(crate) fn extract_prediction(text: &str) -> Result<InlineImage> {
    let payload: PredictResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Imagen response JSON: {}", err))?;
    let prediction = payload
        .predictions
        .into_iter()
        .find(|prediction| {
            prediction
                .bytes_base64_encoded
                .as_deref()
                .is_some_and(|value| !value.trim().is_empty())
        })
        .ok_or_else(|| anyhow!("No image generated"))?;
    let encoded = prediction.bytes_base64_encoded.unwrap_or_default();
    InlineImage::from_base64(
        &encoded,
        Some(prediction.mime_type.as_deref().unwrap_or(JPEG_MIME)),
    )
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: Option<String>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}
