use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

use crate::analysis::SceneAnalysis;
use crate::data::InlineImage;
use crate::error::ThumbResult;

mod gemini;
mod imagen;
mod retry;

pub use gemini::{FlashImage, GeminiAnalyzer};
pub use imagen::Imagen;

pub(crate) use gemini::{DEFAULT_ANALYSIS_MODEL, DEFAULT_FLASH_IMAGE_MODEL};
pub(crate) use imagen::DEFAULT_IMAGEN_MODEL;

use retry::{Backoff, is_rate_limited, retry_after};

pub(crate) const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub type AnalysisFuture<'a> = Pin<Box<dyn Future<Output = ThumbResult<SceneAnalysis>> + Send + 'a>>;
pub type ImageFuture<'a> = Pin<Box<dyn Future<Output = Result<InlineImage>> + Send + 'a>>;

/// Turns free text into a structured scene description.
pub trait SceneAnalyzer: Send + Sync {
    fn analyze<'a>(&'a self, key: &'a str, script: &'a str) -> AnalysisFuture<'a>;
}

/// One way of producing a background image from a prompt.
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate<'a>(&'a self, key: &'a str, prompt: &'a str) -> ImageFuture<'a>;
}

/// POSTs a JSON body to a model endpoint, waiting out rate limits.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    label: &str,
    url: &str,
    key: &str,
    body: &Value,
) -> Result<String> {
    let mut backoff = Backoff::new();
    loop {
        backoff.start_attempt();
        let response = client
            .post(url)
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(text);
        }
        if is_rate_limited(status, &text)
            && let Some(wait) = backoff.next_wait(retry_after)
        {
            backoff.wait(label, wait).await;
            continue;
        }
        return Err(anyhow!(
            "{} API error ({}): {}",
            label,
            status,
            extract_google_error(&text).unwrap_or(text)
        ));
    }
}

pub(crate) fn model_url(model: &str, method: &str) -> String {
    format!("{}/{}:{}", BASE_URL, model, method)
}

fn extract_google_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GoogleError>,
    }

    #[derive(Deserialize)]
    struct GoogleError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(
        error.message,
        error.status,
        error.code.map(|value| value.to_string()),
    ))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(kind) = kind
        && !kind.trim().is_empty()
    {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code
        && !code.trim().is_empty()
    {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}
