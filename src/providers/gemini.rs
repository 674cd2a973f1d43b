use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{AnalysisFuture, ImageBackend, ImageFuture, SceneAnalyzer, model_url, post_json};
use crate::analysis::{parse_analysis, render_scene_prompt, response_schema};
use crate::data::InlineImage;
use crate::error::ThumbError;

pub(crate) const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.5-flash";
pub(crate) const DEFAULT_FLASH_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// Structured scene analysis through `generateContent` in JSON mode.
#[derive(Debug, Clone)]
pub struct GeminiAnalyzer {
    model: String,
    client: reqwest::Client,
}

impl GeminiAnalyzer {
    pub fn new() -> Self {
        Self {
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
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

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Default for GeminiAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneAnalyzer for GeminiAnalyzer {
    fn analyze<'a>(&'a self, key: &'a str, script: &'a str) -> AnalysisFuture<'a> {
        Box::pin(async move {
            let prompt = render_scene_prompt(script)?;
            let body = analysis_request(&prompt);
            let url = model_url(&self.model, "generateContent");
            debug!("requesting scene analysis from {}", self.model);
            let text = post_json(&self.client, "Gemini", &url, key, &body)
                .await
                .map_err(|err| ThumbError::analysis(format!("{:#}", err)))?;
            let answer =
                extract_text(&text).map_err(|err| ThumbError::analysis(format!("{:#}", err)))?;
            parse_analysis(&answer)
        })
    }
}

fn analysis_request(prompt: &str) -> Value {
    json!({
        "contents": [
            {
                "role": "user",
                "parts": [{"text": prompt}]
            }
        ],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema()
        }
    })
}

/// Multimodal image generation through `generateContent`.
#[derive(Debug, Clone)]
pub struct FlashImage {
    model: String,
    client: reqwest::Client,
}

impl FlashImage {
    pub fn new() -> Self {
        Self {
            model: DEFAULT_FLASH_IMAGE_MODEL.to_string(),
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

impl Default for FlashImage {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBackend for FlashImage {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate<'a>(&'a self, key: &'a str, prompt: &'a str) -> ImageFuture<'a> {
        Box::pin(async move {
            let body = flash_image_request(prompt);
            let url = model_url(&self.model, "generateContent");
            let text = post_json(&self.client, "Gemini", &url, key, &body).await?;
            extract_inline_image(&text)
        })
    }
}

/// This model has no aspect-ratio parameter, so the ratio rides in the prompt.
fn flash_image_request(prompt: &str) -> Value {
    json!({
        "contents": [
            {
                "role": "user",
                "parts": [{"text": format!("{}. Aspect Ratio 16:9.", prompt)}]
            }
        ]
    })
}

fn parse_response(text: &str) -> Result<GeminiResponse> {
    serde_json::from_str(text).map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))
}

fn first_parts(payload: &GeminiResponse) -> Result<&[GeminiPart]> {
    payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| content.parts.as_slice())
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))
}

pub(crate) fn extract_text(text: &str) -> Result<String> {
    let payload = parse_response(text)?;
    let answer = first_parts(&payload)?
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<String>();
    if answer.trim().is_empty() {
        return Err(anyhow!("no text returned from Gemini"));
    }
    Ok(answer)
}

pub(crate) fn extract_inline_image(text: &str) -> Result<InlineImage> {
    let payload = parse_response(text)?;
    for part in first_parts(&payload)? {
        if let Some(data) = &part.inline_data {
            return InlineImage::from_base64(&data.data, data.mime_type.as_deref());
        }
    }
    Err(anyhow!("Failed to generate image with fallback model"))
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    #[test]
    fn analysis_text_parses_into_scene() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/gemini_analysis_response.json"
        ));
        let text = extract_text(payload).unwrap();
        let analysis = parse_analysis(&text).unwrap();
        assert_json_snapshot!(analysis, @r###"
        {
          "protagonist": "A lone astronaut with a cracked visor",
          "threat": "A colossal black hole swallowing the station",
          "mood": "terror",
          "setting": "A shattered orbital station",
          "suggestedTitle": "LOST IN THE VOID",
          "visualComposition": "Astronaut close-up on the left, black hole filling the right",
          "imagePrompt": "Extreme close-up of a terrified astronaut, cracked visor reflecting a colossal black hole, cinematic rim lighting, photorealistic, 16:9, high contrast, 4k"
        }
        "###);
    }

    #[test]
    fn inline_image_part_is_extracted() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/gemini_image_response.json"
        ));
        let image = extract_inline_image(payload).unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(&image.bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn text_only_reply_is_not_an_image() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/gemini_text_only_response.json"
        ));
        let err = extract_inline_image(payload).unwrap_err();
        assert!(err.to_string().contains("fallback model"));
    }

    #[test]
    fn empty_candidates_have_no_text() {
        assert!(extract_text(r#"{"candidates": []}"#).is_err());
        assert!(extract_text("not json").is_err());
    }

    #[test]
    fn fallback_request_carries_aspect_ratio_in_prompt() {
        let prompt = crate::synthesis::augment_prompt("a haunted lighthouse");
        let body = flash_image_request(&prompt);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            format!("{}. Aspect Ratio 16:9.", prompt)
        );
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn analysis_request_uses_json_mode() {
        let body = analysis_request("hello");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(
            body["generationConfig"]["responseSchema"]["required"]
                .as_array()
                .map(Vec::len),
            Some(7)
        );
    }
}
