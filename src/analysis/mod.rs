use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tera::{Context as TeraContext, Tera};

use crate::error::{ThumbError, ThumbResult};

const SCENE_PROMPT_TEMPLATE: &str = include_str!("prompts/scene_prompt.tera");

/// Structured description of a script's visual elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneAnalysis {
    pub protagonist: String,
    pub threat: String,
    pub mood: String,
    pub setting: String,
    pub suggested_title: String,
    pub visual_composition: String,
    pub image_prompt: String,
}

impl SceneAnalysis {
    /// Title to seed the overlay text with, if the analysis produced one.
    pub fn title(&self) -> Option<&str> {
        let title = self.suggested_title.trim();
        (!title.is_empty()).then_some(title)
    }
}

pub fn render_scene_prompt(script: &str) -> ThumbResult<String> {
    let mut context = TeraContext::new();
    context.insert("script", script);
    Tera::one_off(SCENE_PROMPT_TEMPLATE, &context, false)
        .map_err(|err| ThumbError::analysis(format!("failed to render analysis prompt: {}", err)))
}

/// Output schema for structured generation. Every field is required.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "protagonist": {
                "type": "STRING",
                "description": "The main character visually described"
            },
            "threat": {
                "type": "STRING",
                "description": "The antagonist or threat visually described"
            },
            "mood": {
                "type": "STRING",
                "description": "The emotional atmosphere (suspense, joy, terror)"
            },
            "setting": {
                "type": "STRING",
                "description": "The environment/background"
            },
            "suggestedTitle": {
                "type": "STRING",
                "description": "A short, punchy, click-bait style title (max 5 words)"
            },
            "visualComposition": {
                "type": "STRING",
                "description": "Brief description of how the image should look"
            },
            "imagePrompt": {
                "type": "STRING",
                "description": "A highly detailed prompt for an image generator. It MUST specify a close-up of the protagonist and the threat/conflict. It should mention lighting, style (photorealistic or cinematic), and facial expressions matching the mood."
            }
        },
        "required": [
            "protagonist",
            "threat",
            "mood",
            "setting",
            "suggestedTitle",
            "visualComposition",
            "imagePrompt"
        ]
    })
}

/// Parses the structured text returned by the analysis service.
pub fn parse_analysis(text: &str) -> ThumbResult<SceneAnalysis> {
    let trimmed = strip_code_fence(text.trim());
    if trimmed.is_empty() {
        return Err(ThumbError::analysis("no text returned from analysis service"));
    }
    let analysis: SceneAnalysis = serde_json::from_str(trimmed)
        .map_err(|err| ThumbError::analysis(format!("unexpected analysis shape: {}", err)))?;
    if analysis.image_prompt.trim().is_empty() {
        return Err(ThumbError::analysis("analysis returned an empty imagePrompt"));
    }
    Ok(analysis)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
