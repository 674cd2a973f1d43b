use tracing::{info, warn};

use crate::data::InlineImage;
use crate::error::{ThumbError, ThumbResult};
use crate::providers::{FlashImage, ImageBackend, Imagen};
use crate::settings::ModelSettings;

pub const PROMPT_SUFFIX: &str =
    " , youtube thumbnail style, 8k resolution, highly detailed, cinematic lighting, masterpiece";

pub fn augment_prompt(prompt: &str) -> String {
    format!("{}{}", prompt.trim_end(), PROMPT_SUFFIX)
}

/// Ordered image backends; the first one to return an image wins.
pub struct Synthesizer {
    backends: Vec<Box<dyn ImageBackend>>,
}

impl Synthesizer {
    pub fn new(backends: Vec<Box<dyn ImageBackend>>) -> Self {
        Self { backends }
    }

    /// Dedicated image model first, multimodal model as fallback.
    pub fn standard(models: &ModelSettings) -> Self {
        Self::new(vec![
            Box::new(Imagen::new().with_model(models.image.clone())),
            Box::new(FlashImage::new().with_model(models.image_fallback.clone())),
        ])
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|backend| backend.name()).collect()
    }

    pub async fn synthesize(&self, key: &str, prompt: &str) -> ThumbResult<InlineImage> {
        if self.backends.is_empty() {
            return Err(ThumbError::synthesis("no image backends configured"));
        }
        let prompt = augment_prompt(prompt);
        let mut failures = Vec::new();
        for (idx, backend) in self.backends.iter().enumerate() {
            match backend.generate(key, &prompt).await {
                Ok(image) => {
                    info!(
                        "background generated by {} ({}, {} bytes)",
                        backend.name(),
                        image.mime,
                        image.bytes.len()
                    );
                    return Ok(image);
                }
                Err(err) => {
                    if idx + 1 < self.backends.len() {
                        warn!("{} failed, falling back: {:#}", backend.name(), err);
                    } else {
                        warn!("{} failed: {:#}", backend.name(), err);
                    }
                    failures.push(format!("{}: {:#}", backend.name(), err));
                }
            }
        }
        Err(ThumbError::synthesis(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::solid_png;
    use crate::providers::ImageFuture;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        name: &'static str,
        result: Option<InlineImage>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ImageBackend for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn generate<'a>(&'a self, _key: &'a str, prompt: &'a str) -> ImageFuture<'a> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let result = self.result.clone();
            let name = self.name;
            Box::pin(async move { result.ok_or_else(|| anyhow!("{} unavailable", name)) })
        }
    }

    fn backend(
        name: &'static str,
        result: Option<InlineImage>,
        prompts: &Arc<Mutex<Vec<String>>>,
    ) -> Box<dyn ImageBackend> {
        Box::new(Scripted {
            name,
            result,
            prompts: Arc::clone(prompts),
        })
    }

    #[test]
    fn suffix_is_appended() {
        assert_eq!(
            augment_prompt("a dragon "),
            "a dragon , youtube thumbnail style, 8k resolution, highly detailed, cinematic lighting, masterpiece"
        );
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let image = solid_png(2, 2, [1, 2, 3, 255]);
        let synth = Synthesizer::new(vec![
            backend("primary", Some(image.clone()), &prompts),
            backend("fallback", None, &prompts),
        ]);
        assert_eq!(synth.synthesize("k", "p").await.unwrap(), image);
        assert_eq!(prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fallback_receives_augmented_prompt() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let image = solid_png(2, 2, [9, 9, 9, 255]);
        let synth = Synthesizer::new(vec![
            backend("primary", None, &prompts),
            backend("fallback", Some(image.clone()), &prompts),
        ]);
        assert_eq!(synth.synthesize("k", "storm").await.unwrap(), image);
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts.iter().all(|p| p == &augment_prompt("storm")));
    }

    #[tokio::test]
    async fn all_failures_are_reported_together() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let synth = Synthesizer::new(vec![
            backend("primary", None, &prompts),
            backend("fallback", None, &prompts),
        ]);
        let err = synth.synthesize("k", "p").await.unwrap_err();
        assert!(matches!(err, ThumbError::Synthesis(_)));
        let message = err.to_string();
        assert!(message.contains("primary unavailable"));
        assert!(message.contains("fallback unavailable"));
    }

    #[tokio::test]
    async fn empty_strategy_list_fails() {
        let err = Synthesizer::new(Vec::new())
            .synthesize("k", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, ThumbError::Synthesis(_)));
    }

    #[test]
    fn standard_order_is_imagen_then_flash() {
        let synth = Synthesizer::standard(&ModelSettings::default());
        assert_eq!(
            synth.backend_names(),
            vec!["imagen-4.0-generate-001", "gemini-2.5-flash-image"]
        );
    }
}
