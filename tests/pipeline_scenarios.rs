use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use thumbgenius::providers::{AnalysisFuture, ImageFuture};
use thumbgenius::{
    Compositor, FontLibrary, ImageBackend, InlineImage, PipelineStatus, ResolutionTier,
    SceneAnalysis, SceneAnalyzer, Session, Studio, Synthesizer, ThumbError,
};

struct CannedAnalyzer {
    reply: &'static str,
}

impl SceneAnalyzer for CannedAnalyzer {
    fn analyze<'a>(&'a self, _key: &'a str, _script: &'a str) -> AnalysisFuture<'a> {
        Box::pin(async move { thumbgenius::analysis::parse_analysis(self.reply) })
    }
}

struct Backend {
    name: &'static str,
    image: Option<InlineImage>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl ImageBackend for Backend {
    fn name(&self) -> &str {
        self.name
    }

    fn generate<'a>(&'a self, _key: &'a str, _prompt: &'a str) -> ImageFuture<'a> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(self.name);
            self.image
                .clone()
                .ok_or_else(|| anyhow!("{} refused the prompt", self.name))
        })
    }
}

const FULL_REPLY: &str = include_str!("fixtures/analysis_reply.json");
const MISSING_PROMPT_REPLY: &str = include_str!("fixtures/analysis_reply_missing_prompt.json");

fn png(width: u32, height: u32, rgba: [u8; 4]) -> InlineImage {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    InlineImage::new(bytes, "image/png")
}

fn studio(
    reply: &'static str,
    primary: Option<InlineImage>,
    fallback: Option<InlineImage>,
    calls: &Arc<Mutex<Vec<&'static str>>>,
) -> Studio<CannedAnalyzer> {
    let synthesizer = Synthesizer::new(vec![
        Box::new(Backend {
            name: "primary",
            image: primary,
            calls: Arc::clone(calls),
        }),
        Box::new(Backend {
            name: "fallback",
            image: fallback,
            calls: Arc::clone(calls),
        }),
    ]);
    Studio::new(
        Session::from_env(Some("integration-key")),
        CannedAnalyzer { reply },
        synthesizer,
        Compositor::new(FontLibrary::new(&[], &[])),
        480,
    )
}

#[tokio::test]
async fn fallback_image_completes_the_pipeline() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let fallback = png(32, 18, [200, 40, 40, 255]);
    let mut studio = studio(FULL_REPLY, None, Some(fallback.clone()), &calls);

    studio.generate("Breaking: storm hits the city").await.unwrap();

    assert_eq!(studio.status(), PipelineStatus::Complete);
    assert_eq!(*calls.lock().unwrap(), vec!["primary", "fallback"]);
    assert_eq!(studio.background(), Some(&fallback));
    assert_eq!(studio.style().text(), "BREAKING NEWS");
    let analysis: &SceneAnalysis = studio.analysis().unwrap();
    assert_eq!(analysis.mood, "suspense");
}

#[tokio::test]
async fn missing_image_prompt_stops_before_synthesis() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut studio = studio(MISSING_PROMPT_REPLY, Some(png(4, 4, [0, 0, 0, 255])), None, &calls);

    let err = studio.generate("a story").await.unwrap_err();

    assert!(matches!(err, ThumbError::Analysis(_)));
    assert_eq!(studio.status(), PipelineStatus::Error);
    assert!(studio.background().is_none());
    assert!(calls.lock().unwrap().is_empty());
    assert!(studio.export(ResolutionTier::P720).unwrap().is_none());
}

#[tokio::test]
async fn both_backends_failing_is_a_distinct_error() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut studio = studio(FULL_REPLY, None, None, &calls);

    let err = studio.generate("a story").await.unwrap_err();

    assert!(matches!(err, ThumbError::Synthesis(_)));
    assert_eq!(studio.status(), PipelineStatus::Error);
    let message = studio.error_message().unwrap();
    assert!(message.contains("primary refused the prompt"));
    assert!(message.contains("fallback refused the prompt"));
    assert!(!message.starts_with("script analysis failed"));
}

#[tokio::test]
async fn generated_background_exports_at_every_tier() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut studio = studio(FULL_REPLY, Some(png(64, 36, [10, 20, 30, 255])), None, &calls);
    studio.generate("a story").await.unwrap();
    studio.update_style(|style| style.with_text(""));

    for tier in ResolutionTier::ALL {
        let exported = studio.export(tier).unwrap().unwrap();
        let decoded = image::load_from_memory(&exported.bytes).unwrap();
        assert_eq!(decoded.width(), tier.width());
        assert_eq!(decoded.height(), tier.height());
        assert_eq!(exported.file_name, format!("thumbnail-{}p.jpg", tier.label()));
    }
}
