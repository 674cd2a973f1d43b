use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::analysis::SceneAnalysis;
use crate::compositor::{Compositor, ExportedThumbnail, ResolutionTier};
use crate::data::InlineImage;
use crate::error::{ThumbError, ThumbResult};
use crate::font::LoadedFont;
use crate::preview::{ContainerRect, OverlayElementStyle, PreviewRenderer};
use crate::providers::SceneAnalyzer;
use crate::session::Session;
use crate::style::StyleConfig;
use crate::synthesis::Synthesizer;

pub const EMPTY_SCRIPT_MESSAGE: &str = "Please enter a script or description first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Analyzing,
    GeneratingImage,
    Complete,
    Error,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::Analyzing => "analyzing",
            PipelineStatus::GeneratingImage => "generating_image",
            PipelineStatus::Complete => "complete",
            PipelineStatus::Error => "error",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Analyzing | PipelineStatus::GeneratingImage
        )
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type StatusListener = Box<dyn FnMut(PipelineStatus) + Send>;

pub const INTERRUPTED_MESSAGE: &str = "Generation was interrupted before it finished.";

/// Moves a run that is dropped mid-flight to [`PipelineStatus::Error`].
struct InFlight<'s, A: SceneAnalyzer> {
    studio: &'s mut Studio<A>,
}

impl<A: SceneAnalyzer> Drop for InFlight<'_, A> {
    fn drop(&mut self) {
        if self.studio.status.is_busy() {
            warn!("generation dropped while {}", self.studio.status);
            self.studio.error = Some(INTERRUPTED_MESSAGE.to_string());
            self.studio.transition(PipelineStatus::Error);
        }
    }
}

/// Owns the style, the background and the generation pipeline state.
pub struct Studio<A: SceneAnalyzer> {
    session: Session,
    analyzer: A,
    synthesizer: Synthesizer,
    compositor: Compositor,
    preview: PreviewRenderer,
    status: PipelineStatus,
    error: Option<String>,
    analysis: Option<SceneAnalysis>,
    style: StyleConfig,
    background: Option<InlineImage>,
    listener: Option<StatusListener>,
}

impl<A: SceneAnalyzer> Studio<A> {
    pub fn new(
        session: Session,
        analyzer: A,
        synthesizer: Synthesizer,
        compositor: Compositor,
        preview_width: u32,
    ) -> Self {
        Self {
            session,
            analyzer,
            synthesizer,
            compositor,
            preview: PreviewRenderer::new(ContainerRect::sized(preview_width)),
            status: PipelineStatus::Idle,
            error: None,
            analysis: None,
            style: StyleConfig::default(),
            background: None,
            listener: None,
        }
    }

    pub fn with_style(mut self, style: StyleConfig) -> Self {
        self.style = style;
        self
    }

    pub fn with_status_listener(mut self, listener: StatusListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn analysis(&self) -> Option<&SceneAnalysis> {
        self.analysis.as_ref()
    }

    pub fn style(&self) -> &StyleConfig {
        &self.style
    }

    pub fn background(&self) -> Option<&InlineImage> {
        self.background.as_ref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn has_credential(&self) -> bool {
        self.session.has_credential()
    }

    pub fn establish_credential(&mut self, key: impl Into<String>) -> ThumbResult<()> {
        match self.session.establish(key) {
            Ok(()) => {
                self.error = None;
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Whether the generate trigger is enabled for `script`.
    pub fn can_generate(&self, script: &str) -> bool {
        !self.status.is_busy() && !script.trim().is_empty()
    }

    /// Runs analysis then synthesis for `script`.
    ///
    /// Validation failures leave the status where it was. Adapter failures move
    /// to [`PipelineStatus::Error`] and keep the previous background.
    pub async fn generate(&mut self, script: &str) -> ThumbResult<()> {
        if self.status.is_busy() {
            return Err(ThumbError::validation("generation already in progress"));
        }
        if script.trim().is_empty() {
            return Err(self.reject(ThumbError::validation(EMPTY_SCRIPT_MESSAGE)));
        }
        let key = match self.session.require_key().map(str::to_string) {
            Ok(key) => key,
            Err(err) => return Err(self.reject(err)),
        };

        self.error = None;
        self.analysis = None;
        self.transition(PipelineStatus::Analyzing);
        let mut run = InFlight { studio: self };
        let analysis = match run.studio.analyzer.analyze(&key, script).await {
            Ok(analysis) => analysis,
            Err(err) => return Err(run.studio.fail(err)),
        };
        if let Some(title) = analysis.title() {
            run.studio.style = run.studio.style.clone().with_text(title);
        }
        let prompt = analysis.image_prompt.clone();
        run.studio.analysis = Some(analysis);

        run.studio.transition(PipelineStatus::GeneratingImage);
        let image = match run.studio.synthesizer.synthesize(&key, &prompt).await {
            Ok(image) => image,
            Err(err) => return Err(run.studio.fail(err)),
        };
        run.studio.background = Some(image);
        run.studio.transition(PipelineStatus::Complete);
        Ok(())
    }

    fn transition(&mut self, next: PipelineStatus) {
        info!("pipeline {} -> {}", self.status, next);
        self.status = next;
        if let Some(listener) = self.listener.as_mut() {
            listener(next);
        }
    }

    fn reject(&mut self, err: ThumbError) -> ThumbError {
        debug!("generation rejected: {}", err);
        self.error = Some(err.to_string());
        err
    }

    fn fail(&mut self, err: ThumbError) -> ThumbError {
        warn!("generation failed: {}", err);
        self.error = Some(err.to_string());
        self.transition(PipelineStatus::Error);
        err
    }

    /// Re-applies the analysis' suggested title to the overlay text.
    pub fn use_suggested_title(&mut self) -> bool {
        let Some(title) = self.analysis.as_ref().and_then(|analysis| analysis.title()) else {
            return false;
        };
        self.style = self.style.clone().with_text(title);
        true
    }

    pub fn set_style(&mut self, style: StyleConfig) {
        self.style = style;
    }

    pub fn update_style(&mut self, edit: impl FnOnce(StyleConfig) -> StyleConfig) {
        self.style = edit(self.style.clone());
    }

    /// Uses an existing image as the background, bypassing generation.
    pub fn set_background(&mut self, image: InlineImage) {
        self.background = Some(image);
    }

    /// Renders the thumbnail at `tier`. Without a background this is a no-op.
    pub fn export(&self, tier: ResolutionTier) -> ThumbResult<Option<ExportedThumbnail>> {
        let Some(background) = self.background.as_ref() else {
            debug!("export skipped: no background image");
            return Ok(None);
        };
        self.compositor
            .export(background, &self.style, tier)
            .map(Some)
    }

    pub fn preview(&self) -> &PreviewRenderer {
        &self.preview
    }

    pub fn set_preview_container(&mut self, container: ContainerRect) {
        self.preview.set_container(container);
    }

    fn overlay_font(&self) -> Option<LoadedFont> {
        self.compositor.fonts().resolve(self.style.font()).ok()
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) -> bool {
        if self.background.is_none() {
            return false;
        }
        let font = self.overlay_font();
        self.preview.pointer_down(x, y, &self.style, font.as_ref())
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> bool {
        match self.preview.pointer_move(x, y, &self.style) {
            Some(style) => {
                self.style = style;
                true
            }
            None => false,
        }
    }

    pub fn pointer_up(&mut self) {
        self.preview.pointer_up();
    }

    pub fn pointer_leave(&mut self) {
        self.preview.pointer_leave();
    }

    pub fn overlay_element_style(&self) -> OverlayElementStyle {
        let family = self
            .overlay_font()
            .map(|font| font.family().to_string())
            .unwrap_or_else(|| self.style.font().family().to_string());
        self.preview.element_style(&self.style, &family)
    }

    pub fn preview_svg(&self) -> String {
        let family = self
            .overlay_font()
            .map(|font| font.family().to_string())
            .unwrap_or_else(|| self.style.font().family().to_string());
        self.preview
            .scene_svg(self.background.as_ref(), &self.style, &family)
    }

    pub fn preview_png(&self) -> ThumbResult<Vec<u8>> {
        let font = self.overlay_font();
        self.preview
            .render_png(self.background.as_ref(), &self.style, font.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::solid_png;
    use crate::font::FontLibrary;
    use crate::providers::{AnalysisFuture, ImageBackend, ImageFuture};
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct FixedAnalyzer(Result<SceneAnalysis, &'static str>);

    impl SceneAnalyzer for FixedAnalyzer {
        fn analyze<'a>(&'a self, _key: &'a str, _script: &'a str) -> AnalysisFuture<'a> {
            let result = self.0.clone().map_err(ThumbError::analysis);
            Box::pin(async move { result })
        }
    }

    struct FixedImage(Option<InlineImage>);

    impl ImageBackend for FixedImage {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate<'a>(&'a self, _key: &'a str, _prompt: &'a str) -> ImageFuture<'a> {
            let result = self.0.clone().ok_or_else(|| anyhow!("quota exceeded"));
            Box::pin(async move { result })
        }
    }

    struct StalledImage;

    impl ImageBackend for StalledImage {
        fn name(&self) -> &str {
            "stalled"
        }

        fn generate<'a>(&'a self, _key: &'a str, _prompt: &'a str) -> ImageFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    fn scene(title: &str) -> SceneAnalysis {
        SceneAnalysis {
            protagonist: "knight".to_string(),
            threat: "dragon".to_string(),
            mood: "terror".to_string(),
            setting: "castle".to_string(),
            suggested_title: title.to_string(),
            visual_composition: "knight left, dragon right".to_string(),
            image_prompt: "close-up of a knight facing a dragon".to_string(),
        }
    }

    fn studio(
        analysis: Result<SceneAnalysis, &'static str>,
        image: Option<InlineImage>,
    ) -> Studio<FixedAnalyzer> {
        Studio::new(
            Session::from_env(Some("test-key")),
            FixedAnalyzer(analysis),
            Synthesizer::new(vec![Box::new(FixedImage(image))]),
            Compositor::new(FontLibrary::new(&[], &[])),
            320,
        )
    }

    #[tokio::test]
    async fn successful_run_walks_every_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let image = solid_png(16, 9, [0, 0, 0, 255]);
        let mut studio = studio(Ok(scene("DRAGON ATTACK")), Some(image.clone()))
            .with_status_listener(Box::new(move |status| sink.lock().unwrap().push(status)));

        studio.generate("A knight faces a dragon").await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                PipelineStatus::Analyzing,
                PipelineStatus::GeneratingImage,
                PipelineStatus::Complete
            ]
        );
        assert_eq!(studio.style().text(), "DRAGON ATTACK");
        assert_eq!(studio.background(), Some(&image));
        assert!(studio.error_message().is_none());
    }

    #[tokio::test]
    async fn blank_script_never_starts() {
        let mut studio = studio(Ok(scene("X")), None);
        let err = studio.generate("   ").await.unwrap_err();
        assert!(matches!(err, ThumbError::Validation(_)));
        assert_eq!(studio.status(), PipelineStatus::Idle);
        assert_eq!(studio.error_message(), Some(EMPTY_SCRIPT_MESSAGE));
    }

    #[tokio::test]
    async fn missing_credential_never_starts() {
        let mut studio = Studio::new(
            Session::new(),
            FixedAnalyzer(Ok(scene("X"))),
            Synthesizer::new(Vec::new()),
            Compositor::new(FontLibrary::new(&[], &[])),
            320,
        );
        let err = studio.generate("story").await.unwrap_err();
        assert_eq!(err.to_string(), "Please select an API Key to proceed.");
        assert_eq!(studio.status(), PipelineStatus::Idle);

        studio.establish_credential("k").unwrap();
        assert!(studio.has_credential());
        assert!(studio.error_message().is_none());
    }

    #[tokio::test]
    async fn analysis_failure_keeps_background_and_drops_analysis() {
        let previous = solid_png(16, 9, [5, 5, 5, 255]);
        let mut studio = studio(Ok(scene("FIRST")), Some(previous.clone()));
        studio.generate("first run").await.unwrap();
        assert!(studio.analysis().is_some());

        studio.analyzer = FixedAnalyzer(Err("missing imagePrompt"));
        let err = studio.generate("second run").await.unwrap_err();
        assert!(matches!(err, ThumbError::Analysis(_)));
        assert_eq!(studio.status(), PipelineStatus::Error);
        assert_eq!(studio.background(), Some(&previous));
        assert!(studio.analysis().is_none());
        assert_eq!(studio.style().text(), "FIRST");
    }

    #[tokio::test]
    async fn synthesis_failure_message_differs_from_analysis_failure() {
        let mut failing_image = studio(Ok(scene("T")), None);
        failing_image.generate("story").await.unwrap_err();
        let synthesis_message = failing_image.error_message().unwrap().to_string();
        assert_eq!(failing_image.status(), PipelineStatus::Error);
        // title was applied before synthesis ran
        assert_eq!(failing_image.style().text(), "T");

        let mut failing_analysis = studio(Err("boom"), None);
        failing_analysis.generate("story").await.unwrap_err();
        let analysis_message = failing_analysis.error_message().unwrap().to_string();

        assert_ne!(synthesis_message, analysis_message);
        assert!(synthesis_message.starts_with("image generation failed"));
        assert!(analysis_message.starts_with("script analysis failed"));
    }

    #[tokio::test]
    async fn error_state_can_generate_again() {
        let mut studio = studio(Ok(scene("AGAIN")), None);
        studio.generate("story").await.unwrap_err();
        assert!(studio.can_generate("story"));
        studio.synthesizer =
            Synthesizer::new(vec![Box::new(FixedImage(Some(solid_png(4, 4, [1, 1, 1, 255]))))]);
        studio.generate("story").await.unwrap();
        assert_eq!(studio.status(), PipelineStatus::Complete);
    }

    #[test]
    fn export_without_background_is_a_no_op() {
        let studio = studio(Ok(scene("X")), None);
        assert!(studio.export(ResolutionTier::P720).unwrap().is_none());
    }

    #[test]
    fn empty_text_export_matches_background() {
        let mut studio = studio(Ok(scene("X")), None);
        studio.set_background(solid_png(16, 9, [40, 80, 120, 255]));
        studio.update_style(|style| style.with_text(""));
        let exported = studio.export(ResolutionTier::P720).unwrap().unwrap();
        assert_eq!(exported.file_name, "thumbnail-720p.jpg");
        let decoded = image::load_from_memory(&exported.bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (1280, 720));
        let px = decoded.get_pixel(640, 360).0;
        for (got, want) in px.iter().zip([40u8, 80, 120]) {
            assert!(got.abs_diff(want) <= 2, "{:?}", px);
        }
    }

    #[tokio::test]
    async fn abandoned_run_settles_in_error() {
        let mut studio = Studio::new(
            Session::from_env(Some("test-key")),
            FixedAnalyzer(Ok(scene("STUCK"))),
            Synthesizer::new(vec![Box::new(StalledImage)]),
            Compositor::new(FontLibrary::new(&[], &[])),
            320,
        );
        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), studio.generate("story")).await;
        assert!(timed_out.is_err());

        assert_eq!(studio.status(), PipelineStatus::Error);
        assert_eq!(studio.error_message(), Some(INTERRUPTED_MESSAGE));
        assert!(studio.can_generate("story"));
        assert_eq!(studio.style().text(), "STUCK");
    }

    #[test]
    fn suggested_title_can_be_reapplied() {
        let mut studio = studio(Ok(scene("X")), None);
        assert!(!studio.use_suggested_title());
        studio.analysis = Some(scene("COMEBACK"));
        studio.update_style(|style| style.with_text("edited"));
        assert!(studio.use_suggested_title());
        assert_eq!(studio.style().text(), "COMEBACK");
    }

    #[test]
    fn drag_requires_a_background() {
        let mut studio = studio(Ok(scene("X")), None);
        // default anchor in a 320x180 container
        assert!(!studio.pointer_down(160.0, 144.0));
        studio.set_background(solid_png(16, 9, [0, 0, 0, 255]));
        assert!(studio.pointer_down(160.0, 144.0));
        assert!(studio.pointer_move(-100.0, 1000.0));
        assert_eq!(studio.style().position_x(), 0.0);
        assert_eq!(studio.style().position_y(), 100.0);
        studio.pointer_up();
        assert!(!studio.pointer_move(10.0, 10.0));
    }
}
