pub mod analysis;
pub mod compositor;
pub mod data;
pub mod error;
pub mod font;
pub mod geometry;
pub mod logging;
pub mod pipeline;
pub mod preview;
pub mod providers;
pub mod session;
pub mod settings;
pub mod style;
pub mod synthesis;

#[cfg(test)]
mod test_util;

pub use analysis::SceneAnalysis;
pub use compositor::{Compositor, ExportedThumbnail, ResolutionTier};
pub use data::InlineImage;
pub use error::{ThumbError, ThumbResult};
pub use font::FontLibrary;
pub use pipeline::{PipelineStatus, Studio};
pub use preview::{ContainerRect, PreviewRenderer};
pub use providers::{FlashImage, GeminiAnalyzer, ImageBackend, Imagen, SceneAnalyzer};
pub use session::Session;
pub use settings::Settings;
pub use style::{FontStyle, Rgba, StyleConfig, StylePatch};
pub use synthesis::Synthesizer;

/// Studio wired to the Gemini analysis model and the configured image models.
pub fn build_studio(settings: &Settings, session: Session) -> Studio<GeminiAnalyzer> {
    let fonts = FontLibrary::new(&settings.font_paths, &settings.font_dirs);
    Studio::new(
        session,
        GeminiAnalyzer::new().with_model(settings.models.analysis.clone()),
        Synthesizer::standard(&settings.models),
        Compositor::new(fonts),
        settings.preview_width,
    )
    .with_style(settings.style.clone())
}
