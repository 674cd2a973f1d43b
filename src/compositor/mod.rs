use image::codecs::jpeg::JpegEncoder;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tiny_skia::{Pixmap, Transform};
use tracing::{debug, info};

use crate::data::InlineImage;
use crate::error::{ThumbError, ThumbResult};
use crate::font::FontLibrary;
use crate::geometry::OverlayGeometry;
use crate::style::{FontStyle, Rgba, StyleConfig};

mod shadow;
mod paint;

pub const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResolutionTier {
    P720,
    P1080,
    P1440,
}

impl ResolutionTier {
    pub const ALL: [ResolutionTier; 3] = [
        ResolutionTier::P720,
        ResolutionTier::P1080,
        ResolutionTier::P1440,
    ];

    pub fn width(&self) -> u32 {
        match self {
            ResolutionTier::P720 => 1280,
            ResolutionTier::P1080 => 1920,
            ResolutionTier::P1440 => 2560,
        }
    }

    pub fn height(&self) -> u32 {
        (self.width() as f64 * 9.0 / 16.0).round() as u32
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResolutionTier::P720 => "720",
            ResolutionTier::P1080 => "1080",
            ResolutionTier::P1440 => "1440",
        }
    }

    pub fn file_name(&self) -> String {
        format!("thumbnail-{}p.jpg", self.label())
    }
}

impl FromStr for ResolutionTier {
    type Err = ThumbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "720" | "720p" => Ok(ResolutionTier::P720),
            "1080" | "1080p" => Ok(ResolutionTier::P1080),
            "1440" | "1440p" | "2k" => Ok(ResolutionTier::P1440),
            other => Err(ThumbError::config(format!(
                "unsupported resolution '{}' (expected 720, 1080 or 1440)",
                other
            ))),
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShadowPlan {
    pub color: Rgba,
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl ShadowPlan {
    /// A canvas only casts a shadow that is visible and displaced or blurred.
    pub fn is_visible(&self) -> bool {
        self.color.a > 0 && (self.blur > 0.0 || self.offset_x != 0.0 || self.offset_y != 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TextPass {
    Stroke {
        width: f32,
        color: Rgba,
        shadow: Option<ShadowPlan>,
    },
    Fill {
        color: Rgba,
        alpha: f32,
        shadow: Option<ShadowPlan>,
    },
}

impl TextPass {
    pub fn shadow(&self) -> Option<&ShadowPlan> {
        match self {
            TextPass::Stroke { shadow, .. } | TextPass::Fill { shadow, .. } => shadow.as_ref(),
        }
    }

    pub fn alpha(&self) -> f32 {
        match self {
            TextPass::Stroke { .. } => 1.0,
            TextPass::Fill { alpha, .. } => *alpha,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayPlan {
    pub text: String,
    pub font: FontStyle,
    pub geometry: OverlayGeometry,
    pub passes: Vec<TextPass>,
}

impl OverlayPlan {
    pub fn font_size(&self) -> f32 {
        self.geometry.font_size
    }

    pub fn transform(&self) -> Transform {
        self.geometry.transform()
    }
}

/// Everything the painter will do for one export, resolved to surface pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    pub width: u32,
    pub height: u32,
    pub overlay: Option<OverlayPlan>,
}

impl ExportPlan {
    pub fn for_tier(style: &StyleConfig, tier: ResolutionTier) -> Self {
        Self::new(style, tier.width(), tier.height())
    }

    pub fn new(style: &StyleConfig, width: u32, height: u32) -> Self {
        let overlay = style.has_text().then(|| overlay_plan(style, width, height));
        Self {
            width,
            height,
            overlay,
        }
    }
}

fn overlay_plan(style: &StyleConfig, width: u32, height: u32) -> OverlayPlan {
    let mut geometry = OverlayGeometry::new(style, width, height);
    let shadow = if style.has_shadow() {
        Some(ShadowPlan {
            color: style.shadow_color(),
            blur: geometry.shadow_blur,
            offset_x: geometry.shadow_offset,
            offset_y: geometry.shadow_offset,
        })
    } else {
        geometry.shadow_blur = 0.0;
        geometry.shadow_offset = 0.0;
        None
    };

    let mut passes = Vec::with_capacity(2);
    if style.stroke() {
        passes.push(TextPass::Stroke {
            width: geometry.stroke_width,
            color: style.stroke_color(),
            shadow,
        });
    }
    // The shadow is cleared after the stroke and set again for the fill, so
    // the fill casts its own shadow whenever shadows are enabled.
    passes.push(TextPass::Fill {
        color: style.color(),
        alpha: style.opacity(),
        shadow,
    });

    OverlayPlan {
        text: style.text().to_string(),
        font: style.font(),
        geometry,
        passes,
    }
}

#[derive(Debug, Clone)]
pub struct ExportedThumbnail {
    pub tier: ResolutionTier,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl ExportedThumbnail {
    pub fn save(&self, dir: &Path) -> ThumbResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

pub struct Compositor {
    fonts: FontLibrary,
}

impl Compositor {
    pub fn new(fonts: FontLibrary) -> Self {
        Self { fonts }
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }

    /// Decodes `background`, composites `style` onto it and encodes a JPEG
    /// named after `tier`. Nothing is drawn before decoding succeeds.
    pub fn export(
        &self,
        background: &InlineImage,
        style: &StyleConfig,
        tier: ResolutionTier,
    ) -> ThumbResult<ExportedThumbnail> {
        let bitmap = background.decode()?;
        let plan = ExportPlan::for_tier(style, tier);
        let surface = self.render(&bitmap, &plan)?;
        let bytes = encode_jpeg(&surface, JPEG_QUALITY)?;
        info!(
            "exported {} ({}x{}, {} bytes)",
            tier.file_name(),
            plan.width,
            plan.height,
            bytes.len()
        );
        Ok(ExportedThumbnail {
            tier,
            file_name: tier.file_name(),
            width: plan.width,
            height: plan.height,
            bytes,
        })
    }

    pub fn render(&self, background: &image::RgbaImage, plan: &ExportPlan) -> ThumbResult<Pixmap> {
        let mut surface = Pixmap::new(plan.width, plan.height).ok_or_else(|| {
            ThumbError::render(format!(
                "cannot allocate a {}x{} surface",
                plan.width, plan.height
            ))
        })?;
        paint::draw_background(&mut surface, background);

        let Some(overlay) = &plan.overlay else {
            return Ok(surface);
        };
        let font = self.fonts.resolve(overlay.font)?;
        debug!(
            "overlay font '{}' at {:.1}px for {}",
            font.family(),
            overlay.font_size(),
            overlay.font
        );
        paint::draw_overlay(&mut surface, overlay, &font)?;
        Ok(surface)
    }
}

pub fn encode_jpeg(surface: &Pixmap, quality: u8) -> ThumbResult<Vec<u8>> {
    let rgb = paint::to_rgb_image(surface);
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(bytes)
}
