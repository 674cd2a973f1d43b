use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::{Path as SkiaPath, PathBuilder};
use tracing::{debug, warn};
use ttf_parser::{Face, OutlineBuilder, name_id};
use usvg::fontdb;

use crate::error::{ThumbError, ThumbResult};
use crate::style::FontStyle;

#[derive(Clone)]
pub struct LoadedFont {
    data: Arc<Vec<u8>>,
    face_index: u32,
    family: String,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    space_advance: u16,
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFont")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl LoadedFont {
    pub fn from_data(data: Vec<u8>, face_index: u32) -> Result<Self> {
        let face = Face::parse(&data, face_index)
            .map_err(|err| anyhow!("failed to parse font data ({})", err))?;
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let family = extract_family_name(&face).unwrap_or_else(|| "sans-serif".to_string());
        let ascender = face.ascender();
        let descender = face.descender();
        Ok(Self {
            data: Arc::new(data),
            face_index,
            family,
            units_per_em,
            ascender,
            descender,
            space_advance,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read font: {}", path.display()))?;
        Self::from_data(data, 0).with_context(|| format!("failed to parse font: {}", path.display()))
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, self.face_index).ok()
    }

    pub fn measure_width(&self, text: &str, font_size: f32) -> f32 {
        measure_text_width_px(text, font_size, Some(self))
    }

    /// Outline of `text` laid out on one line, centered horizontally on the
    /// origin with the middle of the em box on `y = 0`.
    pub fn text_path(&self, text: &str, font_size: f32) -> Option<SkiaPath> {
        let face = self.face()?;
        let scale = font_size / self.units_per_em as f32;
        let total_advance = self.advance_units(&face, text) as f32;
        let middle = (self.ascender as f32 + self.descender as f32) / 2.0;

        let mut builder = GlyphPathBuilder {
            builder: PathBuilder::new(),
            scale,
            offset_x: -total_advance * scale / 2.0,
            offset_y: middle * scale,
        };
        let mut pen = 0u32;
        for ch in text.chars().map(layout_char) {
            let glyph = face.glyph_index(ch);
            builder.offset_x = (pen as f32 - total_advance / 2.0) * scale;
            if let Some(glyph) = glyph {
                face.outline_glyph(glyph, &mut builder);
            }
            pen = pen.saturating_add(self.char_advance(&face, ch) as u32);
        }
        builder.builder.finish()
    }

    fn char_advance(&self, face: &Face<'_>, ch: char) -> u16 {
        if ch == ' ' {
            return self.space_advance;
        }
        face.glyph_index(ch)
            .and_then(|glyph| face.glyph_hor_advance(glyph))
            .unwrap_or(self.space_advance)
    }

    fn advance_units(&self, face: &Face<'_>, text: &str) -> u32 {
        text.chars()
            .map(|ch| self.char_advance(face, layout_char(ch)) as u32)
            .fold(0u32, |acc, advance| acc.saturating_add(advance))
    }
}

/// Tabs and line breaks lay out as plain spaces, as canvas text does.
fn layout_char(ch: char) -> char {
    if ch.is_ascii_whitespace() { ' ' } else { ch }
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl GlyphPathBuilder {
    fn px(&self, x: f32) -> f32 {
        self.offset_x + x * self.scale
    }

    fn py(&self, y: f32) -> f32 {
        self.offset_y - y * self.scale
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = (self.px(x), self.py(y));
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = (self.px(x), self.py(y));
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1, x, y) = (self.px(x1), self.py(y1), self.px(x), self.py(y));
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = (self.px(x1), self.py(y1));
        let (x2, y2) = (self.px(x2), self.py(y2));
        let (x, y) = (self.px(x), self.py(y));
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Fonts available to both renderers: system faces plus configured extras.
pub struct FontLibrary {
    db: fontdb::Database,
}

impl FontLibrary {
    pub fn new(font_paths: &[PathBuf], font_dirs: &[PathBuf]) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        for dir in font_dirs {
            db.load_fonts_dir(dir);
        }
        for path in font_paths {
            if let Err(err) = db.load_font_file(path) {
                warn!("failed to load font {}: {}", path.display(), err);
            }
        }
        debug!("font library loaded {} faces", db.len());
        Self { db }
    }

    pub fn system() -> Self {
        Self::new(&[], &[])
    }

    /// Heavy-weight face for `font`, falling back to any sans-serif face and
    /// then to whatever face is installed.
    pub fn resolve(&self, font: FontStyle) -> ThumbResult<LoadedFont> {
        let family = font.family();
        if let Some(loaded) = self.query(fontdb::Family::Name(family)) {
            return Ok(loaded);
        }
        warn!("font family '{}' not installed; falling back", family);
        if let Some(loaded) = self.query(fontdb::Family::SansSerif) {
            return Ok(loaded);
        }
        self.db
            .faces()
            .find_map(|face| self.load_face(face.id))
            .ok_or_else(|| ThumbError::render(format!("no font available to render '{}'", family)))
    }

    fn query(&self, family: fontdb::Family<'_>) -> Option<LoadedFont> {
        let families = [family];
        let query = fontdb::Query {
            families: &families,
            weight: fontdb::Weight::BLACK,
            ..Default::default()
        };
        let id = self.db.query(&query)?;
        self.load_face(id)
    }

    fn load_face(&self, id: fontdb::ID) -> Option<LoadedFont> {
        let (data, index) = self
            .db
            .with_face_data(id, |data, index| (data.to_vec(), index))?;
        LoadedFont::from_data(data, index).ok()
    }
}

pub(crate) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&LoadedFont>) -> f32 {
    if let Some(font) = font
        && let Some(face) = font.face()
    {
        let units = font.units_per_em.max(1) as f32;
        return font.advance_units(&face, text) as f32 * (font_size / units);
    }
    estimate_text_width_units(text) * font_size
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_uppercase() {
        0.62
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .map(layout_char)
        .map(estimate_char_units_for_width)
        .sum()
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_without_font_scales_with_size() {
        let small = measure_text_width_px("HELLO", 10.0, None);
        let large = measure_text_width_px("HELLO", 20.0, None);
        assert!(small > 0.0);
        assert!((large - small * 2.0).abs() < 1e-4);
    }

    #[test]
    fn resolved_font_outlines_are_centered() {
        let Ok(font) = FontLibrary::system().resolve(FontStyle::Impact) else {
            return;
        };
        let Some(path) = font.text_path("HH", 100.0) else {
            return;
        };
        let bounds = path.bounds();
        let center_x = (bounds.left() + bounds.right()) / 2.0;
        assert!(center_x.abs() < 20.0, "center_x = {}", center_x);
        assert!(bounds.top() < 0.0 && bounds.bottom() > 0.0);
    }

    #[test]
    fn line_breaks_lay_out_as_spaces() {
        assert_eq!(
            measure_text_width_px("BREAKING\nNEWS", 108.0, None),
            measure_text_width_px("BREAKING NEWS", 108.0, None)
        );
        let Ok(font) = FontLibrary::system().resolve(FontStyle::Impact) else {
            return;
        };
        let (Some(broken), Some(spaced)) = (
            font.text_path("A\nB", 108.0),
            font.text_path("A B", 108.0),
        ) else {
            return;
        };
        assert_eq!(broken.bounds(), spaced.bounds());
        assert_eq!(
            font.measure_width("A\tB", 108.0),
            font.measure_width("A B", 108.0)
        );
    }

    #[test]
    fn whitespace_has_no_outline() {
        let Ok(font) = FontLibrary::system().resolve(FontStyle::Clean) else {
            return;
        };
        assert!(font.text_path("   ", 40.0).is_none());
        assert!(font.measure_width("   ", 40.0) > 0.0);
    }
}
