use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ThumbError, ThumbResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FontStyle {
    Impact,
    Cartoon,
    Modern,
    Bold,
    Clean,
}

impl FontStyle {
    pub const ALL: [FontStyle; 5] = [
        FontStyle::Impact,
        FontStyle::Cartoon,
        FontStyle::Modern,
        FontStyle::Bold,
        FontStyle::Clean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FontStyle::Impact => "IMPACT",
            FontStyle::Cartoon => "CARTOON",
            FontStyle::Modern => "MODERN",
            FontStyle::Bold => "BOLD",
            FontStyle::Clean => "CLEAN",
        }
    }

    /// Font family the style is rendered with.
    pub fn family(&self) -> &'static str {
        match self {
            FontStyle::Impact => "Anton",
            FontStyle::Cartoon => "Bangers",
            FontStyle::Modern => "Montserrat",
            FontStyle::Bold => "Roboto",
            FontStyle::Clean => "Lato",
        }
    }
}

impl FromStr for FontStyle {
    type Err = ThumbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let raw = value.trim();
        FontStyle::ALL
            .into_iter()
            .find(|font| {
                font.as_str().eq_ignore_ascii_case(raw) || font.family().eq_ignore_ascii_case(raw)
            })
            .ok_or_else(|| {
                ThumbError::config(format!(
                    "unknown font '{}' (expected one of IMPACT, CARTOON, MODERN, BOLD, CLEAN)",
                    raw
                ))
            })
    }
}

impl TryFrom<String> for FontStyle {
    type Error = ThumbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FontStyle> for String {
    fn from(value: FontStyle) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FontStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);
    pub const TRANSPARENT: Rgba = Rgba {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// `#rrggbb`, ignoring alpha.
    pub fn to_hex_rgb(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn alpha_f32(&self) -> f32 {
        self.a as f32 / 255.0
    }

    pub fn to_skia(&self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, self.a)
    }
}

impl FromStr for Rgba {
    type Err = ThumbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let raw = value.trim();
        let lower = raw.to_ascii_lowercase();
        match lower.as_str() {
            "transparent" => return Ok(Rgba::TRANSPARENT),
            "white" => return Ok(Rgba::WHITE),
            "black" => return Ok(Rgba::BLACK),
            _ => {}
        }
        let invalid = || ThumbError::config(format!("invalid color '{}'", raw));
        let hex = lower.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |slice: &str| u8::from_str_radix(slice, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let expand = |idx: usize| channel(&hex[idx..idx + 1].repeat(2));
                Ok(Rgba::opaque(expand(0)?, expand(1)?, expand(2)?))
            }
            6 | 8 => {
                let a = if hex.len() == 8 {
                    channel(&hex[6..8])?
                } else {
                    255
                };
                Ok(Rgba {
                    r: channel(&hex[0..2])?,
                    g: channel(&hex[2..4])?,
                    b: channel(&hex[4..6])?,
                    a,
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Rgba {
    type Error = ThumbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba> for String {
    fn from(value: Rgba) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "{}", self.to_hex_rgb())
        } else {
            write!(f, "{}{:02x}", self.to_hex_rgb(), self.a)
        }
    }
}

/// Appearance and placement of the single text overlay.
///
/// Every `with_*` setter is total: out-of-range numbers are clamped at the
/// point of mutation so renderers can trust what they read. Rotation and
/// scale are never clamped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleConfig {
    text: String,
    font: FontStyle,
    color: Rgba,
    opacity: f32,
    has_shadow: bool,
    shadow_color: Rgba,
    shadow_blur: f32,
    shadow_distance: f32,
    stroke: bool,
    stroke_color: Rgba,
    position_x: f32,
    position_y: f32,
    scale: f32,
    rotation: f32,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            text: "YOUR TITLE HERE".to_string(),
            font: FontStyle::Impact,
            color: Rgba::WHITE,
            opacity: 1.0,
            has_shadow: true,
            shadow_color: Rgba::BLACK,
            shadow_blur: 10.0,
            shadow_distance: 5.0,
            stroke: true,
            stroke_color: Rgba::BLACK,
            position_x: 50.0,
            position_y: 80.0,
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

impl StyleConfig {
    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn font(&self) -> FontStyle {
        self.font
    }
    pub fn color(&self) -> Rgba {
        self.color
    }
    pub fn opacity(&self) -> f32 {
        self.opacity
    }
    pub fn has_shadow(&self) -> bool {
        self.has_shadow
    }
    pub fn shadow_color(&self) -> Rgba {
        self.shadow_color
    }
    pub fn shadow_blur(&self) -> f32 {
        self.shadow_blur
    }
    pub fn shadow_distance(&self) -> f32 {
        self.shadow_distance
    }
    pub fn stroke(&self) -> bool {
        self.stroke
    }
    pub fn stroke_color(&self) -> Rgba {
        self.stroke_color
    }
    pub fn position_x(&self) -> f32 {
        self.position_x
    }
    pub fn position_y(&self) -> f32 {
        self.position_y
    }
    pub fn scale(&self) -> f32 {
        self.scale
    }
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Whether the overlay is drawn at all.
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_font(mut self, font: FontStyle) -> Self {
        self.font = font;
        self
    }

    pub fn with_color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = clamp_finite(opacity, 0.0, 1.0, 1.0);
        self
    }

    pub fn with_shadow(mut self, enabled: bool) -> Self {
        self.has_shadow = enabled;
        self
    }

    pub fn with_shadow_color(mut self, color: Rgba) -> Self {
        self.shadow_color = color;
        self
    }

    pub fn with_shadow_blur(mut self, blur: f32) -> Self {
        self.shadow_blur = clamp_finite(blur, 0.0, f32::MAX, 0.0);
        self
    }

    pub fn with_shadow_distance(mut self, distance: f32) -> Self {
        self.shadow_distance = clamp_finite(distance, 0.0, f32::MAX, 0.0);
        self
    }

    pub fn with_stroke(mut self, enabled: bool) -> Self {
        self.stroke = enabled;
        self
    }

    pub fn with_stroke_color(mut self, color: Rgba) -> Self {
        self.stroke_color = color;
        self
    }

    pub fn with_position_x(mut self, x: f32) -> Self {
        self.position_x = clamp_percent(x);
        self
    }

    pub fn with_position_y(mut self, y: f32) -> Self {
        self.position_y = clamp_percent(y);
        self
    }

    pub fn with_position(self, x: f32, y: f32) -> Self {
        self.with_position_x(x).with_position_y(y)
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = if scale.is_finite() { scale } else { 1.0 };
        self
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = if degrees.is_finite() { degrees } else { 0.0 };
        self
    }

    pub fn merge(self, patch: StylePatch) -> ThumbResult<Self> {
        let mut next = self;
        if let Some(text) = patch.text {
            next = next.with_text(text);
        }
        if let Some(font) = patch.font {
            next = next.with_font(font.parse()?);
        }
        if let Some(color) = patch.color {
            next = next.with_color(color.parse()?);
        }
        if let Some(opacity) = patch.opacity {
            next = next.with_opacity(opacity);
        }
        if let Some(enabled) = patch.has_shadow {
            next = next.with_shadow(enabled);
        }
        if let Some(color) = patch.shadow_color {
            next = next.with_shadow_color(color.parse()?);
        }
        if let Some(blur) = patch.shadow_blur {
            next = next.with_shadow_blur(blur);
        }
        if let Some(distance) = patch.shadow_distance {
            next = next.with_shadow_distance(distance);
        }
        if let Some(enabled) = patch.stroke {
            next = next.with_stroke(enabled);
        }
        if let Some(color) = patch.stroke_color {
            next = next.with_stroke_color(color.parse()?);
        }
        if let Some(x) = patch.position_x {
            next = next.with_position_x(x);
        }
        if let Some(y) = patch.position_y {
            next = next.with_position_y(y);
        }
        if let Some(scale) = patch.scale {
            next = next.with_scale(scale);
        }
        if let Some(rotation) = patch.rotation {
            next = next.with_rotation(rotation);
        }
        Ok(next)
    }

    pub fn from_toml_str(content: &str) -> ThumbResult<Self> {
        let patch: StylePatch = toml::from_str(content)
            .map_err(|err| ThumbError::config(format!("failed to parse style: {}", err)))?;
        StyleConfig::default().merge(patch)
    }
}

/// Partial style, as found in settings files, style files and CLI flags.
///
/// Colors and fonts stay strings here so a bad value surfaces as a
/// configuration error from [`StyleConfig::merge`] instead of a parse panic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StylePatch {
    pub text: Option<String>,
    pub font: Option<String>,
    pub color: Option<String>,
    pub opacity: Option<f32>,
    #[serde(alias = "hasShadow", alias = "shadow")]
    pub has_shadow: Option<bool>,
    #[serde(alias = "shadowColor")]
    pub shadow_color: Option<String>,
    #[serde(alias = "shadowBlur")]
    pub shadow_blur: Option<f32>,
    #[serde(alias = "shadowDistance")]
    pub shadow_distance: Option<f32>,
    pub stroke: Option<bool>,
    #[serde(alias = "strokeColor")]
    pub stroke_color: Option<String>,
    #[serde(alias = "positionX", alias = "x")]
    pub position_x: Option<f32>,
    #[serde(alias = "positionY", alias = "y")]
    pub position_y: Option<f32>,
    pub scale: Option<f32>,
    pub rotation: Option<f32>,
}

pub(crate) fn clamp_percent(value: f32) -> f32 {
    clamp_finite(value, 0.0, 100.0, 0.0)
}

fn clamp_finite(value: f32, min: f32, max: f32, nan_fallback: f32) -> f32 {
    if value.is_nan() {
        return nan_fallback;
    }
    value.clamp(min, max)
}
