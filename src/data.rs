use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::Path;

use crate::error::{ThumbError, ThumbResult};

pub const JPEG_MIME: &str = "image/jpeg";
pub const PNG_MIME: &str = "image/png";

/// Self-contained image payload, as produced by an image backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl InlineImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn from_base64(encoded: &str, mime: Option<&str>) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .with_context(|| "failed to decode base64 image payload")?;
        let mime = match mime.map(str::trim).filter(|value| !value.is_empty()) {
            Some(mime) => mime.to_string(),
            None => sniff_image_mime(&bytes).unwrap_or(JPEG_MIME).to_string(),
        };
        Ok(Self { bytes, mime })
    }

    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| anyhow!("not a data URI"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| anyhow!("data URI has no payload"))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| anyhow!("only base64 data URIs are supported"))?;
        Self::from_base64(payload, Some(mime))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image: {}", path.display()))?;
        let mime = sniff_image_mime(&bytes)
            .or_else(|| mime_from_extension(path))
            .ok_or_else(|| anyhow!("unable to detect image type for '{}'", path.display()))?;
        Ok(Self {
            bytes,
            mime: mime.to_string(),
        })
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }

    pub fn extension(&self) -> &'static str {
        extension_from_mime(&self.mime).unwrap_or("img")
    }

    /// Decodes the payload into a bitmap.
    pub fn decode(&self) -> ThumbResult<image::RgbaImage> {
        let decoded = image::load_from_memory(&self.bytes)?;
        let rgba = decoded.to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(ThumbError::render("background image is empty"));
        }
        Ok(rgba)
    }
}

pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    let kind = infer::get(bytes)?;
    let detected = kind.mime_type();
    detected.starts_with("image/").then_some(detected)
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some(PNG_MIME),
        "jpg" | "jpeg" => Some(JPEG_MIME),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

pub fn extension_from_mime(mime: &str) -> Option<&'static str> {
    match mime {
        PNG_MIME => Some("png"),
        JPEG_MIME | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> InlineImage {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    InlineImage::new(bytes, PNG_MIME)
}
