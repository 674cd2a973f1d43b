use image::imageops::{self, FilterType};
use tiny_skia::{
    ColorU8, FillRule, FilterQuality, Paint, Path, Pixmap, PixmapPaint, Rect, Stroke, Transform,
};

use super::shadow::{ShadowMask, shadow_radius, shadow_region, shadow_sigma};
use super::{OverlayPlan, ShadowPlan, TextPass};
use crate::error::{ThumbError, ThumbResult};
use crate::font::LoadedFont;

const CANVAS_MITER_LIMIT: f32 = 10.0;

/// Stretches `background` over the whole surface.
pub(super) fn draw_background(surface: &mut Pixmap, background: &image::RgbaImage) {
    let (width, height) = (surface.width(), surface.height());
    let resized;
    let source = if background.dimensions() == (width, height) {
        background
    } else {
        resized = imageops::resize(background, width, height, FilterType::Triangle);
        &resized
    };
    for (dst, src) in surface.pixels_mut().iter_mut().zip(source.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
}

pub(super) fn draw_overlay(
    surface: &mut Pixmap,
    overlay: &OverlayPlan,
    font: &LoadedFont,
) -> ThumbResult<()> {
    let scale = overlay.geometry.scale;
    if scale == 0.0 || !scale.is_finite() {
        return Ok(());
    }
    let Some(path) = font.text_path(&overlay.text, overlay.font_size()) else {
        return Ok(());
    };
    let transform = overlay.transform();
    for pass in &overlay.passes {
        draw_pass(surface, &path, transform, pass)?;
    }
    Ok(())
}

fn draw_pass(
    surface: &mut Pixmap,
    path: &Path,
    transform: Transform,
    pass: &TextPass,
) -> ThumbResult<()> {
    let mut layer = Pixmap::new(surface.width(), surface.height())
        .ok_or_else(|| ThumbError::render("cannot allocate text layer"))?;
    paint_pass(&mut layer, path, transform, pass);

    if let Some(shadow) = pass.shadow()
        && shadow.is_visible()
    {
        draw_shadow(surface, path, transform, pass, shadow)?;
    }

    let paint = PixmapPaint {
        opacity: pass.alpha(),
        ..PixmapPaint::default()
    };
    surface.draw_pixmap(0, 0, layer.as_ref(), &paint, Transform::identity(), None);
    Ok(())
}

fn text_stroke(width: f32) -> Stroke {
    Stroke {
        width,
        miter_limit: CANVAS_MITER_LIMIT,
        ..Stroke::default()
    }
}

fn paint_pass(target: &mut Pixmap, path: &Path, transform: Transform, pass: &TextPass) {
    let mut paint = Paint::default();
    paint.anti_alias = true;
    match pass {
        TextPass::Stroke { width, color, .. } => {
            paint.set_color(color.to_skia());
            target.stroke_path(path, &paint, &text_stroke(*width), transform, None);
        }
        TextPass::Fill { color, .. } => {
            paint.set_color(color.to_skia());
            target.fill_path(path, &paint, FillRule::Winding, transform, None);
        }
    }
}

/// Device-space box of everything `pass` paints, on or off the surface.
fn pass_bounds(path: &Path, transform: Transform, pass: &TextPass) -> Option<Rect> {
    let outline = match pass {
        TextPass::Stroke { width, .. } => path.stroke(&text_stroke(*width), 1.0)?,
        TextPass::Fill { .. } => path.clone(),
    };
    Some(outline.transform(transform)?.bounds())
}

/// Casts the pass as a tinted, blurred, offset shadow.
///
/// Blur and offset are in surface pixels and ignore the overlay transform,
/// as canvas shadows do.
fn draw_shadow(
    surface: &mut Pixmap,
    path: &Path,
    transform: Transform,
    pass: &TextPass,
    shadow: &ShadowPlan,
) -> ThumbResult<()> {
    let (width, height) = (surface.width(), surface.height());
    let sigma = shadow_sigma(shadow.blur, width, height);
    let Some(source) = pass_bounds(path, transform, pass) else {
        return Ok(());
    };
    let Some(region) = shadow_region(
        source,
        width,
        height,
        (shadow.offset_x, shadow.offset_y),
        shadow_radius(sigma),
    ) else {
        return Ok(());
    };

    let mut caster = Pixmap::new(region.width(), region.height())
        .ok_or_else(|| ThumbError::render("cannot allocate shadow layer"))?;
    let local = transform.post_translate(-(region.x() as f32), -(region.y() as f32));
    paint_pass(&mut caster, path, local, pass);

    let mut mask = ShadowMask::from_layer(&caster);
    if mask.is_empty() {
        return Ok(());
    }
    mask.blur(sigma);
    let tinted = mask
        .tinted(shadow.color)
        .ok_or_else(|| ThumbError::render("cannot allocate shadow tint"))?;

    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    surface.draw_pixmap(
        region.x(),
        region.y(),
        tinted.as_ref(),
        &paint,
        Transform::from_translate(shadow.offset_x, shadow.offset_y),
        None,
    );
    Ok(())
}

/// Flattens the surface over black, the way a canvas encodes JPEG.
pub(super) fn to_rgb_image(surface: &Pixmap) -> image::RgbImage {
    let mut rgb = image::RgbImage::new(surface.width(), surface.height());
    for (dst, src) in rgb.pixels_mut().zip(surface.pixels()) {
        *dst = image::Rgb([src.red(), src.green(), src.blue()]);
    }
    rgb
}
