use image::{GrayImage, Luma, imageops};
use tiny_skia::{IntRect, Pixmap, PremultipliedColorU8, Rect};

use crate::style::Rgba;

// Device coordinates past this are treated as unreachable.
const COORD_LIMIT: f32 = 16_777_216.0;

/// Gaussian sigma for a canvas `shadowBlur` of `blur` surface pixels.
///
/// A canvas blurs with half the blur value as its standard deviation. The
/// result is capped so the three-sigma kernel spans at most a quarter of the
/// surface's longer side; wider shadows are already flat at that point.
pub(super) fn shadow_sigma(blur: f32, surface_width: u32, surface_height: u32) -> f32 {
    if blur.is_nan() || blur <= 0.0 {
        return 0.0;
    }
    let longest = surface_width.max(surface_height) as f32;
    (blur / 2.0).min(longest / 12.0)
}

pub(super) fn shadow_radius(sigma: f32) -> u32 {
    if sigma.is_nan() || sigma <= 0.0 {
        return 0;
    }
    (sigma * 3.0).ceil().min(u32::MAX as f32) as u32
}

/// Part of device space whose shadow can land on the surface.
///
/// `source` is the device-space box of the painted text. The region keeps a
/// `radius + 1` margin for the blur and drops whatever the offset shadow could
/// never reach, including text that sits off the surface.
pub(super) fn shadow_region(
    source: Rect,
    surface_width: u32,
    surface_height: u32,
    offset: (f32, f32),
    radius: u32,
) -> Option<IntRect> {
    let pad = radius as f32 + 1.0;
    let left = (source.left() - pad).max(-offset.0 - pad);
    let top = (source.top() - pad).max(-offset.1 - pad);
    let right = (source.right() + pad).min(surface_width as f32 - offset.0 + pad);
    let bottom = (source.bottom() + pad).min(surface_height as f32 - offset.1 + pad);
    if !(left < right && top < bottom) {
        return None;
    }
    if [left, top, right, bottom]
        .iter()
        .any(|value| !value.is_finite() || value.abs() > COORD_LIMIT)
    {
        return None;
    }
    IntRect::from_ltrb(
        left.floor() as i32,
        top.floor() as i32,
        right.ceil() as i32,
        bottom.ceil() as i32,
    )
}

/// Alpha coverage cast by one text pass, before tinting.
pub(super) struct ShadowMask {
    coverage: GrayImage,
}

impl ShadowMask {
    pub(super) fn from_layer(layer: &Pixmap) -> Self {
        let alpha = layer.pixels().iter().map(|px| px.alpha()).collect();
        let coverage = GrayImage::from_raw(layer.width(), layer.height(), alpha)
            .unwrap_or_else(|| GrayImage::new(layer.width(), layer.height()));
        Self { coverage }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.coverage.pixels().all(|px| px.0[0] == 0)
    }

    pub(super) fn blur(&mut self, sigma: f32) {
        if shadow_radius(sigma) == 0 {
            return;
        }
        self.coverage = imageops::fast_blur(&self.coverage, sigma);
    }

    pub(super) fn coverage_at(&self, x: u32, y: u32) -> Option<u8> {
        self.coverage.get_pixel_checked(x, y).map(|Luma([value])| *value)
    }

    /// The mask painted in `color`, premultiplied.
    pub(super) fn tinted(&self, color: Rgba) -> Option<Pixmap> {
        let mut tinted = Pixmap::new(self.coverage.width(), self.coverage.height())?;
        let scale = |channel: u8, coverage: u8| {
            ((u32::from(channel) * u32::from(color.a) * u32::from(coverage) + 32_512) / 65_025) as u8
        };
        for (dst, Luma([coverage])) in tinted.pixels_mut().iter_mut().zip(self.coverage.pixels()) {
            let alpha = ((u32::from(color.a) * u32::from(*coverage) + 127) / 255) as u8;
            *dst = PremultipliedColorU8::from_rgba(
                scale(color.r, *coverage),
                scale(color.g, *coverage),
                scale(color.b, *coverage),
                alpha,
            )
            .unwrap_or(PremultipliedColorU8::TRANSPARENT);
        }
        Some(tinted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_layer(size: u32, from: f32, to: f32) -> Pixmap {
        let mut layer = Pixmap::new(size, size).unwrap();
        let mut paint = tiny_skia::Paint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        layer.fill_rect(
            Rect::from_ltrb(from, from, to, to).unwrap(),
            &paint,
            tiny_skia::Transform::identity(),
            None,
        );
        layer
    }

    #[test]
    fn sigma_is_half_the_blur_and_bounded() {
        assert_eq!(shadow_sigma(0.0, 1280, 720), 0.0);
        assert_eq!(shadow_sigma(f32::NAN, 1280, 720), 0.0);
        assert_eq!(shadow_sigma(12.8, 1280, 720), 6.4);
        let capped = shadow_sigma(f32::MAX, 1280, 720);
        assert!((capped - 1280.0 / 12.0).abs() < 1e-3);
        assert!(shadow_radius(capped) < 330);
    }

    #[test]
    fn region_keeps_blur_margin_and_drops_unreachable_area() {
        let text = Rect::from_ltrb(100.0, 40.0, 200.0, 80.0).unwrap();
        let region = shadow_region(text, 640, 360, (5.0, 5.0), 10).unwrap();
        assert_eq!(
            (region.left(), region.top(), region.right(), region.bottom()),
            (89, 29, 211, 91)
        );

        let far_left = Rect::from_ltrb(-500.0, 40.0, -400.0, 80.0).unwrap();
        assert!(shadow_region(far_left, 640, 360, (5.0, 5.0), 10).is_none());
    }

    #[test]
    fn off_surface_text_still_casts_into_view() {
        let text = Rect::from_ltrb(-30.0, 40.0, -2.0, 80.0).unwrap();
        let region = shadow_region(text, 640, 360, (20.0, 0.0), 0).unwrap();
        assert_eq!((region.left(), region.right()), (-21, -1));
    }

    #[test]
    fn blur_spreads_coverage_past_the_edge() {
        let mut mask = ShadowMask::from_layer(&square_layer(40, 15.0, 25.0));
        assert_eq!(mask.coverage_at(12, 20), Some(0));
        mask.blur(3.0);
        assert!(mask.coverage_at(12, 20).unwrap() > 0);
        assert!(mask.coverage_at(20, 20).unwrap() < 255);
        assert!(!mask.is_empty());
    }

    #[test]
    fn tint_scales_color_alpha_by_coverage() {
        let mask = ShadowMask::from_layer(&square_layer(8, 0.0, 8.0));
        let tinted = mask
            .tinted(Rgba {
                r: 255,
                g: 0,
                b: 0,
                a: 128,
            })
            .unwrap();
        let px = tinted.pixel(3, 3).unwrap();
        assert_eq!((px.red(), px.green(), px.alpha()), (128, 0, 128));

        let empty = ShadowMask::from_layer(&Pixmap::new(4, 4).unwrap());
        assert!(empty.is_empty());
    }
}
