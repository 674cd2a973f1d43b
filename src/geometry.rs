use tiny_skia::Transform;

use crate::style::StyleConfig;

pub const FONT_SIZE_RATIO: f64 = 0.15;
pub const STROKE_WIDTH_RATIO: f64 = 0.005;
pub const SHADOW_BLUR_REFERENCE_WIDTH: f64 = 1000.0;

/// Placement of the overlay inside a surface of a given size.
///
/// Both renderers derive every size-dependent number from here so the
/// preview container and an export surface only differ in their size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub surface_width: f32,
    pub surface_height: f32,
    pub anchor_x: f32,
    pub anchor_y: f32,
    pub rotation_deg: f32,
    pub scale: f32,
    pub font_size: f32,
    pub stroke_width: f32,
    /// Blur radius in surface pixels, relative to the surface width.
    pub shadow_blur: f32,
    /// Offset in surface pixels on both axes; never resolution scaled.
    pub shadow_offset: f32,
}

impl OverlayGeometry {
    pub fn new(style: &StyleConfig, width: u32, height: u32) -> Self {
        let w = width as f64;
        let h = height as f64;
        Self {
            surface_width: width as f32,
            surface_height: height as f32,
            anchor_x: (style.position_x() as f64 / 100.0 * w) as f32,
            anchor_y: (style.position_y() as f64 / 100.0 * h) as f32,
            rotation_deg: style.rotation(),
            scale: style.scale(),
            font_size: (h * FONT_SIZE_RATIO) as f32,
            stroke_width: (w * STROKE_WIDTH_RATIO) as f32,
            shadow_blur: (style.shadow_blur() as f64 * (w / SHADOW_BLUR_REFERENCE_WIDTH)) as f32,
            shadow_offset: style.shadow_distance(),
        }
    }

    /// Translate to the anchor, rotate, then scale.
    pub fn transform(&self) -> Transform {
        Transform::from_translate(self.anchor_x, self.anchor_y)
            .pre_rotate(self.rotation_deg)
            .pre_scale(self.scale, self.scale)
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        let mut points = [tiny_skia::Point::from_xy(x, y)];
        self.transform().map_points(&mut points);
        (points[0].x, points[0].y)
    }

    /// Same composition as [`Self::transform`], as an SVG attribute value.
    pub fn svg_transform(&self) -> String {
        format!(
            "translate({} {}) rotate({}) scale({})",
            self.anchor_x, self.anchor_y, self.rotation_deg, self.scale
        )
    }

    /// CSS form for a box positioned at `left/top` percentages.
    ///
    /// CSS applies `scale` before `rotate` around the element center; with a
    /// uniform scale the two commute, so the result matches the raster path.
    pub fn css_transform(&self) -> String {
        format!(
            "translate(-50%, -50%) scale({}) rotate({}deg)",
            self.scale, self.rotation_deg
        )
    }

    /// Axis-aligned bounds of a `width x height` box centered on the anchor,
    /// after rotation and scale.
    pub fn bounds_of_centered_box(&self, width: f32, height: f32) -> (f32, f32, f32, f32) {
        let hw = width / 2.0;
        let hh = height / 2.0;
        let corners = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for (x, y) in corners {
            let (px, py) = self.map_point(x, y);
            min_x = min_x.min(px);
            min_y = min_y.min(py);
            max_x = max_x.max(px);
            max_y = max_y.max(py);
        }
        (min_x, min_y, max_x, max_y)
    }
}
