use anyhow::{Context, anyhow};
use resvg::render;
use serde::Serialize;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::debug;
use usvg::{Options, Tree, fontdb};

use crate::compositor::{ExportPlan, TextPass};
use crate::data::InlineImage;
use crate::error::{ThumbError, ThumbResult};
use crate::font::{LoadedFont, measure_text_width_px};
use crate::geometry::OverlayGeometry;
use crate::style::{StyleConfig, clamp_percent};

const PLACEHOLDER_FILL: &str = "#0f172a";
/// Padding around the draggable text box, in container pixels.
const HANDLE_PADDING: f32 = 8.0;
const LINE_HEIGHT: f32 = 1.25;

/// Screen-space box of the preview container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContainerRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ContainerRect {
    pub fn sized(width: u32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: width as f32,
            height: (width as f64 * 9.0 / 16.0).round() as f32,
        }
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }

    /// Pointer position as clamped percentages of the container.
    pub fn to_percent(&self, x: f32, y: f32) -> (f32, f32) {
        let px = (x - self.left) / self.width * 100.0;
        let py = (y - self.top) / self.height * 100.0;
        (clamp_percent(px), clamp_percent(py))
    }
}

/// Declarative style for the overlay element, as a layout engine consumes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OverlayElementStyle {
    pub position: &'static str,
    pub left: String,
    pub top: String,
    pub transform: String,
    pub font_family: String,
    pub font_weight: u16,
    pub font_size: String,
    pub color: String,
    pub opacity: f32,
    pub text_shadow: String,
    pub text_stroke: String,
    pub white_space: &'static str,
    pub cursor: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging,
}

#[derive(Debug, Clone)]
pub struct PreviewRenderer {
    container: ContainerRect,
    drag: DragState,
}

impl PreviewRenderer {
    pub fn new(container: ContainerRect) -> Self {
        Self {
            container,
            drag: DragState::Idle,
        }
    }

    pub fn container(&self) -> ContainerRect {
        self.container
    }

    pub fn set_container(&mut self, container: ContainerRect) {
        self.container = container;
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    pub fn is_dragging(&self) -> bool {
        self.drag == DragState::Dragging
    }

    fn geometry(&self, style: &StyleConfig) -> OverlayGeometry {
        let (width, height) = self.container.pixel_size();
        OverlayGeometry::new(style, width, height)
    }

    /// Screen-space bounds of the draggable overlay box.
    pub fn overlay_bounds(
        &self,
        style: &StyleConfig,
        font: Option<&LoadedFont>,
    ) -> Option<(f32, f32, f32, f32)> {
        if !style.has_text() {
            return None;
        }
        let geometry = self.geometry(style);
        let text_width = measure_text_width_px(style.text(), geometry.font_size, font);
        let box_w = text_width + HANDLE_PADDING * 2.0;
        let box_h = geometry.font_size * LINE_HEIGHT + HANDLE_PADDING * 2.0;
        let (min_x, min_y, max_x, max_y) = geometry.bounds_of_centered_box(box_w, box_h);
        Some((
            min_x + self.container.left,
            min_y + self.container.top,
            max_x + self.container.left,
            max_y + self.container.top,
        ))
    }

    /// Starts a drag when the pointer lands on the overlay. Returns whether
    /// dragging started.
    pub fn pointer_down(
        &mut self,
        x: f32,
        y: f32,
        style: &StyleConfig,
        font: Option<&LoadedFont>,
    ) -> bool {
        let Some((min_x, min_y, max_x, max_y)) = self.overlay_bounds(style, font) else {
            return false;
        };
        if x >= min_x && x <= max_x && y >= min_y && y <= max_y {
            self.drag = DragState::Dragging;
            debug!("drag started at ({:.1}, {:.1})", x, y);
            true
        } else {
            false
        }
    }

    /// While dragging, moves the overlay anchor under the pointer.
    pub fn pointer_move(&self, x: f32, y: f32, style: &StyleConfig) -> Option<StyleConfig> {
        if !self.is_dragging() {
            return None;
        }
        let (px, py) = self.container.to_percent(x, y);
        Some(style.clone().with_position(px, py))
    }

    pub fn pointer_up(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn pointer_leave(&mut self) {
        self.drag = DragState::Idle;
    }

    pub fn element_style(&self, style: &StyleConfig, family: &str) -> OverlayElementStyle {
        let geometry = self.geometry(style);
        let text_shadow = if style.has_shadow() {
            format!(
                "{d}px {d}px {b}px {c}",
                d = geometry.shadow_offset,
                b = geometry.shadow_blur,
                c = style.shadow_color()
            )
        } else {
            "none".to_string()
        };
        let text_stroke = if style.stroke() {
            format!("{}px {}", geometry.stroke_width, style.stroke_color())
        } else {
            "0px".to_string()
        };
        OverlayElementStyle {
            position: "absolute",
            left: format!("{}%", style.position_x()),
            top: format!("{}%", style.position_y()),
            transform: geometry.css_transform(),
            font_family: format!("\"{}\", sans-serif", family),
            font_weight: 900,
            font_size: format!("{}px", geometry.font_size),
            color: style.color().to_string(),
            opacity: style.opacity(),
            text_shadow,
            text_stroke,
            white_space: "nowrap",
            cursor: if self.is_dragging() { "grabbing" } else { "grab" },
        }
    }

    /// Scene document for the current background and style.
    pub fn scene_svg(
        &self,
        background: Option<&InlineImage>,
        style: &StyleConfig,
        family: &str,
    ) -> String {
        let (width, height) = self.container.pixel_size();
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        svg.push_str(&format!(
            r#"<rect x="0" y="0" width="{w}" height="{h}" fill="{fill}"/>"#,
            w = width,
            h = height,
            fill = PLACEHOLDER_FILL
        ));

        let Some(background) = background else {
            svg.push_str("</svg>");
            return svg;
        };
        let uri = background.to_data_uri();
        svg.push_str(&format!(
            r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="xMidYMid slice"/>"#,
            uri = uri,
            w = width,
            h = height
        ));

        let plan = ExportPlan::new(style, width, height);
        if let Some(overlay) = &plan.overlay {
            let transform = overlay.geometry.svg_transform();
            for (idx, pass) in overlay.passes.iter().enumerate() {
                svg.push_str(&pass_svg(
                    idx,
                    pass,
                    &overlay.text,
                    family,
                    overlay.font_size(),
                    &transform,
                    (width, height),
                ));
            }
        }

        svg.push_str("</svg>");
        svg
    }

    pub fn render_png(
        &self,
        background: Option<&InlineImage>,
        style: &StyleConfig,
        font: Option<&LoadedFont>,
    ) -> ThumbResult<Vec<u8>> {
        let family = font
            .map(|font| font.family().to_string())
            .unwrap_or_else(|| style.font().family().to_string());
        let svg = self.scene_svg(background, style, &family);
        render_svg_bytes(&svg, font.map(|font| font.data()))
            .map_err(|err| ThumbError::render(format!("{:#}", err)))
    }
}

fn pass_svg(
    idx: usize,
    pass: &TextPass,
    text: &str,
    family: &str,
    font_size: f32,
    transform: &str,
    (width, height): (u32, u32),
) -> String {
    let paint = match pass {
        TextPass::Stroke { width, color, .. } => format!(
            r#"fill="none" stroke="{}" stroke-opacity="{}" stroke-width="{}" stroke-linejoin="miter" stroke-miterlimit="10""#,
            color.to_hex_rgb(),
            color.alpha_f32(),
            width
        ),
        TextPass::Fill { color, .. } => format!(
            r#"fill="{}" fill-opacity="{}" stroke="none""#,
            color.to_hex_rgb(),
            color.alpha_f32()
        ),
    };
    let text_element = format!(
        r#"<text x="0" y="0" transform="{transform}" text-anchor="middle" dominant-baseline="central" font-family="{family}" font-weight="900" font-size="{size}" xml:space="preserve" {paint}>{text}</text>"#,
        transform = transform,
        family = escape_xml(&format!("'{}', sans-serif", family)),
        size = font_size,
        paint = paint,
        text = escape_xml(text)
    );

    let shadow = pass.shadow().filter(|shadow| shadow.is_visible());
    let alpha = pass.alpha();
    match shadow {
        Some(shadow) => {
            let filter_id = format!("pass-shadow-{}", idx);
            let filter = format!(
                r#"<filter id="{id}" filterUnits="userSpaceOnUse" x="0" y="0" width="{w}" height="{h}" color-interpolation-filters="sRGB"><feGaussianBlur in="SourceAlpha" stdDeviation="{sigma}"/><feOffset dx="{dx}" dy="{dy}" result="offset"/><feFlood flood-color="{color}" flood-opacity="{opacity}"/><feComposite in2="offset" operator="in" result="shadow"/><feComponentTransfer in="SourceGraphic" result="faded"><feFuncA type="linear" slope="{alpha}"/></feComponentTransfer><feMerge><feMergeNode in="shadow"/><feMergeNode in="faded"/></feMerge></filter>"#,
                id = filter_id,
                w = width,
                h = height,
                sigma = shadow.blur / 2.0,
                dx = shadow.offset_x,
                dy = shadow.offset_y,
                color = shadow.color.to_hex_rgb(),
                opacity = shadow.color.alpha_f32(),
                alpha = alpha
            );
            format!(
                r#"<defs>{filter}</defs><g filter="url(#{id})">{text}</g>"#,
                filter = filter,
                id = filter_id,
                text = text_element
            )
        }
        None if alpha < 1.0 => format!(r#"<g opacity="{}">{}</g>"#, alpha, text_element),
        None => text_element,
    }
}

pub fn render_svg_bytes(svg: &str, font_data: Option<&[u8]>) -> anyhow::Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    match font_data {
        Some(data) => {
            db.load_font_data(data.to_vec());
            let family = db
                .faces()
                .next()
                .and_then(|face| face.families.first())
                .map(|(name, _)| name.clone());
            if let Some(family) = family {
                db.set_sans_serif_family(family);
            }
        }
        None => db.load_system_fonts(),
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse preview SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
    pixmap
        .encode_png()
        .with_context(|| "failed to encode preview PNG")
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
