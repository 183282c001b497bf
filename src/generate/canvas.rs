//! Drawing helpers shared by the generators.
//!
//! Everything works on [`RgbaImage`] with integer pixel coordinates. Shapes
//! are clipped to the canvas.

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

/// Fully transparent pixel.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Scale `source` down to fit a `size × size` square (keeping its aspect
/// ratio) and centre it on a transparent canvas. Sources already smaller than
/// the square are centred without upscaling.
#[must_use]
pub fn fit_to_square(source: &DynamicImage, size: u32) -> RgbaImage {
    fit_within(source, size, size)
}

/// Like [`fit_to_square`] but fits within `inner` pixels, still on a
/// `size × size` canvas.
#[must_use]
pub fn fit_within(source: &DynamicImage, inner: u32, size: u32) -> RgbaImage {
    let (w, h) = source.dimensions();
    let inner = inner.clamp(1, size.max(1));
    let scaled = if w > inner || h > inner {
        source.resize(inner, inner, FilterType::Lanczos3).into_rgba8()
    } else {
        source.to_rgba8()
    };

    let mut canvas = RgbaImage::from_pixel(size, size, TRANSPARENT);
    overlay_centered(&mut canvas, &scaled);
    canvas
}

/// Alpha-blend `top` onto the centre of `canvas`.
pub fn overlay_centered(canvas: &mut RgbaImage, top: &RgbaImage) {
    let x = (i64::from(canvas.width()) - i64::from(top.width())) / 2;
    let y = (i64::from(canvas.height()) - i64::from(top.height())) / 2;
    imageops::overlay(canvas, top, x, y);
}

/// Blend `color` over the pixel at `(x, y)` with extra `coverage` in `0..=1`.
pub fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    let alpha = (f32::from(color[3]) / 255.0) * coverage.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    let dst = canvas.get_pixel_mut(x as u32, y as u32);
    let dst_alpha = f32::from(dst[3]) / 255.0;
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);
    for c in 0..3 {
        let src = f32::from(color[c]) * alpha;
        let below = f32::from(dst[c]) * dst_alpha * (1.0 - alpha);
        dst[c] = ((src + below) / out_alpha.max(f32::EPSILON)).round() as u8;
    }
    dst[3] = (out_alpha * 255.0).round() as u8;
}

/// Fill the half-open rectangle `[x0, x1) × [y0, y1)`.
pub fn fill_rect(canvas: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    for y in y0.max(0)..y1.min(i64::from(canvas.height())) {
        for x in x0.max(0)..x1.min(i64::from(canvas.width())) {
            blend_pixel(canvas, x, y, color, 1.0);
        }
    }
}

/// Fill a rectangle with rounded corners of `radius` pixels.
pub fn fill_rounded_rect(
    canvas: &mut RgbaImage,
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
    radius: i64,
    color: Rgba<u8>,
) {
    let radius = radius.clamp(0, (x1 - x0).min(y1 - y0) / 2);
    for y in y0.max(0)..y1.min(i64::from(canvas.height())) {
        for x in x0.max(0)..x1.min(i64::from(canvas.width())) {
            let cx = if x < x0 + radius {
                x0 + radius
            } else if x >= x1 - radius {
                x1 - radius - 1
            } else {
                x
            };
            let cy = if y < y0 + radius {
                y0 + radius
            } else if y >= y1 - radius {
                y1 - radius - 1
            } else {
                y
            };
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy <= radius * radius {
                blend_pixel(canvas, x, y, color, 1.0);
            }
        }
    }
}

/// Fill a circle, or a ring when `inner_radius > 0`.
pub fn fill_circle(
    canvas: &mut RgbaImage,
    cx: f32,
    cy: f32,
    radius: f32,
    inner_radius: f32,
    color: Rgba<u8>,
) {
    let x0 = (cx - radius).floor() as i64;
    let x1 = (cx + radius).ceil() as i64;
    let y0 = (cy - radius).floor() as i64;
    let y1 = (cy + radius).ceil() as i64;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let d = (dx * dx + dy * dy).sqrt();
            let outer = (radius - d + 0.5).clamp(0.0, 1.0);
            let inner = if inner_radius > 0.0 {
                (d - inner_radius + 0.5).clamp(0.0, 1.0)
            } else {
                1.0
            };
            let coverage = outer.min(inner);
            if coverage > 0.0 {
                blend_pixel(canvas, x, y, color, coverage);
            }
        }
    }
}

/// Punch a fully transparent hole of `radius` around `(cx, cy)`.
pub fn clear_circle(canvas: &mut RgbaImage, cx: f32, cy: f32, radius: f32) {
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        if dx * dx + dy * dy <= radius * radius {
            *pixel = TRANSPARENT;
        }
    }
}

/// Text renderer backed by a font, or by block glyphs when none is available.
#[derive(Clone)]
pub struct TextPainter {
    font: Option<FontArc>,
}

impl TextPainter {
    /// Painter using `font`, or block glyphs for `None`.
    #[must_use]
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// Advance width of one character cell at `px` (used for truncation).
    #[must_use]
    pub fn cell_width(&self, px: f32) -> f32 {
        match &self.font {
            Some(font) => {
                let scaled = font.as_scaled(PxScale::from(px));
                scaled.h_advance(font.glyph_id('M'))
            }
            None => px * 0.6,
        }
    }

    /// Rendered width of `line` at `px`.
    #[must_use]
    pub fn line_width(&self, line: &str, px: f32) -> f32 {
        match &self.font {
            Some(font) => {
                let scaled = font.as_scaled(PxScale::from(px));
                line.chars().map(|c| scaled.h_advance(font.glyph_id(c))).sum()
            }
            None => line.chars().count() as f32 * self.cell_width(px),
        }
    }

    /// Draw `line` with its top-left at `(x, top)`.
    pub fn draw_line(
        &self,
        canvas: &mut RgbaImage,
        line: &str,
        x: f32,
        top: f32,
        px: f32,
        color: Rgba<u8>,
    ) {
        match &self.font {
            Some(font) => {
                let scaled = font.as_scaled(PxScale::from(px));
                let baseline = top + scaled.ascent();
                let mut caret = x;
                for c in line.chars() {
                    let id = font.glyph_id(c);
                    let glyph = id.with_scale_and_position(PxScale::from(px), point(caret, baseline));
                    caret += scaled.h_advance(id);
                    if let Some(outlined) = font.outline_glyph(glyph) {
                        let bounds = outlined.px_bounds();
                        outlined.draw(|gx, gy, coverage| {
                            let px_x = bounds.min.x as i64 + i64::from(gx);
                            let px_y = bounds.min.y as i64 + i64::from(gy);
                            blend_pixel(canvas, px_x, px_y, color, coverage);
                        });
                    }
                }
            }
            None => {
                let cell = self.cell_width(px);
                let glyph_h = (px * 0.6).max(1.0);
                let glyph_top = top + px * 0.25;
                for (i, c) in line.chars().enumerate() {
                    if c.is_whitespace() {
                        continue;
                    }
                    let gx0 = x + i as f32 * cell;
                    let gx1 = gx0 + (cell - 1.0).max(1.0);
                    fill_rect(
                        canvas,
                        gx0.round() as i64,
                        glyph_top.round() as i64,
                        gx1.round() as i64,
                        (glyph_top + glyph_h).round() as i64,
                        color,
                    );
                }
            }
        }
    }

    /// Draw `line` horizontally centred in `[left, right)`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_centered(
        &self,
        canvas: &mut RgbaImage,
        line: &str,
        left: f32,
        right: f32,
        top: f32,
        px: f32,
        color: Rgba<u8>,
    ) {
        let width = self.line_width(line, px);
        let x = left + ((right - left) - width).max(0.0) / 2.0;
        self.draw_line(canvas, line, x, top, px, color);
    }

    /// Cut `line` so it fits in `max_width` at `px`, marking cuts with `…`.
    #[must_use]
    pub fn truncate_to_width(&self, line: &str, px: f32, max_width: f32) -> String {
        if self.line_width(line, px) <= max_width {
            return line.to_string();
        }
        let mut out = String::new();
        for c in line.chars() {
            out.push(c);
            if self.line_width(&out, px) + self.cell_width(px) > max_width {
                out.pop();
                out.push('…');
                break;
            }
        }
        out
    }
}
