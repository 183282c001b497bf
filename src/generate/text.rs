//! Plain-text previews: the first few lines drawn on a page.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use ab_glyph::FontArc;
use image::{Rgba, RgbaImage};

use super::canvas::{fill_rect, TextPainter};
use super::{FileCategory, GenerationError, Generator};

/// Default number of lines shown.
pub const DEFAULT_TEXT_LINES: usize = 8;

/// Only this much of the file is read.
const READ_LIMIT: u64 = 64 * 1024;

const TAB_WIDTH: usize = 4;

const PAGE: Rgba<u8> = Rgba([250, 250, 250, 255]);
const BORDER: Rgba<u8> = Rgba([190, 190, 190, 255]);
const INK: Rgba<u8> = Rgba([40, 40, 40, 255]);

/// Renders leading lines of a text file, centre-aligned.
#[derive(Clone)]
pub struct TextGenerator {
    painter: TextPainter,
    lines: usize,
}

impl TextGenerator {
    /// Generator drawing `lines` lines with `font` (block glyphs if `None`).
    #[must_use]
    pub fn new(font: Option<FontArc>, lines: usize) -> Self {
        Self {
            painter: TextPainter::new(font),
            lines: lines.max(1),
        }
    }
}

impl Generator for TextGenerator {
    fn category(&self) -> FileCategory {
        FileCategory::Text
    }

    fn generate(&self, path: &Path, size: u32) -> Result<RgbaImage, GenerationError> {
        let mut bytes = Vec::new();
        File::open(path)
            .and_then(|f| f.take(READ_LIMIT).read_to_end(&mut bytes))
            .map_err(|e| GenerationError::io(path, e))?;

        let lines = leading_lines(&String::from_utf8_lossy(&bytes), self.lines);
        Ok(self.render(&lines, size))
    }
}

impl TextGenerator {
    fn render(&self, lines: &[String], size: u32) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(size, size, PAGE);
        let s = i64::from(size);
        fill_rect(&mut canvas, 0, 0, s, 1, BORDER);
        fill_rect(&mut canvas, 0, s - 1, s, s, BORDER);
        fill_rect(&mut canvas, 0, 0, 1, s, BORDER);
        fill_rect(&mut canvas, s - 1, 0, s, s, BORDER);

        let margin = (size as f32 * 0.08).max(2.0);
        let usable = size as f32 - 2.0 * margin;
        let line_height = (usable / self.lines as f32).max(1.0);
        let px = (line_height * 0.85).max(1.0);

        for (i, line) in lines.iter().enumerate() {
            let top = margin + i as f32 * line_height;
            let fitted = self.painter.truncate_to_width(line, px, usable);
            self.painter
                .draw_centered(&mut canvas, &fitted, margin, margin + usable, top, px, INK);
        }
        canvas
    }
}

/// First `count` lines of `text`, tabs expanded and trailing whitespace
/// trimmed.
fn leading_lines(text: &str, count: usize) -> Vec<String> {
    text.lines()
        .take(count)
        .map(|line| expand_tabs(line).trim_end().to_string())
        .collect()
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut column = 0;
    for c in line.chars() {
        if c == '\t' {
            let pad = TAB_WIDTH - column % TAB_WIDTH;
            out.extend(std::iter::repeat(' ').take(pad));
            column += pad;
        } else if !c.is_control() {
            out.push(c);
            column += 1;
        }
    }
    out
}
