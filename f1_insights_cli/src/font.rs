//! Chart fonts: registration of a system TrueType face for the sans-serif
//! family, and a drawing backend wrapper that keeps text visible when no face
//! is usable (headless machines without fonts).

use std::fs;
use std::panic;
use std::path::{Path, PathBuf};

use plotters::style::{register_font, FontStyle};
use plotters_backend::{
    text_anchor, BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend,
    DrawingErrorKind,
};
use tracing::{debug, warn};

const GLYPH_HEIGHT: usize = 7;
const SPACE_ADVANCE: i32 = 3;
const SANS_SERIF: &str = "sans-serif";

/// Regular and bold faces probed when no font is given on the command line.
const SYSTEM_FONTS: &[(&str, &str)] = &[
    (
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    ),
    (
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    ),
    (
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    ),
    ("/Library/Fonts/Arial.ttf", "/Library/Fonts/Arial Bold.ttf"),
    ("C:\\Windows\\Fonts\\arial.ttf", "C:\\Windows\\Fonts\\arialbd.ttf"),
];

/// Register a TrueType face for every style of the sans-serif family.
///
/// Returns the regular face that was registered, or `None` when chart text
/// will be drawn with the built-in bitmap glyphs.
pub fn register_chart_font(explicit: Option<&Path>) -> Option<PathBuf> {
    let candidates: Vec<(PathBuf, Option<PathBuf>)> = match explicit {
        Some(path) => vec![(path.to_path_buf(), None)],
        None => SYSTEM_FONTS
            .iter()
            .map(|(regular, bold)| (PathBuf::from(regular), Some(PathBuf::from(bold))))
            .collect(),
    };

    for (regular, bold) in candidates {
        let Ok(bytes) = fs::read(&regular) else {
            if explicit.is_some() {
                warn!("Unable to read font {}", regular.display());
            }
            continue;
        };
        // Registered faces must outlive every chart drawn by this process.
        let regular_face: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        if register_font(SANS_SERIF, FontStyle::Normal, regular_face).is_err() {
            warn!("{} is not a usable TrueType font", regular.display());
            continue;
        }
        let bold_face: &'static [u8] = bold
            .and_then(|path| fs::read(path).ok())
            .map(|bytes| &*Box::leak(bytes.into_boxed_slice()))
            .unwrap_or(regular_face);
        if register_font(SANS_SERIF, FontStyle::Bold, bold_face).is_err() {
            let _ = register_font(SANS_SERIF, FontStyle::Bold, regular_face);
        }
        let _ = register_font(SANS_SERIF, FontStyle::Italic, regular_face);
        let _ = register_font(SANS_SERIF, FontStyle::Oblique, regular_face);
        debug!("Chart font: {}", regular.display());
        return Some(regular);
    }

    warn!("No TrueType font found; chart text uses built-in bitmap glyphs");
    None
}

pub struct GlyphFallback<DB> {
    inner: DB,
}

impl<DB> GlyphFallback<DB> {
    pub fn new(inner: DB) -> Self {
        Self { inner }
    }
}

impl<DB: DrawingBackend> DrawingBackend for GlyphFallback<DB> {
    type ErrorType = DB::ErrorType;

    fn get_size(&self) -> (u32, u32) {
        self.inner.get_size()
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.ensure_prepared()
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.present()
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_pixel(point, color)
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_line(from, to, style)
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_rect(upper_left, bottom_right, style, fill)
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_path(path, style)
    }

    fn draw_circle<S: BackendStyle>(
        &mut self,
        center: BackendCoord,
        radius: u32,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_circle(center, radius, style, fill)
    }

    fn fill_polygon<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        vert: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.fill_polygon(vert, style)
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        let attempt =
            panic::catch_unwind(panic::AssertUnwindSafe(|| self.inner.draw_text(text, style, pos)));
        match attempt {
            Ok(Err(DrawingErrorKind::FontError(_))) | Err(_) => {
                self.draw_bitmap_text(text, style, pos)
            }
            Ok(result) => result,
        }
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        let attempt = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.inner.estimate_text_size(text, style)
        }));
        match attempt {
            Ok(Err(DrawingErrorKind::FontError(_))) | Err(_) => {
                let scale = (style.size() / GLYPH_HEIGHT as f64).max(1.0).round() as u32;
                let width: u32 = text.chars().map(|ch| advance(ch) as u32 * scale).sum();
                Ok((width, GLYPH_HEIGHT as u32 * scale))
            }
            Ok(result) => result,
        }
    }
}

impl<DB: DrawingBackend> GlyphFallback<DB> {
    fn draw_bitmap_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<DB::ErrorType>> {
        let color = style.color();
        if color.alpha == 0.0 || text.trim().is_empty() {
            return Ok(());
        }

        let scale = (style.size() / GLYPH_HEIGHT as f64).max(1.0).round() as i32;
        let width: i32 = text.chars().map(|ch| advance(ch) * scale).sum();
        let height = GLYPH_HEIGHT as i32 * scale;
        let anchor = style.anchor();
        let left = pos.0
            - match anchor.h_pos {
                text_anchor::HPos::Left => 0,
                text_anchor::HPos::Center => width / 2,
                text_anchor::HPos::Right => width,
            };
        let top = pos.1
            - match anchor.v_pos {
                text_anchor::VPos::Top => 0,
                text_anchor::VPos::Center => height / 2,
                text_anchor::VPos::Bottom => height,
            };

        let mut x = left;
        for ch in text.chars() {
            if let Some((glyph_width, rows)) = glyph(ch) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..glyph_width {
                        if bits & (1 << (glyph_width - 1 - col)) == 0 {
                            continue;
                        }
                        let px = x + col as i32 * scale;
                        let py = top + row as i32 * scale;
                        self.inner
                            .draw_rect((px, py), (px + scale - 1, py + scale - 1), &color, true)?;
                    }
                }
            }
            x += advance(ch) * scale;
        }
        Ok(())
    }
}

fn advance(ch: char) -> i32 {
    match glyph(ch) {
        Some((width, _)) => width as i32 + 1,
        None => SPACE_ADVANCE,
    }
}

/// 7-row bitmap glyphs, most significant bit leftmost. Lowercase maps to uppercase.
fn glyph(ch: char) -> Option<(u8, [u8; GLYPH_HEIGHT])> {
    let rows = match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x11, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x0A, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x11, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1E, 0x01, 0x01, 0x06, 0x01, 0x01, 0x1E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x0E, 0x11, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x11, 0x0E],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '>' => [0x10, 0x08, 0x04, 0x02, 0x04, 0x08, 0x10],
        '%' => [0x19, 0x19, 0x02, 0x04, 0x08, 0x13, 0x13],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        '|' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        '&' => [0x0C, 0x12, 0x14, 0x08, 0x15, 0x12, 0x0D],
        _ => return None,
    };
    Some((5, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyphs_fit_their_width() {
        for ch in ('A'..='Z').chain('0'..='9').chain("-%>/().,:'|&".chars()) {
            let (width, rows) = glyph(ch).unwrap_or_else(|| panic!("missing glyph {ch:?}"));
            assert!(rows.iter().all(|r| u32::from(*r) < (1 << width)), "{ch:?}");
        }
        assert_eq!(glyph('a'), glyph('A'));
        assert!(glyph('#').is_none());
        assert_eq!(advance(' '), SPACE_ADVANCE);
    }

    #[test]
    fn unreadable_explicit_font_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ttf");
        assert!(register_chart_font(Some(&missing)).is_none());

        let garbage = dir.path().join("garbage.ttf");
        fs::write(&garbage, b"not a font").unwrap();
        assert!(register_chart_font(Some(&garbage)).is_none());
    }
}
