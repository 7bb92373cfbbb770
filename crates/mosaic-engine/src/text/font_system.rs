use std::fmt;

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};

use crate::assets::{ImageKey, PixelBuffer};
use crate::paint::Color;

/// Error returned by [`FontSystem::load_font`].
#[derive(Debug, Clone)]
pub struct FontLoadError(pub String);

impl fmt::Display for FontLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "font load error: {}", self.0)
    }
}

impl std::error::Error for FontLoadError {}

/// Opaque handle to a font loaded into a [`FontSystem`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FontId(pub(crate) usize);

/// Owns the loaded fonts. Text leaves are rasterized into ordinary images so
/// they batch like any other textured card.
#[derive(Default)]
pub struct FontSystem {
    fonts: Vec<fontdue::Font>,
}

impl FontSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and stores a TrueType or OpenType font from raw bytes.
    pub fn load_font(&mut self, bytes: &[u8]) -> Result<FontId, FontLoadError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| FontLoadError(e.to_string()))?;
        let id = FontId(self.fonts.len());
        self.fonts.push(font);
        Ok(id)
    }

    pub(crate) fn get(&self, id: FontId) -> Option<&fontdue::Font> {
        self.fonts.get(id.0)
    }

    /// Image identity of a rendered line; equal inputs share one texture.
    pub fn text_key(text: &str, id: FontId, size: f32, color: Color) -> ImageKey {
        let [r, g, b, a] = color.to_rgba8();
        ImageKey::new(format!("text:{}:{size}:{r:02x}{g:02x}{b:02x}{a:02x}:{text}", id.0))
    }

    /// Lays out `text` on one line and rasterizes it.
    ///
    /// Coverage becomes alpha; RGB is the straight fill color. Returns `None`
    /// for an unknown font or text without visible glyphs.
    pub fn rasterize_line(&self, text: &str, id: FontId, size: f32, color: Color) -> Option<PixelBuffer> {
        let font = self.get(id)?;
        let mut layout: Layout<()> = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings::default());
        layout.append(&[font], &TextStyle::new(text, size, 0));

        let glyphs = layout.glyphs();
        let width = glyphs
            .iter()
            .map(|g| (g.x + g.width as f32).ceil())
            .fold(0.0f32, f32::max) as u32;
        let height = (layout.height().ceil() as u32).max(size.ceil() as u32);
        if width == 0 || height == 0 {
            return None;
        }

        let [r, g, b, a] = color.to_rgba8();
        let mut out = PixelBuffer::new(width, height);
        for glyph in glyphs {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let (_, coverage) = font.rasterize_config(glyph.key);
            let (gx, gy) = (glyph.x.round() as i64, glyph.y.round() as i64);
            for row in 0..glyph.height {
                for col in 0..glyph.width {
                    let cov = coverage[row * glyph.width + col];
                    if cov == 0 {
                        continue;
                    }
                    let (x, y) = (gx + col as i64, gy + row as i64);
                    if x < 0 || y < 0 {
                        continue;
                    }
                    let alpha = (cov as u16 * a as u16 / 255) as u8;
                    let prev = out.pixel(x as u32, y as u32)[3];
                    out.set_pixel(x as u32, y as u32, [r, g, b, prev.max(alpha)]);
                }
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut fonts = FontSystem::new();
        let err = fonts.load_font(b"not a font").unwrap_err();
        assert!(err.to_string().starts_with("font load error"));
    }

    #[test]
    fn unknown_font_rasterizes_nothing() {
        let fonts = FontSystem::new();
        assert!(fonts.rasterize_line("hi", FontId(3), 12.0, Color::from_u32(0xffffffff)).is_none());
    }

    #[test]
    fn text_key_distinguishes_color_and_size() {
        let white = Color::from_u32(0xffffffff);
        let red = Color::from_u32(0xff0000ff);
        let a = FontSystem::text_key("hi", FontId(0), 12.0, white);
        assert_ne!(a, FontSystem::text_key("hi", FontId(0), 12.0, red));
        assert_ne!(a, FontSystem::text_key("hi", FontId(0), 13.0, white));
        assert_eq!(a, FontSystem::text_key("hi", FontId(0), 12.0, white));
    }
}
