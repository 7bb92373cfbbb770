/// Linear premultiplied RGBA color.
///
/// Invariant: `rgb` components are already multiplied by `a`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32, // premultiplied
    pub g: f32, // premultiplied
    pub b: f32, // premultiplied
    pub a: f32,
}

impl Color {
    #[inline]
    pub const fn transparent() -> Self {
        Self { r: 0.0, g: 0.0, b: 0.0, a: 0.0 }
    }

    #[inline]
    pub const fn from_premul(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a premultiplied color from straight alpha components.
    #[inline]
    pub fn from_straight(r: f32, g: f32, b: f32, a: f32) -> Self {
        let a = a.clamp(0.0, 1.0);
        Self {
            r: r.clamp(0.0, 1.0) * a,
            g: g.clamp(0.0, 1.0) * a,
            b: b.clamp(0.0, 1.0) * a,
            a,
        }
    }

    /// Creates a premultiplied color from straight RGBA bytes.
    #[inline]
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::from_straight(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, a as f32 / 255.0)
    }

    /// Creates a color from a packed `0xRRGGBBAA` value.
    #[inline]
    pub fn from_u32(rgba: u32) -> Self {
        let [r, g, b, a] = rgba.to_be_bytes();
        Self::from_rgba8(r, g, b, a)
    }

    /// Parses `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    ///
    /// Missing alpha means opaque. Returns `None` on any other shape.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

        let (r, g, b, a) = match hex.len() {
            3 => (nibble(0)?, nibble(1)?, nibble(2)?, 255),
            4 => (nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?),
            6 => (byte(0)?, byte(2)?, byte(4)?, 255),
            8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
            _ => return None,
        };
        Some(Self::from_rgba8(r, g, b, a))
    }

    /// Returns a straight-alpha representation. For `a == 0`, RGB is 0.
    #[inline]
    pub fn to_straight(self) -> (f32, f32, f32, f32) {
        if self.a <= 0.0 {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let inv = 1.0 / self.a;
            (self.r * inv, self.g * inv, self.b * inv, self.a)
        }
    }

    /// Straight-alpha RGBA bytes, the layout used by pixel buffers.
    pub fn to_rgba8(self) -> [u8; 4] {
        let (r, g, b, a) = self.to_straight();
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(r), q(g), q(b), q(a)]
    }

    pub(crate) fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color { r: self.r as f64, g: self.g as f64, b: self.b as f64, a: self.a as f64 }
    }
}

impl From<u32> for Color {
    fn from(rgba: u32) -> Self {
        Self::from_u32(rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hex_expands_nibbles() {
        assert_eq!(Color::parse_hex("#f00"), Some(Color::from_premul(1.0, 0.0, 0.0, 1.0)));
    }

    #[test]
    fn long_hex_with_alpha_is_premultiplied() {
        let c = Color::parse_hex("#ffffff00").unwrap();
        assert_eq!(c, Color::transparent());
        assert_eq!(Color::parse_hex("00ff00ff").unwrap().g, 1.0);
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert!(Color::parse_hex("#12345").is_none());
        assert!(Color::parse_hex("#zzz").is_none());
        assert!(Color::parse_hex("").is_none());
    }

    #[test]
    fn packed_u32_is_rrggbbaa() {
        assert_eq!(Color::from_u32(0x0000ffff), Color::from_premul(0.0, 0.0, 1.0, 1.0));
        assert_eq!(Color::from(0x00000000), Color::transparent());
    }

    #[test]
    fn rgba8_round_trip_of_opaque_color() {
        assert_eq!(Color::from_rgba8(10, 20, 30, 255).to_rgba8(), [10, 20, 30, 255]);
    }
}
