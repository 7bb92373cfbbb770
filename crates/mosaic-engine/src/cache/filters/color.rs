use crate::assets::PixelBuffer;
use crate::cache::Filter;

/// Per-channel `value * multiplier + offset` on straight RGBA bytes.
/// Offsets are in byte units (`-255..=255`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorFilter {
    pub multipliers: [f32; 4],
    pub offsets: [f32; 4],
}

impl Default for ColorFilter {
    fn default() -> Self {
        Self { multipliers: [1.0; 4], offsets: [0.0; 4] }
    }
}

impl ColorFilter {
    pub fn new(multipliers: [f32; 4], offsets: [f32; 4]) -> Self {
        Self { multipliers, offsets }
    }

    /// Multiplies RGB only.
    pub fn tint(r: f32, g: f32, b: f32) -> Self {
        Self { multipliers: [r, g, b, 1.0], ..Self::default() }
    }
}

impl Filter for ColorFilter {
    fn apply_pixels(&self, pixels: &mut PixelBuffer) -> bool {
        for px in pixels.data_mut().chunks_exact_mut(4) {
            for (c, v) in px.iter_mut().enumerate() {
                *v = (*v as f32 * self.multipliers[c] + self.offsets[c]).round().clamp(0.0, 255.0) as u8;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplies_then_offsets() {
        let mut p = PixelBuffer::from_rgba(1, 1, vec![100, 200, 50, 255]).unwrap();
        ColorFilter::new([0.5, 1.0, 2.0, 1.0], [10.0, 100.0, 0.0, -55.0]).apply_pixels(&mut p);
        assert_eq!(p.pixel(0, 0), [60, 255, 100, 200]);
    }

    #[test]
    fn default_is_identity() {
        let mut p = PixelBuffer::from_rgba(1, 1, vec![1, 2, 3, 4]).unwrap();
        ColorFilter::default().apply_pixels(&mut p);
        assert_eq!(p.pixel(0, 0), [1, 2, 3, 4]);
        assert!(ColorFilter::default().bounds().is_none());
    }
}
