use crate::assets::PixelBuffer;
use crate::cache::Filter;

/// Luminance weights used by [`ColorMatrixFilter::saturation`].
const LUM: [f32; 3] = [0.3086, 0.6094, 0.0820];

/// A 4x5 color matrix on straight RGBA bytes, row-major.
///
/// Row `i` computes output channel `i` as
/// `r*m[i][0] + g*m[i][1] + b*m[i][2] + a*m[i][3] + m[i][4]`,
/// with the last column in byte units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrixFilter {
    pub matrix: [f32; 20],
}

impl Default for ColorMatrixFilter {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ColorMatrixFilter {
    #[rustfmt::skip]
    pub const IDENTITY: Self = Self {
        matrix: [
            1.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0,
        ],
    };

    pub fn new(matrix: [f32; 20]) -> Self {
        Self { matrix }
    }

    /// Adds `amount` (bytes) to red, green and blue.
    pub fn brightness(amount: f32) -> Self {
        let mut m = Self::IDENTITY;
        for row in 0..3 {
            m.matrix[row * 5 + 4] = amount;
        }
        m
    }

    /// Scales saturation: 0 is greyscale, 1 leaves colors alone, above 1 boosts.
    pub fn saturation(amount: f32) -> Self {
        let mut m = Self::IDENTITY;
        for row in 0..3 {
            for col in 0..3 {
                let keep = if row == col { amount } else { 0.0 };
                m.matrix[row * 5 + col] = LUM[col] * (1.0 - amount) + keep;
            }
        }
        m
    }

    /// Stretches channel values around mid-grey by `factor`.
    pub fn contrast(factor: f32) -> Self {
        let mut m = Self::IDENTITY;
        for row in 0..3 {
            m.matrix[row * 5 + row] = factor;
            m.matrix[row * 5 + 4] = 128.0 * (1.0 - factor);
        }
        m
    }

    /// The matrix that applies `self` and then `next`.
    pub fn then(&self, next: &Self) -> Self {
        let (a, b) = (&self.matrix, &next.matrix);
        let mut out = [0.0; 20];
        for i in 0..4 {
            for j in 0..5 {
                let mut v: f32 = (0..4).map(|k| b[i * 5 + k] * a[k * 5 + j]).sum();
                if j == 4 {
                    v += b[i * 5 + 4];
                }
                out[i * 5 + j] = v;
            }
        }
        Self { matrix: out }
    }
}

impl Filter for ColorMatrixFilter {
    fn apply_pixels(&self, pixels: &mut PixelBuffer) -> bool {
        let m = &self.matrix;
        for px in pixels.data_mut().chunks_exact_mut(4) {
            let src = [px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32];
            for (c, v) in px.iter_mut().enumerate() {
                let row = &m[c * 5..c * 5 + 5];
                let out = src[0] * row[0] + src[1] * row[1] + src[2] * row[2] + src[3] * row[3] + row[4];
                *v = out.round().clamp(0.0, 255.0) as u8;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(rgba: [u8; 4]) -> PixelBuffer {
        PixelBuffer::from_rgba(1, 1, rgba.to_vec()).unwrap()
    }

    #[test]
    fn identity_leaves_pixels_alone() {
        let mut p = px([1, 2, 3, 4]);
        ColorMatrixFilter::default().apply_pixels(&mut p);
        assert_eq!(p.pixel(0, 0), [1, 2, 3, 4]);
    }

    #[test]
    fn zero_saturation_is_greyscale() {
        let mut p = px([200, 100, 50, 255]);
        ColorMatrixFilter::saturation(0.0).apply_pixels(&mut p);
        assert_eq!(p.pixel(0, 0), [127, 127, 127, 255]);
    }

    #[test]
    fn channels_can_be_swapped() {
        #[rustfmt::skip]
        let swap = ColorMatrixFilter::new([
            0.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 0.0,
            1.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0,
        ]);
        let mut p = px([10, 20, 30, 40]);
        swap.apply_pixels(&mut p);
        assert_eq!(p.pixel(0, 0), [30, 20, 10, 40]);
    }

    #[test]
    fn brightness_clamps_and_spares_alpha() {
        let mut p = px([250, 0, 100, 128]);
        ColorMatrixFilter::brightness(10.0).apply_pixels(&mut p);
        assert_eq!(p.pixel(0, 0), [255, 10, 110, 128]);
    }

    #[test]
    fn then_composes_in_order() {
        let both = ColorMatrixFilter::brightness(10.0).then(&ColorMatrixFilter::brightness(20.0));
        assert_eq!(both, ColorMatrixFilter::brightness(30.0));

        let mut chained = px([100, 100, 100, 255]);
        ColorMatrixFilter::contrast(2.0).then(&ColorMatrixFilter::brightness(5.0)).apply_pixels(&mut chained);
        assert_eq!(chained.pixel(0, 0), [77, 77, 77, 255]);
    }
}
