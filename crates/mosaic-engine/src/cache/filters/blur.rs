use crate::assets::PixelBuffer;
use crate::cache::Filter;
use crate::coords::Rect;

/// Separable box blur. The horizontal pass runs as this filter; the vertical
/// pass is linked through [`Filter::next_pass`].
///
/// Radius is half the blur amount; `quality` (1 to 3) is the number of box
/// iterations, which approaches a gaussian as it grows.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurFilter {
    blur_x: f32,
    blur_y: f32,
    quality: u32,
    vertical: BlurPass,
}

#[derive(Debug, Clone, PartialEq)]
struct BlurPass {
    radius: usize,
    iterations: u32,
    horizontal: bool,
}

impl BlurPass {
    fn new(blur: f32, iterations: u32, horizontal: bool) -> Self {
        Self { radius: (blur.max(0.0) / 2.0) as usize, iterations, horizontal }
    }
}

impl BlurFilter {
    pub fn new(blur_x: f32, blur_y: f32, quality: u32) -> Self {
        let quality = quality.clamp(1, 3);
        Self { blur_x, blur_y, quality, vertical: BlurPass::new(blur_y, quality, false) }
    }

    pub fn blur_x(&self) -> f32 {
        self.blur_x
    }

    pub fn blur_y(&self) -> f32 {
        self.blur_y
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }
}

impl Filter for BlurFilter {
    fn bounds(&self) -> Option<Rect> {
        let (bx, by) = (self.blur_x.max(0.0), self.blur_y.max(0.0));
        if bx == 0.0 && by == 0.0 {
            return None;
        }
        let q = (self.quality as f32).powf(0.6) * 0.5;
        Some(Rect::new(-bx * q, -by * q, 2.0 * bx * q, 2.0 * by * q))
    }

    fn apply_pixels(&self, pixels: &mut PixelBuffer) -> bool {
        BlurPass::new(self.blur_x, self.quality, true).apply_pixels(pixels)
    }

    fn next_pass(&self) -> Option<&dyn Filter> {
        (self.vertical.radius > 0).then_some(&self.vertical as &dyn Filter)
    }
}

impl Filter for BlurPass {
    fn apply_pixels(&self, pixels: &mut PixelBuffer) -> bool {
        if self.radius == 0 || pixels.is_empty() {
            return false;
        }
        let (w, h) = (pixels.width() as usize, pixels.height() as usize);
        let mut buf: Vec<[f32; 4]> = pixels
            .data()
            .chunks_exact(4)
            .map(|p| {
                let a = p[3] as f32 / 255.0;
                [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, a]
            })
            .collect();

        // (line count, line length, line start stride, step along a line)
        let (lines, len, line_stride, step) = if self.horizontal { (h, w, w, 1) } else { (w, h, 1, w) };
        let r = self.radius;
        let norm = 1.0 / (2 * r + 1) as f32;
        let mut line = vec![[0.0f32; 4]; len];

        for _ in 0..self.iterations {
            for l in 0..lines {
                let base = l * line_stride;
                for (i, v) in line.iter_mut().enumerate() {
                    *v = buf[base + i * step];
                }
                let mut acc = [0.0f32; 4];
                for v in line.iter().take(r + 1) {
                    add(&mut acc, v, 1.0);
                }
                for i in 0..len {
                    buf[base + i * step] = acc.map(|c| c * norm);
                    if i + r + 1 < len {
                        add(&mut acc, &line[i + r + 1], 1.0);
                    }
                    if i >= r {
                        add(&mut acc, &line[i - r], -1.0);
                    }
                }
            }
        }

        for (dst, c) in pixels.data_mut().chunks_exact_mut(4).zip(&buf) {
            let a = c[3].clamp(0.0, 1.0);
            if a <= 0.0 {
                dst.copy_from_slice(&[0; 4]);
                continue;
            }
            let q = |v: f32| (v / a).round().clamp(0.0, 255.0) as u8;
            dst.copy_from_slice(&[q(c[0]), q(c[1]), q(c[2]), (a * 255.0).round() as u8]);
        }
        true
    }
}

#[inline]
fn add(acc: &mut [f32; 4], v: &[f32; 4], sign: f32) {
    for (a, b) in acc.iter_mut().zip(v) {
        *a += b * sign;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(w: u32, h: u32, x: u32, y: u32) -> PixelBuffer {
        let mut p = PixelBuffer::new(w, h);
        p.set_pixel(x, y, [200, 100, 0, 255]);
        p
    }

    #[test]
    fn horizontal_pass_spreads_along_rows() {
        let mut p = dot(5, 1, 2, 0);
        assert!(BlurFilter::new(2.0, 0.0, 1).apply_pixels(&mut p));
        assert_eq!(p.pixel(0, 0)[3], 0);
        assert_eq!(p.pixel(1, 0), [200, 100, 0, 85]);
        assert_eq!(p.pixel(2, 0)[3], 85);
        assert_eq!(p.pixel(3, 0)[3], 85);
        assert_eq!(p.pixel(4, 0)[3], 0);
    }

    #[test]
    fn vertical_pass_is_linked() {
        let f = BlurFilter::new(0.0, 2.0, 1);
        assert!(BlurFilter::new(2.0, 0.0, 1).next_pass().is_none());

        let mut p = dot(1, 3, 0, 1);
        assert!(!f.apply_pixels(&mut p));
        let vertical = f.next_pass().unwrap();
        assert!(vertical.apply_pixels(&mut p));
        assert_eq!(p.pixel(0, 0)[3], 85);
        assert_eq!(p.pixel(0, 2)[3], 85);
    }

    #[test]
    fn bounds_grow_with_quality() {
        let one = BlurFilter::new(10.0, 4.0, 1).bounds().unwrap();
        assert_eq!(one, Rect::new(-5.0, -2.0, 10.0, 4.0));
        let three = BlurFilter::new(10.0, 4.0, 3).bounds().unwrap();
        assert!(three.width() > one.width());
        assert!(BlurFilter::new(0.0, 0.0, 2).bounds().is_none());
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(BlurFilter::new(1.0, 1.0, 0).quality(), 1);
        assert_eq!(BlurFilter::new(1.0, 1.0, 9).quality(), 3);
    }
}
