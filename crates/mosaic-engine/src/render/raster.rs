//! CPU rasterization: textured triangles, compositing, and a small 2D canvas.
//!
//! Used by raster cache surfaces, the immediate-mode painter and the headless
//! backend. Sampling is nearest-neighbour; pixel centers sit at `+0.5`.

use crate::assets::PixelBuffer;
use crate::coords::{Matrix2D, Rect, Vec2};
use crate::error::{RenderError, Result};
use crate::scene::UvRect;

/// Porter-Duff style operation used when drawing onto a canvas.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum CompositeOp {
    #[default]
    SourceOver,
    SourceAtop,
    /// Keeps destination where the source is opaque; clears it elsewhere.
    DestinationIn,
    DestinationOut,
    /// Replaces the destination; clears it outside the source.
    Copy,
    Lighter,
}

impl CompositeOp {
    /// Operations that also affect pixels the source does not cover.
    fn clears_uncovered(self) -> bool {
        matches!(self, CompositeOp::DestinationIn | CompositeOp::Copy)
    }
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct TexVertex {
    pub pos: Vec2,
    pub u: f32,
    pub v: f32,
}

#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Pixels on an edge shared by two triangles belong to exactly one of them.
#[inline]
fn owns_edge(a: Vec2, b: Vec2) -> bool {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    dy > 0.0 || (dy == 0.0 && dx < 0.0)
}

/// Calls `plot(x, y, u, v)` for every pixel center of a `width`x`height`
/// target covered by `tri`.
pub(crate) fn raster_triangle(
    width: u32,
    height: u32,
    tri: [TexVertex; 3],
    mut plot: impl FnMut(u32, u32, f32, f32),
) {
    let [v0, mut v1, mut v2] = tri;
    let mut area = edge(v0.pos, v1.pos, v2.pos);
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut v1, &mut v2);
        area = -area;
    }

    let min_x = v0.pos.x.min(v1.pos.x).min(v2.pos.x).floor().max(0.0) as u32;
    let min_y = v0.pos.y.min(v1.pos.y).min(v2.pos.y).floor().max(0.0) as u32;
    let max_x = (v0.pos.x.max(v1.pos.x).max(v2.pos.x).ceil().max(0.0) as u32).min(width);
    let max_y = (v0.pos.y.max(v1.pos.y).max(v2.pos.y).ceil().max(0.0) as u32).min(height);

    let edges = [(v1.pos, v2.pos), (v2.pos, v0.pos), (v0.pos, v1.pos)];
    for y in min_y..max_y {
        for x in min_x..max_x {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w = [edge(v1.pos, v2.pos, p), edge(v2.pos, v0.pos, p), edge(v0.pos, v1.pos, p)];
            let inside = w.iter().zip(edges.iter()).all(|(&wi, &(a, b))| wi > 0.0 || (wi == 0.0 && owns_edge(a, b)));
            if !inside {
                continue;
            }
            let (b0, b1, b2) = (w[0] / area, w[1] / area, w[2] / area);
            let u = b0 * v0.u + b1 * v1.u + b2 * v2.u;
            let v = b0 * v0.v + b1 * v1.v + b2 * v2.v;
            plot(x, y, u, v);
        }
    }
}

/// Nearest sample at normalized `(u, v)`, clamped to the edge.
#[inline]
pub(crate) fn sample_nearest(src: &PixelBuffer, u: f32, v: f32) -> [u8; 4] {
    if src.is_empty() {
        return [0; 4];
    }
    let x = ((u * src.width() as f32).floor().max(0.0) as u32).min(src.width() - 1);
    let y = ((v * src.height() as f32).floor().max(0.0) as u32).min(src.height() - 1);
    src.pixel(x, y)
}

#[inline]
fn to_premul(px: [u8; 4]) -> [f32; 4] {
    let a = px[3] as f32 / 255.0;
    [px[0] as f32 / 255.0 * a, px[1] as f32 / 255.0 * a, px[2] as f32 / 255.0 * a, a]
}

#[inline]
fn from_premul(c: [f32; 4]) -> [u8; 4] {
    let a = c[3].clamp(0.0, 1.0);
    if a <= 0.0 {
        return [0; 4];
    }
    let q = |v: f32| ((v / a).clamp(0.0, 1.0) * 255.0).round() as u8;
    [q(c[0]), q(c[1]), q(c[2]), (a * 255.0).round() as u8]
}

/// Composites straight-alpha `src` (scaled by `alpha`) onto straight-alpha `dst`.
pub(crate) fn composite(dst: [u8; 4], src: [u8; 4], alpha: f32, op: CompositeOp) -> [u8; 4] {
    let mut s = to_premul(src);
    for c in &mut s {
        *c *= alpha;
    }
    let d = to_premul(dst);
    let (sa, da) = (s[3], d[3]);
    let out = match op {
        CompositeOp::SourceOver => std::array::from_fn(|i| s[i] + d[i] * (1.0 - sa)),
        CompositeOp::SourceAtop => std::array::from_fn(|i| {
            if i == 3 { da } else { s[i] * da + d[i] * (1.0 - sa) }
        }),
        CompositeOp::DestinationIn => std::array::from_fn(|i| d[i] * sa),
        CompositeOp::DestinationOut => std::array::from_fn(|i| d[i] * (1.0 - sa)),
        CompositeOp::Copy => s,
        CompositeOp::Lighter => std::array::from_fn(|i| (s[i] + d[i]).min(1.0)),
    };
    from_premul(out)
}

/// Draws `src` (restricted to `uv`) onto `dst` as the quad `(l, t, r, b)`
/// transformed by `m`, marking touched pixels in `coverage` when given.
#[allow(clippy::too_many_arguments)]
fn draw_quad_into(
    dst: &mut PixelBuffer,
    src: &PixelBuffer,
    uv: UvRect,
    quad: (f32, f32, f32, f32),
    m: &Matrix2D,
    alpha: f32,
    op: CompositeOp,
    coverage: Option<&mut Vec<bool>>,
) {
    let (l, t, r, b) = quad;
    let tl = TexVertex { pos: m.transform_point(l, t), u: uv.left, v: uv.top };
    let bl = TexVertex { pos: m.transform_point(l, b), u: uv.left, v: uv.bottom };
    let tr = TexVertex { pos: m.transform_point(r, t), u: uv.right, v: uv.top };
    let br = TexVertex { pos: m.transform_point(r, b), u: uv.right, v: uv.bottom };

    let (w, h) = (dst.width(), dst.height());
    let mut coverage = coverage;
    for tri in [[tl, bl, tr], [bl, tr, br]] {
        raster_triangle(w, h, tri, |x, y, u, v| {
            let s = sample_nearest(src, u, v);
            let d = dst.pixel(x, y);
            dst.set_pixel(x, y, composite(d, s, alpha, op));
            if let Some(mask) = coverage.as_deref_mut() {
                mask[(y * w + x) as usize] = true;
            }
        });
    }
}

/// Software 2D drawing context backed by a [`PixelBuffer`].
///
/// Drawing an unreadable source taints the canvas; a tainted canvas can still
/// be drawn and sampled but refuses `get_image_data`.
#[derive(Debug, Clone)]
pub struct RasterCanvas {
    pixels: PixelBuffer,
    transform: Matrix2D,
    global_alpha: f32,
    composite: CompositeOp,
    tainted: bool,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: PixelBuffer::new(width, height),
            transform: Matrix2D::IDENTITY,
            global_alpha: 1.0,
            composite: CompositeOp::SourceOver,
            tainted: false,
        }
    }

    pub fn from_pixels(pixels: PixelBuffer) -> Self {
        let tainted = !pixels.is_readable();
        Self { pixels, tainted, ..Self::new(0, 0) }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Resizes and clears, resetting the drawing state (like resizing a canvas element).
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pixels.reset(width, height);
        self.transform = Matrix2D::IDENTITY;
        self.global_alpha = 1.0;
        self.composite = CompositeOp::SourceOver;
        self.tainted = false;
    }

    pub fn clear(&mut self) {
        self.pixels.clear();
    }

    pub fn transform(&self) -> Matrix2D {
        self.transform
    }

    pub fn set_transform(&mut self, m: Matrix2D) {
        self.transform = m;
    }

    pub fn composite_op(&self) -> CompositeOp {
        self.composite
    }

    pub fn set_composite_op(&mut self, op: CompositeOp) {
        self.composite = op;
    }

    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.global_alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// Draws the `src_rect` region of `src` (whole image when `None`) into
    /// `dest`, both under the current transform.
    pub fn draw_image(&mut self, src: &PixelBuffer, src_rect: Option<Rect>, dest: Rect) {
        let uv = match src_rect {
            Some(r) => match UvRect::from_pixels(r, src.width(), src.height()) {
                Some(uv) => uv,
                None => return,
            },
            None => UvRect::FULL,
        };
        let quad = (dest.x(), dest.y(), dest.max().x, dest.max().y);
        let m = self.transform;
        self.draw_quad(src, uv, quad, &m, 1.0);
    }

    /// Draws a textured quad through `m` (which replaces the canvas transform).
    pub(crate) fn draw_quad(&mut self, src: &PixelBuffer, uv: UvRect, quad: (f32, f32, f32, f32), m: &Matrix2D, alpha: f32) {
        if !src.is_readable() {
            self.tainted = true;
        }
        let op = self.composite;
        let alpha = alpha * self.global_alpha;
        if op.clears_uncovered() {
            let mut mask = vec![false; self.pixels.width() as usize * self.pixels.height() as usize];
            draw_quad_into(&mut self.pixels, src, uv, quad, m, alpha, op, Some(&mut mask));
            let w = self.pixels.width();
            for (i, covered) in mask.into_iter().enumerate() {
                if !covered {
                    self.pixels.set_pixel(i as u32 % w, i as u32 / w, [0; 4]);
                }
            }
        } else {
            draw_quad_into(&mut self.pixels, src, uv, quad, m, alpha, op, None);
        }
    }

    /// Copies the pixels out. Fails on a tainted canvas.
    pub fn get_image_data(&self) -> Result<PixelBuffer> {
        if self.tainted {
            return Err(RenderError::Readback("canvas is tainted by an unreadable source".into()));
        }
        Ok(self.pixels.clone())
    }

    /// Replaces the pixels at the origin, ignoring transform and compositing.
    /// A buffer of a different size is clipped.
    pub fn put_image_data(&mut self, data: &PixelBuffer) {
        if data.width() == self.width() && data.height() == self.height() {
            self.pixels.data_mut().copy_from_slice(data.data());
            return;
        }
        for y in 0..data.height().min(self.height()) {
            for x in 0..data.width().min(self.width()) {
                self.pixels.set_pixel(x, y, data.pixel(x, y));
            }
        }
    }

    /// Pixels as drawn, regardless of taint (for uploading to a texture).
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }
}
