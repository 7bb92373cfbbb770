use crate::assets::ImageKey;
use crate::coords::{Rect, Vec2};

/// Normalized texture coordinates of a frame inside its source image.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct UvRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl UvRect {
    pub const FULL: UvRect = UvRect { left: 0.0, top: 0.0, right: 1.0, bottom: 1.0 };

    /// Maps `rect` (source pixels) into `0..1` space of an `image_w`x`image_h` image.
    ///
    /// An image without area has no meaningful mapping and yields `None`.
    pub fn from_pixels(rect: Rect, image_w: u32, image_h: u32) -> Option<UvRect> {
        if image_w == 0 || image_h == 0 {
            return None;
        }
        let (w, h) = (image_w as f32, image_h as f32);
        Some(UvRect {
            left: rect.x() / w,
            top: rect.y() / h,
            right: (rect.x() + rect.width()) / w,
            bottom: (rect.y() + rect.height()) / h,
        })
    }
}

/// A sub-rectangle of a source image plus its registration point.
///
/// The UV rect is computed the first time the image size is known and then
/// reused for every later walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub image: ImageKey,
    pub rect: Rect,
    pub reg: Vec2,
    uv: Option<UvRect>,
}

impl Frame {
    pub fn new(image: impl Into<ImageKey>, rect: Rect) -> Self {
        Self { image: image.into(), rect, reg: Vec2::ZERO, uv: None }
    }

    pub fn with_reg(mut self, reg_x: f32, reg_y: f32) -> Self {
        self.reg = Vec2::new(reg_x, reg_y);
        self
    }

    /// Returns the memoized UV rect, computing it from the image size on first use.
    pub fn uv_rect(&mut self, image_w: u32, image_h: u32) -> Option<UvRect> {
        if self.uv.is_none() {
            self.uv = UvRect::from_pixels(self.rect, image_w, image_h);
        }
        self.uv
    }

    pub fn cached_uv(&self) -> Option<UvRect> {
        self.uv
    }

    /// Drops the memoized UV rect (the image was replaced).
    pub fn invalidate_uv(&mut self) {
        self.uv = None;
    }

    /// Local-space quad `(left, top, right, bottom)` relative to the registration point.
    pub fn local_quad(&self) -> (f32, f32, f32, f32) {
        (
            -self.reg.x,
            -self.reg.y,
            self.rect.width() - self.reg.x,
            self.rect.height() - self.reg.y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uv_rect_is_normalized() {
        let uv = UvRect::from_pixels(Rect::new(32.0, 0.0, 32.0, 16.0), 64, 32).unwrap();
        assert_eq!(uv, UvRect { left: 0.5, top: 0.0, right: 1.0, bottom: 0.5 });
    }

    #[test]
    fn zero_sized_image_has_no_uv() {
        let mut frame = Frame::new("sheet.png", Rect::new(0.0, 0.0, 8.0, 8.0));
        assert!(frame.uv_rect(0, 32).is_none());
        assert!(frame.cached_uv().is_none());
    }

    #[test]
    fn uv_is_memoized_after_first_computation() {
        let mut frame = Frame::new("sheet.png", Rect::new(0.0, 0.0, 8.0, 8.0));
        let first = frame.uv_rect(16, 16).unwrap();
        // A different size does not recompute until invalidated.
        assert_eq!(frame.uv_rect(32, 32), Some(first));
        frame.invalidate_uv();
        assert_eq!(frame.uv_rect(32, 32).unwrap().right, 0.25);
    }

    #[test]
    fn local_quad_honours_registration_point() {
        let frame = Frame::new("a", Rect::new(0.0, 0.0, 10.0, 20.0)).with_reg(5.0, 10.0);
        assert_eq!(frame.local_quad(), (-5.0, -10.0, 5.0, 10.0));
    }
}
