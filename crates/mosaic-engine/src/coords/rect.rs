use super::Vec2;

/// Axis-aligned rectangle (top-left origin, +Y down).
///
/// Used for frame regions, cache regions and filter expansion bounds. Filter
/// bounds may carry a negative origin (expansion to the left/top).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub const ZERO: Rect = Rect::new(0.0, 0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    #[inline]
    pub fn x(self) -> f32 {
        self.origin.x
    }

    #[inline]
    pub fn y(self) -> f32 {
        self.origin.y
    }

    #[inline]
    pub fn width(self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.origin.x + self.size.x, self.origin.y + self.size.y)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    /// Grows the rectangle so it also covers `other` (union of both).
    #[inline]
    pub fn extend(self, other: Rect) -> Rect {
        let x0 = self.origin.x.min(other.origin.x);
        let y0 = self.origin.y.min(other.origin.y);
        let x1 = self.max().x.max(other.max().x);
        let y1 = self.max().y.max(other.max().y);
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Expands each edge outward by the given amounts.
    #[inline]
    pub fn pad(self, top: f32, left: f32, bottom: f32, right: f32) -> Rect {
        Rect::new(
            self.origin.x - left,
            self.origin.y - top,
            self.size.x + left + right,
            self.size.y + top + bottom,
        )
    }

    /// Multiplies origin and size by `s`.
    #[inline]
    pub fn scaled(self, s: f32) -> Rect {
        Rect::new(self.origin.x * s, self.origin.y * s, self.size.x * s, self.size.y * s)
    }

    #[inline]
    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let x0 = self.origin.x.max(other.origin.x);
        let y0 = self.origin.y.max(other.origin.y);
        let x1 = self.max().x.min(other.max().x);
        let y1 = self.max().y.min(other.max().y);
        let (w, h) = (x1 - x0, y1 - y0);
        if w <= 0.0 || h <= 0.0 { None } else { Some(Rect::new(x0, y0, w, h)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: f32, y: f32, w: f32, h: f32) -> Rect { Rect::new(x, y, w, h) }

    // ── extend ────────────────────────────────────────────────────────────

    #[test]
    fn extend_covers_both() {
        let u = r(-5.0, 0.0, 10.0, 10.0).extend(r(0.0, -3.0, 6.0, 6.0));
        assert_eq!(u, r(-5.0, -3.0, 11.0, 13.0));
    }

    #[test]
    fn extend_with_contained_is_identity() {
        let outer = r(0.0, 0.0, 100.0, 100.0);
        assert_eq!(outer.extend(r(10.0, 10.0, 5.0, 5.0)), outer);
    }

    #[test]
    fn extend_is_symmetric() {
        let a = r(3.0, 4.0, 2.0, 9.0);
        let b = r(-1.0, 6.0, 20.0, 1.0);
        assert_eq!(a.extend(b), b.extend(a));
    }

    // ── pad / scaled ──────────────────────────────────────────────────────

    #[test]
    fn pad_grows_every_edge() {
        assert_eq!(r(0.0, 0.0, 10.0, 10.0).pad(1.0, 2.0, 3.0, 4.0), r(-2.0, -1.0, 16.0, 14.0));
    }

    #[test]
    fn scaled_multiplies_origin_and_size() {
        assert_eq!(r(1.0, 2.0, 3.0, 4.0).scaled(2.0), r(2.0, 4.0, 6.0, 8.0));
    }

    // ── intersect / is_empty ──────────────────────────────────────────────

    #[test]
    fn intersect_overlapping() {
        let i = r(0.0, 0.0, 10.0, 10.0).intersect(r(5.0, 5.0, 10.0, 10.0)).unwrap();
        assert_eq!(i, r(5.0, 5.0, 5.0, 5.0));
    }

    #[test]
    fn intersect_touching_edge_returns_none() {
        assert!(r(0.0, 0.0, 10.0, 10.0).intersect(r(10.0, 0.0, 10.0, 10.0)).is_none());
    }

    #[test]
    fn is_empty_zero_size() {
        assert!(r(0.0, 0.0, 0.0, 5.0).is_empty());
        assert!(!r(0.0, 0.0, 1.0, 1.0).is_empty());
    }
}
