/// Drawing-buffer size in pixels.
///
/// The batch shader maps pixel positions to clip space with the projection
/// returned by [`Viewport::projection`].
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }

    /// Column-major 4x4 orthographic projection: `(0,0)` maps to the top-left
    /// corner and `(width,height)` to the bottom-right.
    pub fn projection(self) -> [[f32; 4]; 4] {
        let w = self.width.max(1.0);
        let h = self.height.max(1.0);
        [
            [2.0 / w, 0.0, 0.0, 0.0],
            [0.0, -2.0 / h, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [-1.0, 1.0, 0.0, 1.0],
        ]
    }
}
