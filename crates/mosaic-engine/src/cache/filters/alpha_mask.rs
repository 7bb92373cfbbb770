use crate::assets::PixelBuffer;
use crate::cache::Filter;
use crate::coords::{Matrix2D, Rect};
use crate::render::{CompositeOp, RasterCanvas};

/// Keeps the surface only where `mask` is opaque, scaled by the mask's alpha.
///
/// The mask is drawn at the surface origin in surface pixels.
#[derive(Debug, Clone)]
pub struct AlphaMaskFilter {
    mask: PixelBuffer,
}

impl AlphaMaskFilter {
    pub fn new(mask: PixelBuffer) -> Self {
        Self { mask }
    }
}

impl Filter for AlphaMaskFilter {
    fn uses_context(&self) -> bool {
        true
    }

    fn apply_context(&self, canvas: &mut RasterCanvas) -> bool {
        if self.mask.is_empty() {
            return false;
        }
        let (op, m) = (canvas.composite_op(), canvas.transform());
        canvas.set_transform(Matrix2D::IDENTITY);
        canvas.set_composite_op(CompositeOp::DestinationIn);
        let dest = Rect::new(0.0, 0.0, self.mask.width() as f32, self.mask.height() as f32);
        canvas.draw_image(&self.mask, None, dest);
        canvas.set_composite_op(op);
        canvas.set_transform(m);
        true
    }
}
