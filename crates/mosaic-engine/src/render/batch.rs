use crate::coords::Vec2;
use crate::scene::UvRect;

/// Two triangles per card.
pub const VERTICES_PER_CARD: usize = 6;

/// Why a batch was flushed. Logged at debug level and counted in [`BatchStats`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BatchReason {
    /// The next card would exceed `max_cards_per_batch`.
    VertexOverflow,
    /// Every texture slot is in use by the current batch.
    TextureOverflow,
    /// End of a scene walk.
    DrawFinish,
}

/// Counters for the draw calls issued since the last reset.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchStats {
    pub draw_calls: usize,
    pub cards: usize,
    pub vertex_overflows: usize,
    pub texture_overflows: usize,
    pub last_reason: Option<BatchReason>,
}

impl BatchStats {
    pub(crate) fn record(&mut self, reason: BatchReason, cards: usize) {
        self.draw_calls += 1;
        self.cards += cards;
        match reason {
            BatchReason::VertexOverflow => self.vertex_overflows += 1,
            BatchReason::TextureOverflow => self.texture_overflows += 1,
            BatchReason::DrawFinish => {}
        }
        self.last_reason = Some(reason);
    }
}

/// Fixed-capacity parallel vertex streams for one batch.
///
/// Storage is allocated once for `max_cards` cards and reused across
/// flushes; only the populated prefix is ever handed to the backend.
#[derive(Debug)]
pub struct BatchBuffer {
    positions: Vec<f32>,
    uvs: Vec<f32>,
    indices: Vec<f32>,
    alphas: Vec<f32>,
    cards: usize,
    max_cards: usize,
}

impl BatchBuffer {
    pub fn new(max_cards: usize) -> Self {
        let max_cards = max_cards.max(1);
        let vertices = max_cards * VERTICES_PER_CARD;
        Self {
            positions: vec![0.0; vertices * 2],
            uvs: vec![0.0; vertices * 2],
            indices: vec![0.0; vertices],
            alphas: vec![0.0; vertices],
            cards: 0,
            max_cards,
        }
    }

    #[inline]
    pub fn max_cards(&self) -> usize {
        self.max_cards
    }

    #[inline]
    pub fn cards(&self) -> usize {
        self.cards
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cards == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.cards >= self.max_cards
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.cards * VERTICES_PER_CARD
    }

    /// Appends one card. `corners` are `[top-left, bottom-left, top-right, bottom-right]`
    /// in target pixels. Returns `false` (and writes nothing) when full.
    pub fn push_card(&mut self, corners: [Vec2; 4], uv: UvRect, texture_index: usize, alpha: f32) -> bool {
        if self.is_full() {
            return false;
        }
        let [tl, bl, tr, br] = corners;
        let v1 = self.cards * VERTICES_PER_CARD;
        let v2 = v1 * 2;

        let pos = [tl, bl, tr, bl, tr, br];
        let tex = [
            (uv.left, uv.top),
            (uv.left, uv.bottom),
            (uv.right, uv.top),
            (uv.left, uv.bottom),
            (uv.right, uv.top),
            (uv.right, uv.bottom),
        ];
        for i in 0..VERTICES_PER_CARD {
            self.positions[v2 + i * 2] = pos[i].x;
            self.positions[v2 + i * 2 + 1] = pos[i].y;
            self.uvs[v2 + i * 2] = tex[i].0;
            self.uvs[v2 + i * 2 + 1] = tex[i].1;
        }
        self.indices[v1..v1 + VERTICES_PER_CARD].fill(texture_index as f32);
        self.alphas[v1..v1 + VERTICES_PER_CARD].fill(alpha);

        self.cards += 1;
        true
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions[..self.vertex_count() * 2]
    }

    pub fn uvs(&self) -> &[f32] {
        &self.uvs[..self.vertex_count() * 2]
    }

    pub fn indices(&self) -> &[f32] {
        &self.indices[..self.vertex_count()]
    }

    pub fn alphas(&self) -> &[f32] {
        &self.alphas[..self.vertex_count()]
    }

    /// Rewinds the write cursor. Stale data past the cursor is never read.
    pub fn reset(&mut self) {
        self.cards = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_card() -> [Vec2; 4] {
        [Vec2::new(0.0, 0.0), Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)]
    }

    #[test]
    fn card_writes_two_triangles() {
        let mut b = BatchBuffer::new(4);
        assert!(b.push_card(unit_card(), UvRect::FULL, 3, 0.5));
        assert_eq!(b.vertex_count(), 6);
        assert_eq!(
            b.positions(),
            &[0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0]
        );
        assert_eq!(b.uvs(), b.positions());
        assert_eq!(b.indices(), &[3.0; 6]);
        assert_eq!(b.alphas(), &[0.5; 6]);
    }

    #[test]
    fn full_buffer_rejects_cards() {
        let mut b = BatchBuffer::new(1);
        assert!(b.push_card(unit_card(), UvRect::FULL, 0, 1.0));
        assert!(b.is_full());
        assert!(!b.push_card(unit_card(), UvRect::FULL, 0, 1.0));
        assert_eq!(b.cards(), 1);
    }

    #[test]
    fn reset_exposes_only_new_cards() {
        let mut b = BatchBuffer::new(2);
        b.push_card(unit_card(), UvRect::FULL, 1, 1.0);
        b.push_card(unit_card(), UvRect::FULL, 1, 1.0);
        b.reset();
        assert!(b.positions().is_empty());
        b.push_card(unit_card(), UvRect::FULL, 0, 1.0);
        assert_eq!(b.indices(), &[0.0; 6]);
    }

    #[test]
    fn stats_count_overflow_reasons() {
        let mut s = BatchStats::default();
        s.record(BatchReason::VertexOverflow, 10);
        s.record(BatchReason::DrawFinish, 2);
        assert_eq!(s.draw_calls, 2);
        assert_eq!(s.cards, 12);
        assert_eq!(s.vertex_overflows, 1);
        assert_eq!(s.last_reason, Some(BatchReason::DrawFinish));
    }
}
