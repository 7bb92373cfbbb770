use super::Vec2;

/// 2D affine transform.
///
/// ```text
/// | a  c  tx |
/// | b  d  ty |
/// | 0  0  1  |
/// ```
///
/// `append` post-multiplies, so appended transforms apply first to points
/// (child transforms are appended to their parent's concatenated matrix).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Matrix2D {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Matrix2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix2D {
    pub const IDENTITY: Matrix2D = Matrix2D::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    #[inline]
    pub const fn new(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    #[inline]
    pub const fn translation(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    #[inline]
    pub const fn scale(s: f32) -> Self {
        Self::new(s, 0.0, 0.0, s, 0.0, 0.0)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// `self = self * m`.
    pub fn append(&mut self, m: Matrix2D) -> &mut Self {
        let (a1, b1, c1, d1) = (self.a, self.b, self.c, self.d);
        if m.a != 1.0 || m.b != 0.0 || m.c != 0.0 || m.d != 1.0 {
            self.a = a1 * m.a + c1 * m.b;
            self.b = b1 * m.a + d1 * m.b;
            self.c = a1 * m.c + c1 * m.d;
            self.d = b1 * m.c + d1 * m.d;
        }
        self.tx += a1 * m.tx + c1 * m.ty;
        self.ty += b1 * m.tx + d1 * m.ty;
        self
    }

    /// Appends a display-object style transform.
    ///
    /// Rotation and skew are in degrees. The registration point is subtracted
    /// after scale/rotation so `(reg_x, reg_y)` lands on `(x, y)`.
    #[allow(clippy::too_many_arguments)]
    pub fn append_transform(
        &mut self,
        x: f32,
        y: f32,
        scale_x: f32,
        scale_y: f32,
        rotation: f32,
        skew_x: f32,
        skew_y: f32,
        reg_x: f32,
        reg_y: f32,
    ) -> &mut Self {
        let (cos, sin) = if rotation % 360.0 != 0.0 {
            let r = rotation.to_radians();
            (r.cos(), r.sin())
        } else {
            (1.0, 0.0)
        };

        if skew_x != 0.0 || skew_y != 0.0 {
            let (sx, sy) = (skew_x.to_radians(), skew_y.to_radians());
            self.append(Matrix2D::new(sy.cos(), sy.sin(), -sx.sin(), sx.cos(), x, y));
            self.append(Matrix2D::new(cos * scale_x, sin * scale_x, -sin * scale_y, cos * scale_y, 0.0, 0.0));
        } else {
            self.append(Matrix2D::new(cos * scale_x, sin * scale_x, -sin * scale_y, cos * scale_y, x, y));
        }

        if reg_x != 0.0 || reg_y != 0.0 {
            self.tx -= reg_x * self.a + reg_y * self.c;
            self.ty -= reg_x * self.b + reg_y * self.d;
        }
        self
    }

    /// Inverts in place. A singular matrix is left unchanged and `false` is returned.
    pub fn invert(&mut self) -> bool {
        let (a1, b1, c1, d1, tx1, ty1) = (self.a, self.b, self.c, self.d, self.tx, self.ty);
        let n = a1 * d1 - b1 * c1;
        if n == 0.0 || !n.is_finite() {
            return false;
        }
        self.a = d1 / n;
        self.b = -b1 / n;
        self.c = -c1 / n;
        self.d = a1 / n;
        self.tx = (c1 * ty1 - d1 * tx1) / n;
        self.ty = -(a1 * ty1 - b1 * tx1) / n;
        true
    }

    #[inline]
    pub fn transform_point(&self, x: f32, y: f32) -> Vec2 {
        Vec2::new(x * self.a + y * self.c + self.tx, x * self.b + y * self.d + self.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    #[test]
    fn translate_then_scale_applies_scale_first() {
        let mut m = Matrix2D::translation(10.0, 20.0);
        m.append(Matrix2D::scale(2.0));
        assert_eq!(m.transform_point(1.0, 1.0), Vec2::new(12.0, 22.0));
    }

    #[test]
    fn append_transform_moves_registration_point_onto_position() {
        let mut m = Matrix2D::IDENTITY;
        m.append_transform(50.0, 60.0, 2.0, 2.0, 0.0, 0.0, 0.0, 5.0, 5.0);
        assert_eq!(m.transform_point(5.0, 5.0), Vec2::new(50.0, 60.0));
    }

    #[test]
    fn rotation_is_in_degrees() {
        let mut m = Matrix2D::IDENTITY;
        m.append_transform(0.0, 0.0, 1.0, 1.0, 90.0, 0.0, 0.0, 0.0, 0.0);
        assert!(close(m.transform_point(1.0, 0.0), Vec2::new(0.0, 1.0)));
    }

    #[test]
    fn full_turn_is_exactly_identity() {
        let mut m = Matrix2D::IDENTITY;
        m.append_transform(0.0, 0.0, 1.0, 1.0, 360.0, 0.0, 0.0, 0.0, 0.0);
        assert!(m.is_identity());
    }

    #[test]
    fn invert_round_trips_a_point() {
        let mut m = Matrix2D::IDENTITY;
        m.append_transform(7.0, -3.0, 1.5, 0.5, 30.0, 10.0, 0.0, 2.0, 1.0);
        let p = m.transform_point(4.0, 9.0);
        let mut inv = m;
        assert!(inv.invert());
        assert!(close(inv.transform_point(p.x, p.y), Vec2::new(4.0, 9.0)));
    }

    #[test]
    fn singular_matrix_is_not_inverted() {
        let mut m = Matrix2D::scale(0.0);
        assert!(!m.invert());
        assert_eq!(m, Matrix2D::scale(0.0));
    }
}
