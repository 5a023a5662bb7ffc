use glam::Vec2;

/// Axis-aligned rectangle in pixels (top-left origin).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    #[inline]
    pub const fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        self.origin + self.size
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    /// Normalizes the rectangle so width/height are non-negative.
    #[inline]
    pub fn normalized(self) -> Self {
        let min = self.origin.min(self.max());
        let max = self.origin.max(self.max());
        Self::from_origin_size(min, max - min)
    }

    /// `true` if the rectangle lies inside `[0, dims]` on both axes.
    #[inline]
    pub fn fits_within(self, dims: Vec2) -> bool {
        let r = self.normalized();
        r.origin.cmpge(Vec2::ZERO).all() && r.max().cmple(dims).all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── normalized ────────────────────────────────────────────────────────

    #[test]
    fn normalized_positive_is_identity() {
        let rect = Rect::new(1.0, 2.0, 10.0, 20.0);
        assert_eq!(rect.normalized(), rect);
    }

    #[test]
    fn normalized_flips_negative_extents() {
        let n = Rect::new(10.0, 10.0, -4.0, -3.0).normalized();
        assert_eq!(n, Rect::new(6.0, 7.0, 4.0, 3.0));
    }

    // ── bounds ────────────────────────────────────────────────────────────

    #[test]
    fn zero_width_is_empty() {
        assert!(Rect::new(0.0, 0.0, 0.0, 5.0).is_empty());
        assert!(!Rect::new(0.0, 0.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn fits_within_is_inclusive_of_the_far_edge() {
        let dims = Vec2::new(200.0, 100.0);
        assert!(Rect::new(50.0, 25.0, 40.0, 30.0).fits_within(dims));
        assert!(Rect::new(0.0, 0.0, 200.0, 100.0).fits_within(dims));
        assert!(!Rect::new(180.0, 0.0, 40.0, 10.0).fits_within(dims));
        assert!(!Rect::new(-1.0, 0.0, 4.0, 4.0).fits_within(dims));
    }
}
