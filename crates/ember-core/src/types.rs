//! Basic value types shared across crates.

/// Size of a drawable surface in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    /// Create a new extent.
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero (e.g. a minimized window).
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width divided by height, or `1.0` for a degenerate extent.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_extent_detection() {
        assert!(Extent2D::new(0, 0).is_zero());
        assert!(Extent2D::new(800, 0).is_zero());
        assert!(Extent2D::new(0, 600).is_zero());
        assert!(!Extent2D::new(1, 1).is_zero());
    }

    #[test]
    fn aspect_ratio() {
        assert_relative_eq!(Extent2D::new(1280, 720).aspect_ratio(), 16.0 / 9.0);
        assert_relative_eq!(Extent2D::new(640, 0).aspect_ratio(), 1.0);
    }
}
