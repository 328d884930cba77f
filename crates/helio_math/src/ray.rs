use crate::{Interval, Vec3};

/// A ray segment in 3D space: origin, direction and valid parametric range.
///
/// The direction is not required to be normalized. Rays are moved between
/// coordinate frames with [`crate::Mat4Ext::transform_ray`], which keeps the
/// parameter `t` of every point unchanged.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub range: Interval,
}

impl Ray {
    /// Create a new ray.
    pub fn new(origin: Vec3, direction: Vec3, range: Interval) -> Self {
        Self {
            origin,
            direction,
            range,
        }
    }

    /// A ray over the default forward range.
    pub fn forward(origin: Vec3, direction: Vec3) -> Self {
        Self::new(origin, direction, Interval::FORWARD)
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Same ray with a different parametric range.
    pub fn with_range(&self, range: Interval) -> Self {
        Self { range, ..*self }
    }

    /// A ray that can never hit anything: zero or non-finite direction,
    /// non-finite origin, or an empty range.
    pub fn is_degenerate(&self) -> bool {
        !self.origin.is_finite()
            || !self.direction.is_finite()
            || self.direction.length_squared() == 0.0
            || self.range.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::forward(Vec3::ZERO, Vec3::X);

        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_ray_with_range() {
        let ray = Ray::forward(Vec3::ONE, Vec3::Y).with_range(Interval::new(0.0, 4.0));

        assert_eq!(ray.origin, Vec3::ONE);
        assert_eq!(ray.range.max, 4.0);
    }

    #[test]
    fn test_degenerate_rays() {
        assert!(Ray::forward(Vec3::ZERO, Vec3::ZERO).is_degenerate());
        assert!(Ray::forward(Vec3::ZERO, Vec3::new(f32::NAN, 0.0, 1.0)).is_degenerate());
        assert!(Ray::new(Vec3::ZERO, Vec3::Z, Interval::EMPTY).is_degenerate());
        assert!(!Ray::forward(Vec3::ZERO, Vec3::Z).is_degenerate());
    }
}
