//! Flat rectangle in the local XY plane, the usual heliostat facet and receiver.

use helio_core::{Shape, ShapeHit};
use helio_math::{Aabb, Ray, Vec3};

/// A `width` x `height` rectangle centered at the origin with its front face toward +Z.
#[derive(Debug, Clone, Copy)]
pub struct FlatRectangle {
    pub width: f32,
    pub height: f32,
}

impl FlatRectangle {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

impl Shape for FlatRectangle {
    fn intersect(&self, ray: &Ray) -> Option<ShapeHit> {
        if ray.direction.z == 0.0 {
            return None;
        }
        let t = -ray.origin.z / ray.direction.z;
        if !ray.range.surrounds(t) {
            return None;
        }

        let p = ray.at(t);
        if p.x.abs() > 0.5 * self.width || p.y.abs() > 0.5 * self.height {
            return None;
        }
        Some(ShapeHit::from_outward_normal(ray, t, Vec3::Z))
    }

    fn bounding_box(&self) -> Aabb {
        let half = Vec3::new(0.5 * self.width, 0.5 * self.height, 0.0);
        Aabb::from_points(-half, half)
    }

    fn kind(&self) -> &'static str {
        "flat_rectangle"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_and_back() {
        let rect = FlatRectangle::new(2.0, 1.0);

        let down = Ray::forward(Vec3::new(0.5, 0.25, 3.0), Vec3::NEG_Z);
        let hit = rect.intersect(&down).unwrap();
        assert!((hit.t - 3.0).abs() < 1e-6);
        assert!(hit.front_face);
        assert_eq!(hit.normal, Vec3::Z);

        let up = Ray::forward(Vec3::new(0.5, 0.25, -3.0), Vec3::Z);
        let hit = rect.intersect(&up).unwrap();
        assert!(!hit.front_face);
        assert_eq!(hit.normal, Vec3::NEG_Z);
    }

    #[test]
    fn test_outside_edges_and_parallel_miss() {
        let rect = FlatRectangle::new(2.0, 1.0);

        assert!(rect
            .intersect(&Ray::forward(Vec3::new(1.5, 0.0, 1.0), Vec3::NEG_Z))
            .is_none());
        assert!(rect
            .intersect(&Ray::forward(Vec3::new(0.0, 0.0, 1.0), Vec3::X))
            .is_none());
        assert!(rect
            .intersect(&Ray::forward(Vec3::new(0.0, 0.0, -1.0), Vec3::NEG_Z))
            .is_none());
    }

    #[test]
    fn test_flat_box_is_padded() {
        let bbox = FlatRectangle::new(4.0, 2.0).bounding_box();
        assert!(!bbox.is_empty());
        assert!(bbox.z.size() > 0.0);
        assert_eq!(bbox.x.min, -2.0);
        assert_eq!(bbox.y.max, 1.0);
    }
}
