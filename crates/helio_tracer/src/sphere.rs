//! Sphere shape, centered at the local origin.

use helio_core::{Shape, ShapeHit};
use helio_math::{Aabb, Ray, Vec3};

/// A sphere of the given radius around the local origin.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    radius: f32,
    bbox: Aabb,
}

impl Sphere {
    /// Create a new sphere. Negative radii are treated as zero.
    pub fn new(radius: f32) -> Self {
        let radius = radius.max(0.0);
        let rvec = Vec3::splat(radius);
        Self {
            radius,
            bbox: Aabb::from_points(-rvec, rvec),
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl Shape for Sphere {
    fn intersect(&self, ray: &Ray) -> Option<ShapeHit> {
        let oc = -ray.origin;
        let a = ray.direction.length_squared();
        let h = ray.direction.dot(oc);
        let c = oc.length_squared() - self.radius * self.radius;

        let discriminant = h * h - a * c;
        if discriminant < 0.0 || self.radius == 0.0 {
            return None;
        }

        let sqrtd = discriminant.sqrt();

        // Find the nearest root in the acceptable range
        let mut root = (h - sqrtd) / a;
        if !ray.range.surrounds(root) {
            root = (h + sqrtd) / a;
            if !ray.range.surrounds(root) {
                return None;
            }
        }

        let outward_normal = ray.at(root) / self.radius;
        Some(ShapeHit::from_outward_normal(ray, root, outward_normal))
    }

    fn bounding_box(&self) -> Aabb {
        self.bbox
    }

    fn kind(&self) -> &'static str {
        "sphere"
    }
}
