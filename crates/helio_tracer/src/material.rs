//! Surface materials for collector components.

use helio_core::{Material, ShapeHit};
use helio_math::{Ray, Vec3};
use rand::{Rng, RngCore};

/// Absorbs every photon. Used for receivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Absorber;

impl Material for Absorber {
    fn output_ray(&self, _ray_in: &Ray, _hit: &ShapeHit, _rng: &mut dyn RngCore) -> Option<Ray> {
        None
    }
}

/// Ideal mirror that reflects with probability `reflectivity` and absorbs otherwise.
///
/// Reflects about the world normal of the hit. Always consumes exactly one
/// uniform draw.
#[derive(Debug, Clone, Copy)]
pub struct SpecularMirror {
    reflectivity: f64,
}

impl SpecularMirror {
    pub fn new(reflectivity: f64) -> Self {
        Self {
            reflectivity: reflectivity.clamp(0.0, 1.0),
        }
    }

    pub fn reflectivity(&self) -> f64 {
        self.reflectivity
    }
}

impl Material for SpecularMirror {
    fn output_ray(&self, ray_in: &Ray, hit: &ShapeHit, rng: &mut dyn RngCore) -> Option<Ray> {
        let u: f64 = rng.gen();
        if u >= self.reflectivity {
            return None;
        }
        Some(Ray::forward(hit.point, reflect(ray_in.direction, hit.normal)))
    }
}

/// Reflect a vector off a surface with the given unit normal.
#[inline]
fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlatRectangle;
    use helio_core::{Geometry, Scene};
    use helio_math::{Quat, Transform};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn hit_on_floor() -> (Ray, ShapeHit) {
        let ray = Ray::forward(Vec3::new(-1.0, 0.0, 1.0), Vec3::new(1.0, 0.0, -1.0));
        let hit = ShapeHit::from_outward_normal(&ray, 1.0, Vec3::Z);
        (ray, hit)
    }

    #[test]
    fn test_perfect_mirror_reflects() {
        let (ray, hit) = hit_on_floor();
        let mut rng = StdRng::seed_from_u64(1);

        let out = SpecularMirror::new(1.0).output_ray(&ray, &hit, &mut rng).unwrap();
        assert!((out.origin - Vec3::ZERO).length() < 1e-6);
        assert!((out.direction - Vec3::new(1.0, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_black_mirror_and_absorber_absorb() {
        let (ray, hit) = hit_on_floor();
        let mut rng = StdRng::seed_from_u64(1);

        assert!(SpecularMirror::new(0.0).output_ray(&ray, &hit, &mut rng).is_none());
        assert!(Absorber.output_ray(&ray, &hit, &mut rng).is_none());
    }

    #[test]
    fn test_reflectivity_is_a_probability() {
        let (ray, hit) = hit_on_floor();
        let mirror = SpecularMirror::new(0.9);
        let mut rng = StdRng::seed_from_u64(5);

        let reflected = (0..10_000)
            .filter(|_| mirror.output_ray(&ray, &hit, &mut rng).is_some())
            .count();
        assert!((8_800..9_200).contains(&reflected));
        assert_eq!(SpecularMirror::new(1.7).reflectivity(), 1.0);
    }

    #[test]
    fn test_mirror_in_stretched_frame_reflects_about_world_normal() {
        // Facet tilted 45 degrees about Y inside a frame stretched 3x along X
        let mut scene = Scene::new("stretched", Geometry::group("Field"));
        let frame = scene.add_geometry(Geometry::group("Frame").with_transform(Transform {
            scale: Vec3::new(3.0, 1.0, 1.0),
            ..Transform::IDENTITY
        }));
        let facet = scene.add_geometry(
            Geometry::surface("Facet", FlatRectangle::new(1.0, 1.0))
                .with_transform(Transform::from_translation_rotation(
                    Vec3::ZERO,
                    Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
                ))
                .with_material(SpecularMirror::new(1.0)),
        );
        let frame_node = scene.instantiate(scene.root(), frame).unwrap();
        let facet_node = scene.instantiate(frame_node, facet).unwrap();
        scene.update().unwrap();

        let ray = Ray::forward(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        let hit = scene.intersect(&ray, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(hit.instance, facet_node);
        assert!(hit.point.length() < 1e-5);

        // Local +Z carried by the inverse transpose: (1, 0, 3) / sqrt(10)
        let normal = Vec3::new(1.0, 0.0, 3.0).normalize();
        assert!((hit.normal - normal).length() < 1e-4);

        let out = hit.ray_out.expect("perfect mirror reflects");
        assert!(out.origin.length() < 1e-5);
        assert!((out.direction - Vec3::new(0.6, 0.0, 0.8)).length() < 1e-4);
        let incidence = ray.direction.dot(hit.normal).abs();
        let reflection = out.direction.normalize().dot(hit.normal).abs();
        assert!((incidence - reflection).abs() < 1e-4);
    }
}
