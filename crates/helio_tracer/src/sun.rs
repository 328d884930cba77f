//! Sun source: direction, irradiance and the aperture photons are launched from.

use helio_math::{Aabb, Ray, Vec3};
use rand::{Rng, RngCore};

/// Gap between the scene's bounding sphere and the aperture plane.
const APERTURE_OFFSET: f32 = 1.0;

/// A collimated sun.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sun {
    /// Unit direction in which sunlight travels
    direction: Vec3,
    /// Irradiance on a plane perpendicular to the sun (W/m^2)
    pub irradiance: f64,
}

impl Sun {
    /// Create a sun shining along `direction` (normalized here).
    pub fn new(direction: Vec3, irradiance: f64) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            irradiance,
        }
    }

    /// Sun at the given azimuth (clockwise from +Y, north) and elevation, in degrees. Z is up.
    pub fn from_angles(azimuth_deg: f32, elevation_deg: f32, irradiance: f64) -> Self {
        let (az, el) = (azimuth_deg.to_radians(), elevation_deg.to_radians());
        let to_sun = Vec3::new(az.sin() * el.cos(), az.cos() * el.cos(), el.sin());
        Self::new(-to_sun, irradiance)
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Square aperture perpendicular to the sun that illuminates all of `scene_box`.
    ///
    /// Must be recomputed whenever the sun moves or the scene changes.
    /// Returns `None` for an empty box or an undefined direction.
    pub fn aperture(&self, scene_box: &Aabb) -> Option<SunAperture> {
        if scene_box.is_empty() || self.direction == Vec3::ZERO {
            return None;
        }
        let radius = 0.5 * scene_box.diagonal();
        let (u, v) = self.direction.any_orthonormal_pair();
        Some(SunAperture {
            center: scene_box.centroid() - self.direction * (radius + APERTURE_OFFSET),
            u,
            v,
            half_width: radius,
            direction: self.direction,
        })
    }
}

/// The launch square of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunAperture {
    pub center: Vec3,
    u: Vec3,
    v: Vec3,
    pub half_width: f32,
    pub direction: Vec3,
}

impl SunAperture {
    pub fn area(&self) -> f64 {
        let side = 2.0 * self.half_width as f64;
        side * side
    }

    /// A ray from a uniform point of the aperture. Consumes two draws.
    pub fn sample_ray(&self, rng: &mut dyn RngCore) -> Ray {
        let a: f32 = rng.gen_range(-1.0..=1.0);
        let b: f32 = rng.gen_range(-1.0..=1.0);
        let origin = self.center + (a * self.u + b * self.v) * self.half_width;
        Ray::forward(origin, self.direction)
    }
}
