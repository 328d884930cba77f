//! Shared geometry: the local-intersection capability and the library that owns it.
//!
//! Instance nodes never own geometry. They hold a [`GeometryId`] into a
//! [`GeometryLibrary`], so one mirror facet can be placed hundreds of times.

use std::fmt;

use helio_math::{Aabb, Ray, Transform, Vec3};
use rand::RngCore;

/// Result of a shape intersection.
///
/// Shapes report it in their local frame; materials receive it in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeHit {
    /// Parameter t where the intersection occurs
    pub t: f32,
    /// Point of intersection
    pub point: Vec3,
    /// Surface normal at intersection (always points against the ray)
    pub normal: Vec3,
    /// Whether the ray hit the front face (outside) of the surface
    pub front_face: bool,
}

impl ShapeHit {
    /// Build a hit from the geometric outward normal.
    ///
    /// The stored normal is flipped to face the incoming ray and the
    /// front/back flag records which side was struck.
    pub fn from_outward_normal(ray: &Ray, t: f32, outward_normal: Vec3) -> Self {
        let front_face = ray.direction.dot(outward_normal) < 0.0;
        Self {
            t,
            point: ray.at(t),
            normal: if front_face {
                outward_normal
            } else {
                -outward_normal
            },
            front_face,
        }
    }
}

/// A geometric primitive that can be intersected in its own local frame.
pub trait Shape: Send + Sync {
    /// Nearest intersection strictly inside `ray.range`, if any.
    fn intersect(&self, ray: &Ray) -> Option<ShapeHit>;

    /// Local-frame bounds of the shape.
    fn bounding_box(&self) -> Aabb;

    /// Short type name used in logs.
    fn kind(&self) -> &'static str;
}

/// Decides what happens to a photon at a surface.
pub trait Material: Send + Sync {
    /// Outgoing world-space ray, or `None` if the photon is absorbed.
    ///
    /// `ray_in` and `hit` are in world space; `hit.normal` faces `ray_in`.
    ///
    /// `rng` is the only source of randomness; implementations must consume
    /// a fixed number of draws for a given input so runs stay reproducible.
    fn output_ray(&self, ray_in: &Ray, hit: &ShapeHit, rng: &mut dyn RngCore) -> Option<Ray>;
}

/// Index of a geometry node in a [`GeometryLibrary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub usize);

/// A shared scene node: a name, a local transform and optional shape/material.
///
/// A geometry without a shape is a group and only places its children.
pub struct Geometry {
    pub name: String,
    pub transform: Transform,
    shape: Option<Box<dyn Shape>>,
    material: Option<Box<dyn Material>>,
}

impl Geometry {
    /// A group node with identity transform.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            shape: None,
            material: None,
        }
    }

    /// A node carrying a shape.
    pub fn surface(name: impl Into<String>, shape: impl Shape + 'static) -> Self {
        Self {
            shape: Some(Box::new(shape)),
            ..Self::group(name)
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: impl Material + 'static) -> Self {
        self.material = Some(Box::new(material));
        self
    }

    pub fn shape(&self) -> Option<&dyn Shape> {
        self.shape.as_deref()
    }

    pub fn material(&self) -> Option<&dyn Material> {
        self.material.as_deref()
    }
}

impl fmt::Debug for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geometry")
            .field("name", &self.name)
            .field("transform", &self.transform)
            .field("shape", &self.shape.as_ref().map(|s| s.kind()))
            .field("has_material", &self.material.is_some())
            .finish()
    }
}

/// Owner of every geometry node in a scene. Ids stay valid for its lifetime.
#[derive(Debug, Default)]
pub struct GeometryLibrary {
    geometries: Vec<Geometry>,
}

impl GeometryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a geometry and return its ID.
    pub fn add(&mut self, geometry: Geometry) -> GeometryId {
        let id = GeometryId(self.geometries.len());
        self.geometries.push(geometry);
        id
    }

    pub fn get(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id.0)
    }

    /// Mutable access, e.g. to re-aim a heliostat. Requires a new propagation pass.
    pub fn get_mut(&mut self, id: GeometryId) -> Option<&mut Geometry> {
        self.geometries.get_mut(id.0)
    }

    pub fn find_by_name(&self, name: &str) -> Option<GeometryId> {
        self.geometries
            .iter()
            .position(|g| g.name == name)
            .map(GeometryId)
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::test_shapes::UnitCube;
    use super::*;

    #[test]
    fn test_face_normal_points_against_ray() {
        let ray = Ray::forward(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let front = ShapeHit::from_outward_normal(&ray, 4.0, Vec3::NEG_Z);
        assert!(front.front_face);
        assert_eq!(front.normal, Vec3::NEG_Z);
        assert_eq!(front.point, Vec3::new(0.0, 0.0, -1.0));

        let back = ShapeHit::from_outward_normal(&ray, 6.0, Vec3::Z);
        assert!(!back.front_face);
        assert_eq!(back.normal, Vec3::NEG_Z);
    }

    #[test]
    fn test_library_ids_are_stable() {
        let mut library = GeometryLibrary::new();
        let root = library.add(Geometry::group("Root"));
        let cube = library.add(Geometry::surface("Cube", UnitCube));

        assert_eq!(root, GeometryId(0));
        assert_eq!(cube, GeometryId(1));
        assert_eq!(library.find_by_name("Cube"), Some(cube));
        assert!(library.get(cube).and_then(Geometry::shape).is_some());
        assert!(library.get(root).and_then(Geometry::shape).is_none());
        assert!(library.get(GeometryId(7)).is_none());
    }

    #[test]
    fn test_unit_cube_intersection() {
        let ray = Ray::forward(Vec3::new(0.5, 0.5, -2.0), Vec3::Z);
        let hit = UnitCube.intersect(&ray).expect("ray should hit the cube");
        assert!((hit.t - 2.0).abs() < 1e-6);
        assert!(hit.front_face);
        assert_eq!(hit.normal, Vec3::NEG_Z);
    }
}
