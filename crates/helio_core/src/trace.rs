//! Nearest-hit traversal of the instance tree.
//!
//! The search walks the tree depth first in child order, rejecting subtrees
//! whose cached world box the ray segment misses. Shapes are tested in their
//! own frame through the cached inverse world transform; because directions
//! are never renormalized, hit parameters from different frames compare directly.
//!
//! Randomness is consumed only after the search, by the winning surface's
//! material, so rays that miss or are pruned never touch the generator. The
//! material receives the world ray and the hit with its world point and normal.

use helio_math::{Mat4Ext, Ray, Vec3};
use rand::RngCore;

use crate::geometry::{GeometryLibrary, ShapeHit};
use crate::instance::{InstanceTree, NodeId};

/// Relative distance under which two hits count as a tie.
///
/// Ties keep the hit found first: the node's own shape before its children,
/// children in child order.
pub const TIE_TOLERANCE: f32 = 1e-6;

/// The nearest surface struck by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceHit {
    /// Ray parameter of the hit (identical in every frame)
    pub distance: f32,
    /// World-space hit point
    pub point: Vec3,
    /// World-space unit normal, facing the incoming ray
    pub normal: Vec3,
    /// Hit point in the struck shape's local frame
    pub local_point: Vec3,
    /// Whether the front (outer) side of the surface was hit
    pub is_front: bool,
    /// The instance whose shape produced the hit
    pub instance: NodeId,
    /// World-space outgoing ray chosen by the material, `None` if absorbed
    pub ray_out: Option<Ray>,
}

struct Candidate {
    node: NodeId,
    hit: ShapeHit,
}

/// True if `t` beats `best` by more than the tie tolerance.
#[inline]
fn is_closer(t: f32, best: f32) -> bool {
    t < best - TIE_TOLERANCE * best.abs().max(1.0)
}

impl InstanceTree {
    /// Nearest hit of a world-space ray against the whole tree.
    ///
    /// The tree must have been propagated with [`InstanceTree::update_tree`]
    /// since its last change.
    pub fn intersect(&self, library: &GeometryLibrary, ray: &Ray, rng: &mut dyn RngCore) -> Option<TraceHit> {
        self.intersect_from(self.root(), library, ray, rng)
    }

    /// Nearest hit against the subtree rooted at `id`.
    pub fn intersect_from(
        &self,
        id: NodeId,
        library: &GeometryLibrary,
        ray: &Ray,
        rng: &mut dyn RngCore,
    ) -> Option<TraceHit> {
        if ray.is_degenerate() {
            return None;
        }

        let mut best = None;
        self.search(id, library, ray, &mut best);
        let winner = best?;

        let node = self.get(winner.node)?;
        let point = ray.at(winner.hit.t);
        let normal = node.inverse_transform().transform_normal_by_inverse(winner.hit.normal);

        // Materials work on the world-space hit
        let world_hit = ShapeHit {
            t: winner.hit.t,
            point,
            normal,
            front_face: winner.hit.front_face,
        };
        let ray_out = library
            .get(node.geometry())
            .and_then(|g| g.material())
            .and_then(|material| material.output_ray(ray, &world_hit, rng));

        Some(TraceHit {
            distance: winner.hit.t,
            point,
            normal,
            local_point: winner.hit.point,
            is_front: winner.hit.front_face,
            instance: winner.node,
            ray_out,
        })
    }

    fn search(&self, id: NodeId, library: &GeometryLibrary, ray: &Ray, best: &mut Option<Candidate>) {
        let Some(node) = self.get(id) else { return };

        let range = match best {
            Some(candidate) => ray.range.clamp_max(candidate.hit.t),
            None => ray.range,
        };
        if !node.bounding_box().hit(ray, range) {
            return;
        }

        if let Some(shape) = library.get(node.geometry()).and_then(|g| g.shape()) {
            let local_ray = node.inverse_transform().transform_ray(&ray.with_range(range));
            if let Some(hit) = shape.intersect(&local_ray) {
                let accepted = hit.t.is_finite()
                    && ray.range.contains(hit.t)
                    && best.as_ref().map_or(true, |b| is_closer(hit.t, b.hit.t));
                if accepted {
                    *best = Some(Candidate { node: id, hit });
                }
            }
        }

        for &child in node.children() {
            self.search(child, library, ray, best);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::test_shapes::{CountingMaterial, Mirror, UnitCube};
    use crate::geometry::Geometry;
    use helio_math::{Interval, Mat4, Transform};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// An RNG wrapper that counts how many values were drawn.
    struct CountingRng {
        inner: StdRng,
        draws: usize,
    }

    impl RngCore for CountingRng {
        fn next_u32(&mut self) -> u32 {
            self.draws += 1;
            self.inner.next_u32()
        }
        fn next_u64(&mut self) -> u64 {
            self.draws += 1;
            self.inner.next_u64()
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.draws += 1;
            self.inner.fill_bytes(dest)
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.draws += 1;
            self.inner.try_fill_bytes(dest)
        }
    }

    fn counting_rng() -> CountingRng {
        CountingRng {
            inner: StdRng::seed_from_u64(7),
            draws: 0,
        }
    }

    /// Root with cubes placed at the given offsets, in order.
    fn cube_row(offsets: &[Vec3]) -> (GeometryLibrary, InstanceTree, Vec<NodeId>) {
        let mut library = GeometryLibrary::new();
        let root = library.add(Geometry::group("Root"));
        let mut tree = InstanceTree::new(root);
        let mut leaves = Vec::new();
        for (i, offset) in offsets.iter().enumerate() {
            let geometry = library.add(
                Geometry::surface(format!("Cube{i}"), UnitCube)
                    .with_transform(Transform::from_translation(*offset))
                    .with_material(CountingMaterial),
            );
            let leaf = tree.create_node(geometry);
            tree.add_child(tree.root(), leaf).unwrap();
            leaves.push(leaf);
        }
        tree.update_tree(&library, &Mat4::IDENTITY).unwrap();
        (library, tree, leaves)
    }

    #[test]
    fn test_nearest_hit_wins_regardless_of_child_order() {
        let (library, tree, leaves) = cube_row(&[Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, 5.0)]);
        let ray = Ray::forward(Vec3::new(0.5, 0.5, 0.0), Vec3::Z);

        let hit = tree.intersect(&library, &ray, &mut counting_rng()).expect("should hit");
        assert_eq!(hit.instance, leaves[1]);
        assert!((hit.distance - 5.0).abs() < 1e-5);
        assert!(hit.is_front);
        assert_eq!(hit.normal, Vec3::NEG_Z);
    }

    #[test]
    fn test_miss_is_none() {
        let (library, tree, _) = cube_row(&[Vec3::ZERO]);
        let ray = Ray::forward(Vec3::new(5.0, 5.0, -3.0), Vec3::Z);
        let mut rng = counting_rng();

        assert!(tree.intersect(&library, &ray, &mut rng).is_none());
        assert_eq!(rng.draws, 0);
    }

    #[test]
    fn test_degenerate_ray_is_none() {
        let (library, tree, _) = cube_row(&[Vec3::ZERO]);
        let mut rng = counting_rng();

        let zero = Ray::forward(Vec3::new(0.5, 0.5, -3.0), Vec3::ZERO);
        assert!(tree.intersect(&library, &zero, &mut rng).is_none());

        let nan = Ray::forward(Vec3::new(0.5, 0.5, -3.0), Vec3::new(0.0, f32::NAN, 1.0));
        assert!(tree.intersect(&library, &nan, &mut rng).is_none());
    }

    #[test]
    fn test_equidistant_hits_keep_first_child() {
        let (library, tree, leaves) = cube_row(&[Vec3::ZERO, Vec3::ZERO]);
        let ray = Ray::forward(Vec3::new(0.5, 0.5, -2.0), Vec3::Z);

        let hit = tree.intersect(&library, &ray, &mut counting_rng()).unwrap();
        assert_eq!(hit.instance, leaves[0]);
    }

    #[test]
    fn test_range_limits_hits() {
        let (library, tree, _) = cube_row(&[Vec3::new(0.0, 0.0, 5.0)]);
        let short = Ray::new(Vec3::new(0.5, 0.5, 0.0), Vec3::Z, Interval::new(0.001, 4.0));

        assert!(tree.intersect(&library, &short, &mut counting_rng()).is_none());
    }

    #[test]
    fn test_material_draws_once_for_winner_only() {
        let offsets: Vec<Vec3> = (0..5).map(|i| Vec3::new(0.0, 0.0, 3.0 * i as f32 + 2.0)).collect();
        let (library, tree, leaves) = cube_row(&offsets);
        let ray = Ray::forward(Vec3::new(0.5, 0.5, 0.0), Vec3::Z);
        let mut rng = counting_rng();

        let hit = tree.intersect(&library, &ray, &mut rng).unwrap();
        assert_eq!(hit.instance, leaves[0]);
        assert_eq!(rng.draws, 1);
        let out = hit.ray_out.expect("counting material always transmits");
        assert!((out.origin - Vec3::new(0.5, 0.5, 2.0)).length() < 1e-5);
    }

    #[test]
    fn test_same_seed_same_result() {
        let (library, tree, _) = cube_row(&[Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)]);
        let trace_all = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|_| {
                    let origin = Vec3::new(rng.gen_range(-1.0..3.0), rng.gen_range(-0.5..1.5), -4.0);
                    let ray = Ray::forward(origin, Vec3::Z);
                    tree.intersect(&library, &ray, &mut rng).map(|h| (h.instance, h.distance))
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(trace_all(11), trace_all(11));
    }

    #[test]
    fn test_hit_through_scaled_and_rotated_parent() {
        let mut library = GeometryLibrary::new();
        let root = library.add(Geometry::group("Root"));
        let frame = library.add(Geometry::group("Frame").with_transform(Transform {
            translation: Vec3::new(0.0, 0.0, 10.0),
            rotation: helio_math::Quat::from_rotation_y(std::f32::consts::PI),
            scale: Vec3::splat(2.0),
        }));
        let cube = library.add(Geometry::surface("Cube", UnitCube));

        let mut tree = InstanceTree::new(root);
        let f = tree.create_node(frame);
        let c = tree.create_node(cube);
        tree.add_child(tree.root(), f).unwrap();
        tree.add_child(f, c).unwrap();
        tree.update_tree(&library, &Mat4::IDENTITY).unwrap();

        // The cube now spans x in [-2, 0], z in [8, 10] in world space
        let ray = Ray::forward(Vec3::new(-1.0, 1.0, 0.0), Vec3::Z);
        let hit = tree.intersect(&library, &ray, &mut counting_rng()).unwrap();

        assert_eq!(hit.instance, c);
        assert!((hit.distance - 8.0).abs() < 1e-4);
        assert!((hit.point - Vec3::new(-1.0, 1.0, 8.0)).length() < 1e-4);
        assert!((hit.normal - Vec3::NEG_Z).length() < 1e-4);
        assert!(hit.is_front);
        assert!(hit.ray_out.is_none());
    }

    #[test]
    fn test_reflection_under_non_uniform_scale() {
        let mut library = GeometryLibrary::new();
        let root = library.add(Geometry::group("Root"));
        let frame = library.add(Geometry::group("Frame").with_transform(Transform {
            scale: Vec3::new(3.0, 1.0, 1.0),
            ..Transform::IDENTITY
        }));
        let tilted = library.add(
            Geometry::surface("Tilted", UnitCube)
                .with_transform(Transform::from_translation_rotation(
                    Vec3::ZERO,
                    helio_math::Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
                ))
                .with_material(Mirror),
        );

        let mut tree = InstanceTree::new(root);
        let f = tree.create_node(frame);
        let c = tree.create_node(tilted);
        tree.add_child(tree.root(), f).unwrap();
        tree.add_child(f, c).unwrap();
        tree.update_tree(&library, &Mat4::IDENTITY).unwrap();

        // Lands on the cube's local +Z face, tilted 45 degrees then stretched along X
        let ray = Ray::forward(Vec3::new(3.0, 0.5, 10.0), Vec3::NEG_Z);
        let hit = tree.intersect(&library, &ray, &mut counting_rng()).unwrap();
        assert_eq!(hit.instance, c);

        let expected_normal = Vec3::new(1.0, 0.0, 3.0).normalize();
        assert!((hit.normal - expected_normal).length() < 1e-4);

        let out = hit.ray_out.expect("mirror reflects");
        assert!((out.origin - hit.point).length() < 1e-4);
        assert!((out.direction - Vec3::new(0.6, 0.0, 0.8)).length() < 1e-4);
        // Angle of incidence equals angle of reflection in world space
        let incoming = ray.direction.dot(hit.normal).abs();
        let outgoing = out.direction.normalize().dot(hit.normal).abs();
        assert!((incoming - outgoing).abs() < 1e-4);
    }

    #[test]
    fn test_intersect_from_subtree() {
        let (library, tree, leaves) = cube_row(&[Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 0.0, 6.0)]);
        let ray = Ray::forward(Vec3::new(0.5, 0.5, 0.0), Vec3::Z);

        let hit = tree
            .intersect_from(leaves[1], &library, &ray, &mut counting_rng())
            .unwrap();
        assert_eq!(hit.instance, leaves[1]);
        assert!((hit.distance - 6.0).abs() < 1e-5);
    }
}
