//! Scene container: a geometry library plus the instance tree placing it.

use helio_math::{Aabb, Mat4, Ray};
use rand::RngCore;

use crate::geometry::{Geometry, GeometryId, GeometryLibrary};
use crate::instance::{InstanceTree, NodeId, ShapePlacement, TreeResult};
use crate::trace::TraceHit;

/// A complete collector scene.
///
/// Geometry is stored once in [`GeometryLibrary`]; the [`InstanceTree`]
/// places it in the world, possibly many times.
#[derive(Debug)]
pub struct Scene {
    /// Scene name (usually the field layout name)
    pub name: String,

    pub library: GeometryLibrary,

    pub tree: InstanceTree,
}

impl Scene {
    /// Create a scene whose root instance places `root`.
    pub fn new(name: impl Into<String>, root: Geometry) -> Self {
        let mut library = GeometryLibrary::new();
        let root = library.add(root);
        Self {
            name: name.into(),
            library,
            tree: InstanceTree::new(root),
        }
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Add a geometry to the library and return its ID.
    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        self.library.add(geometry)
    }

    /// Place `geometry` as the last child of `parent`.
    pub fn instantiate(&mut self, parent: NodeId, geometry: GeometryId) -> TreeResult<NodeId> {
        let node = self.tree.create_node(geometry);
        self.tree.add_child(parent, node)?;
        Ok(node)
    }

    /// Propagate transforms and boxes from the root. Must run after edits and before tracing.
    pub fn update(&mut self) -> TreeResult<()> {
        self.tree.update_tree(&self.library, &Mat4::IDENTITY)?;
        log::debug!("Updated scene '{}' ({} instances)", self.name, self.instance_count());
        Ok(())
    }

    /// World box enclosing every placed instance.
    pub fn world_bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        self.tree.extend_box_for_light(&mut bounds);
        bounds
    }

    pub fn url(&self, node: NodeId) -> Option<String> {
        self.tree.url(node, &self.library)
    }

    pub fn find_by_url(&self, url: &str) -> Vec<NodeId> {
        self.tree.find_by_url(url, &self.library)
    }

    /// Nearest hit of a world ray; see [`InstanceTree::intersect`].
    pub fn intersect(&self, ray: &Ray, rng: &mut dyn RngCore) -> Option<TraceHit> {
        self.tree.intersect(&self.library, ray, rng)
    }

    /// Every enabled leaf shape with its world transform.
    pub fn shape_placements(&self, disabled_names: &[String]) -> Vec<ShapePlacement<'_>> {
        let mut out = Vec::new();
        self.tree.collect_shape_transforms(&self.library, disabled_names, &mut out);
        out
    }

    /// Instance nodes whose geometry carries a shape, in traversal order.
    pub fn surfaces(&self) -> Vec<NodeId> {
        self.tree
            .descendants(self.root())
            .into_iter()
            .filter(|&id| {
                self.tree
                    .get(id)
                    .and_then(|node| self.library.get(node.geometry()))
                    .is_some_and(|g| g.shape().is_some())
            })
            .collect()
    }

    /// Instances attached under the root. Detached nodes awaiting release are not counted.
    pub fn instance_count(&self) -> usize {
        self.tree.descendants(self.root()).len()
    }

    pub fn geometry_count(&self) -> usize {
        self.library.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::test_shapes::UnitCube;
    use helio_math::{Transform, Vec3};

    fn two_cube_scene() -> (Scene, NodeId, NodeId) {
        let mut scene = Scene::new("test", Geometry::group("Field"));
        let cube = scene.add_geometry(Geometry::surface("Cube", UnitCube));
        let frame = scene.add_geometry(
            Geometry::group("Heliostat").with_transform(Transform::from_translation(Vec3::new(4.0, 0.0, 0.0))),
        );

        let root = scene.root();
        let near = scene.instantiate(root, cube).unwrap();
        let h = scene.instantiate(root, frame).unwrap();
        let far = scene.instantiate(h, cube).unwrap();
        scene.update().unwrap();
        (scene, near, far)
    }

    #[test]
    fn test_scene_creation() {
        let (scene, _, _) = two_cube_scene();

        assert_eq!(scene.geometry_count(), 3);
        assert_eq!(scene.instance_count(), 4);
        assert_eq!(scene.world_bounds().min(), Vec3::ZERO);
        assert_eq!(scene.world_bounds().max(), Vec3::new(5.0, 1.0, 1.0));
    }

    #[test]
    fn test_detached_nodes_are_not_instances() {
        let (mut scene, near, _) = two_cube_scene();
        let cube = scene.tree.get(near).unwrap().geometry();

        let loose = scene.tree.create_node(cube);
        assert_eq!(scene.instance_count(), 4);

        scene.tree.add_child(scene.root(), loose).unwrap();
        assert_eq!(scene.instance_count(), 5);
        assert_eq!(scene.tree.remove_child(scene.root(), 2).unwrap(), loose);
        assert_eq!(scene.instance_count(), 4);
    }

    #[test]
    fn test_urls() {
        let (scene, near, far) = two_cube_scene();

        assert_eq!(scene.url(near).as_deref(), Some("/Field/Cube"));
        assert_eq!(scene.url(far).as_deref(), Some("/Field/Heliostat/Cube"));
        assert_eq!(scene.find_by_url("/Field/Heliostat/Cube"), vec![far]);
        assert!(scene.find_by_url("/Field/Tower").is_empty());
    }

    #[test]
    fn test_surfaces_and_placements() {
        let (scene, near, far) = two_cube_scene();

        assert_eq!(scene.surfaces(), vec![near, far]);
        let placements = scene.shape_placements(&[]);
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[1].transform.w_axis.x, 4.0);
        assert!(scene.shape_placements(&["Cube".to_string()]).is_empty());
    }
}
