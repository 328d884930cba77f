//! World-space instance tree.
//!
//! Every placement of a shared [`Geometry`] is an [`InstanceNode`] stored in
//! the [`InstanceTree`] arena. Nodes cache their object-to-world transform and
//! world bounding box; both are only refreshed by [`InstanceTree::update_tree`].
//! Structural edits leave the caches stale until the next propagation pass.

use helio_math::{Aabb, Mat4, Mat4Ext};
use thiserror::Error;

use crate::geometry::{Geometry, GeometryId, GeometryLibrary, Shape};

/// Errors raised by structural misuse of the tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("row {row} is out of range for a node with {len} children")]
    InvalidRow { row: usize, len: usize },

    #[error("node {0:?} does not exist (stale or foreign handle)")]
    UnknownNode(NodeId),

    #[error("node {0:?} already has a parent")]
    AlreadyAttached(NodeId),

    #[error("node {0:?} is still attached to the tree")]
    StillAttached(NodeId),

    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    #[error("the root node cannot be attached or released")]
    RootNode,

    #[error("geometry {0:?} is not in the library")]
    UnknownGeometry(GeometryId),
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Generational handle to a node in an [`InstanceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index of the node; stable while the node lives.
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// One world-space placement of a geometry node.
#[derive(Debug, Clone)]
pub struct InstanceNode {
    generation: u32,
    geometry: GeometryId,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// World-frame bounds of this node and its subtree
    bbox: Aabb,
    /// Object-to-world transform
    transform: Mat4,
    /// World-to-object transform, cached for ray transformation
    inverse: Mat4,
}

impl InstanceNode {
    fn new(generation: u32, geometry: GeometryId) -> Self {
        Self {
            generation,
            geometry,
            parent: None,
            children: Vec::new(),
            bbox: Aabb::EMPTY,
            transform: Mat4::IDENTITY,
            inverse: Mat4::IDENTITY,
        }
    }

    pub fn geometry(&self) -> GeometryId {
        self.geometry
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn bounding_box(&self) -> &Aabb {
        &self.bbox
    }

    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    pub fn inverse_transform(&self) -> &Mat4 {
        &self.inverse
    }
}

/// A shape placed in the world, as gathered by
/// [`InstanceTree::collect_shape_transforms`].
#[derive(Clone, Copy)]
pub struct ShapePlacement<'a> {
    pub node: NodeId,
    pub geometry: GeometryId,
    pub name: &'a str,
    pub shape: &'a dyn Shape,
    pub transform: Mat4,
}

/// Arena of instance nodes with a fixed root.
#[derive(Debug, Clone)]
pub struct InstanceTree {
    nodes: Vec<Option<InstanceNode>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    root: NodeId,
}

impl InstanceTree {
    /// Create a tree whose root places `root_geometry`.
    pub fn new(root_geometry: GeometryId) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        tree.root = tree.create_node(root_geometry);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, attached or detached.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a detached node. It joins the tree through one of the attach operations.
    pub fn create_node(&mut self, geometry: GeometryId) -> NodeId {
        let (index, generation) = if let Some(index) = self.free_list.pop() {
            let generation = self.generations[index].wrapping_add(1);
            self.generations[index] = generation;
            self.nodes[index] = Some(InstanceNode::new(generation, geometry));
            (index, generation)
        } else {
            self.nodes.push(Some(InstanceNode::new(0, geometry)));
            self.generations.push(0);
            (self.nodes.len() - 1, 0)
        };
        NodeId {
            index: index as u32,
            generation,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&InstanceNode> {
        self.nodes
            .get(id.index())?
            .as_ref()
            .filter(|n| n.generation == id.generation)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn node(&self, id: NodeId) -> TreeResult<&InstanceNode> {
        self.get(id).ok_or(TreeError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut InstanceNode> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .filter(|n| n.generation == id.generation)
            .ok_or(TreeError::UnknownNode(id))
    }

    /// Child at `row` of `parent`.
    pub fn child(&self, parent: NodeId, row: usize) -> TreeResult<NodeId> {
        let node = self.node(parent)?;
        node.children.get(row).copied().ok_or(TreeError::InvalidRow {
            row,
            len: node.children.len(),
        })
    }

    /// True if `ancestor` is `node` or lies on its parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(|n| n.parent);
        }
        false
    }

    /// Checks that `child` may become a child of `parent`.
    fn check_attachable(&self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.node(parent)?;
        let node = self.node(child)?;
        if child == self.root {
            return Err(TreeError::RootNode);
        }
        if node.parent.is_some() {
            return Err(TreeError::AlreadyAttached(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(TreeError::Cycle { parent, child });
        }
        Ok(())
    }

    /// Append `child` to the children of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let row = self.node(parent)?.children.len();
        self.insert_child(parent, row, child)
    }

    /// Insert `child` at `row`, shifting later children. `row` may equal the child count.
    pub fn insert_child(&mut self, parent: NodeId, row: usize, child: NodeId) -> TreeResult<()> {
        let len = self.node(parent)?.children.len();
        if row > len {
            return Err(TreeError::InvalidRow { row, len });
        }
        self.check_attachable(parent, child)?;

        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.insert(row, child);
        Ok(())
    }

    /// Put `child` at `row` in place of the current child, which is detached
    /// and returned. Releasing the displaced subtree is up to the caller.
    pub fn replace_child(&mut self, parent: NodeId, row: usize, child: NodeId) -> TreeResult<NodeId> {
        let displaced = self.child(parent, row)?;
        self.check_attachable(parent, child)?;

        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children[row] = child;
        self.node_mut(displaced)?.parent = None;
        Ok(displaced)
    }

    /// Detach and return the child at `row`, shifting later children.
    pub fn remove_child(&mut self, parent: NodeId, row: usize) -> TreeResult<NodeId> {
        let removed = self.child(parent, row)?;
        self.node_mut(parent)?.children.remove(row);
        self.node_mut(removed)?.parent = None;
        Ok(removed)
    }

    /// Destroy a detached node and its whole subtree. Geometry is untouched.
    ///
    /// Returns the number of nodes freed.
    pub fn release(&mut self, id: NodeId) -> TreeResult<usize> {
        if id == self.root {
            return Err(TreeError::RootNode);
        }
        if self.node(id)?.parent.is_some() {
            return Err(TreeError::StillAttached(id));
        }

        let mut stack = vec![id];
        let mut freed = 0;
        while let Some(current) = stack.pop() {
            let node = self.node(current)?;
            stack.extend_from_slice(&node.children);
            self.nodes[current.index()] = None;
            self.free_list.push(current.index());
            freed += 1;
        }
        Ok(freed)
    }

    /// Nodes of the subtree rooted at `id`, parents before children, in child order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get(current) {
                order.push(current);
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }

    /// Recompute world transforms and boxes of the whole tree.
    ///
    /// Must run after any local transform or structural change and before
    /// the next traversal.
    pub fn update_tree(&mut self, library: &GeometryLibrary, parent_transform: &Mat4) -> TreeResult<()> {
        let bbox = self.update_node(self.root, library, *parent_transform)?;
        log::debug!(
            "Propagated transforms through {} nodes, world box {:?}..{:?}",
            self.len(),
            bbox.min(),
            bbox.max()
        );
        Ok(())
    }

    /// Transforms flow down; boxes are merged on the way back up.
    fn update_node(&mut self, id: NodeId, library: &GeometryLibrary, parent_transform: Mat4) -> TreeResult<Aabb> {
        let geometry_id = self.node(id)?.geometry;
        let geometry = library
            .get(geometry_id)
            .ok_or(TreeError::UnknownGeometry(geometry_id))?;

        let transform = parent_transform * geometry.transform.to_matrix();
        let mut bbox = geometry
            .shape()
            .map(|shape| transform.transform_aabb(&shape.bounding_box()))
            .unwrap_or(Aabb::EMPTY);

        let child_count = self.node(id)?.children.len();
        for row in 0..child_count {
            let child = self.node(id)?.children[row];
            let child_box = self.update_node(child, library, transform)?;
            bbox.extend(&child_box);
        }

        let node = self.node_mut(id)?;
        node.transform = transform;
        node.inverse = transform.inverse();
        node.bbox = bbox;
        Ok(bbox)
    }

    /// Merge the world box of every node under the root into `aggregate`.
    pub fn extend_box_for_light(&self, aggregate: &mut Aabb) {
        self.extend_box_for_light_from(self.root, aggregate);
    }

    /// Merge the world box of every node under `id` into `aggregate`. No pruning.
    pub fn extend_box_for_light_from(&self, id: NodeId, aggregate: &mut Aabb) {
        for node in self.descendants(id).into_iter().filter_map(|n| self.get(n)) {
            aggregate.extend(&node.bbox);
        }
    }

    /// Append every enabled leaf shape with its world transform to `out`, in traversal order.
    ///
    /// A leaf is skipped when its geometry name exactly matches one of `disabled_names`.
    pub fn collect_shape_transforms<'a>(
        &self,
        library: &'a GeometryLibrary,
        disabled_names: &[String],
        out: &mut Vec<ShapePlacement<'a>>,
    ) {
        for id in self.descendants(self.root) {
            let Some(node) = self.get(id) else { continue };
            if !node.children.is_empty() {
                continue;
            }
            let Some(geometry) = library.get(node.geometry) else { continue };
            let Some(shape) = geometry.shape() else { continue };
            if disabled_names.iter().any(|name| *name == geometry.name) {
                continue;
            }
            out.push(ShapePlacement {
                node: id,
                geometry: node.geometry,
                name: &geometry.name,
                shape,
                transform: node.transform,
            });
        }
    }

    /// Slash-separated geometry names from the root down to `id`, e.g. `/Field/Heliostat/Facet`.
    pub fn url(&self, id: NodeId, library: &GeometryLibrary) -> Option<String> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.get(node_id)?;
            names.push(library.get(node.geometry).map_or("", |g: &Geometry| g.name.as_str()));
            current = node.parent;
        }
        names.reverse();
        Some(format!("/{}", names.join("/")))
    }

    /// All attached nodes whose [`url`](Self::url) equals `url`, in traversal order.
    pub fn find_by_url(&self, url: &str, library: &GeometryLibrary) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| self.url(id, library).as_deref() == Some(url))
            .collect()
    }

    /// Internal fast path for record loading: attach without validation.
    pub(crate) fn push_child_unchecked(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Internal: install cached world data read from a record.
    pub(crate) fn set_cached(&mut self, id: NodeId, transform: Mat4, bbox: Aabb) -> TreeResult<()> {
        let node = self.node_mut(id)?;
        node.transform = transform;
        node.inverse = transform.inverse();
        node.bbox = bbox;
        Ok(())
    }
}
