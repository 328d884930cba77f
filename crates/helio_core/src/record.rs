//! Persisted instance-tree records.
//!
//! A tree is flattened in pre-order: the root is record 0 with parent `-1`,
//! and every record lists its children by index in child order. The root
//! record stores the root's world transform, every other record the local
//! transform of its geometry; each record also keeps the cached world box.
//! World transforms are rebuilt on load by composing local transforms from
//! the root down.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use helio_math::{Aabb, Mat4, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{GeometryId, GeometryLibrary};
use crate::instance::{InstanceTree, NodeId, TreeError};

/// Current layout version written by [`InstanceTree::to_records`].
pub const RECORD_VERSION: u32 = 1;

/// Errors that can occur while writing or reading instance records.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Unsupported record version {0}")]
    UnsupportedVersion(u32),

    #[error("Malformed instance records: {0}")]
    Malformed(String),
}

/// Result type for record operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// World box corners. Absent for nodes with nothing to bound.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RecordBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

/// One serialized instance node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    /// Index of the referenced geometry in its library
    pub geometry: usize,
    /// Index of the parent record, -1 for the root
    pub parent: i64,
    /// Local transform, column-major; the world transform for the root
    pub transform: [f32; 16],
    /// World bounding box
    pub bbox: Option<RecordBox>,
    /// Child record indices in child order
    pub children: Vec<usize>,
}

/// A whole serialized tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstanceTreeDocument {
    pub version: u32,
    pub nodes: Vec<InstanceRecord>,
}

fn box_to_record(bbox: &Aabb) -> Option<RecordBox> {
    (!bbox.is_empty()).then(|| RecordBox {
        min: bbox.min().to_array(),
        max: bbox.max().to_array(),
    })
}

fn box_from_record(record: Option<&RecordBox>) -> Aabb {
    record.map_or(Aabb::EMPTY, |b| {
        Aabb::from_corners(Vec3::from_array(b.min), Vec3::from_array(b.max))
    })
}

impl InstanceTree {
    /// Flatten the attached tree into records, in pre-order.
    pub fn to_records(&self, library: &GeometryLibrary) -> RecordResult<InstanceTreeDocument> {
        let order = self.descendants(self.root());
        let positions: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let index_of = |id: NodeId| positions.get(&id).copied();

        let mut nodes = Vec::with_capacity(order.len());
        for &id in &order {
            let node = self.node(id)?;
            let geometry = library
                .get(node.geometry())
                .ok_or(TreeError::UnknownGeometry(node.geometry()))?;
            let (parent, transform) = match node.parent() {
                Some(p) => {
                    let parent = index_of(p)
                        .ok_or_else(|| RecordError::Malformed(format!("parent of {id:?} is not attached")))?;
                    (parent as i64, geometry.transform.to_matrix())
                }
                // The root carries whatever parent transform it was updated under
                None => (-1, *node.transform()),
            };
            let children = node
                .children()
                .iter()
                .map(|&c| index_of(c).ok_or_else(|| RecordError::Malformed(format!("child {c:?} is not attached"))))
                .collect::<RecordResult<Vec<_>>>()?;

            nodes.push(InstanceRecord {
                geometry: node.geometry().0,
                parent,
                transform: transform.to_cols_array(),
                bbox: box_to_record(node.bounding_box()),
                children,
            });
        }

        Ok(InstanceTreeDocument {
            version: RECORD_VERSION,
            nodes,
        })
    }

    /// Rebuild a tree from records, checking that they describe a strict tree.
    pub fn from_records(document: &InstanceTreeDocument) -> RecordResult<InstanceTree> {
        if document.version != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(document.version));
        }
        let records = &document.nodes;
        let root_record = records
            .first()
            .ok_or_else(|| RecordError::Malformed("no root record".to_string()))?;
        if root_record.parent != -1 {
            return Err(RecordError::Malformed("record 0 must be the root".to_string()));
        }

        let mut tree = InstanceTree::new(GeometryId(root_record.geometry));
        let mut ids = vec![tree.root()];
        ids.extend(records[1..].iter().map(|r| tree.create_node(GeometryId(r.geometry))));

        // Walk from the root, attaching children and composing transforms
        let mut visited = vec![false; records.len()];
        visited[0] = true;
        let root_world = Mat4::from_cols_array(&root_record.transform);
        let mut stack = vec![(0usize, root_world)];
        while let Some((index, world)) = stack.pop() {
            let record = &records[index];
            tree.set_cached(ids[index], world, box_from_record(record.bbox.as_ref()))?;

            for &child in &record.children {
                let child_record = records
                    .get(child)
                    .ok_or_else(|| RecordError::Malformed(format!("record {index} lists missing child {child}")))?;
                if child_record.parent != index as i64 {
                    return Err(RecordError::Malformed(format!(
                        "record {child} is listed under {index} but names parent {}",
                        child_record.parent
                    )));
                }
                if std::mem::replace(&mut visited[child], true) {
                    return Err(RecordError::Malformed(format!("record {child} appears twice")));
                }
                tree.push_child_unchecked(ids[index], ids[child])?;
                stack.push((child, world * Mat4::from_cols_array(&child_record.transform)));
            }
        }

        if let Some(unreached) = visited.iter().position(|v| !v) {
            return Err(RecordError::Malformed(format!("record {unreached} is not reachable from the root")));
        }

        log::debug!("Loaded instance tree with {} nodes", records.len());
        Ok(tree)
    }
}

/// Serialize a document as pretty JSON.
pub fn write_json<W: Write>(document: &InstanceTreeDocument, writer: W) -> RecordResult<()> {
    serde_json::to_writer_pretty(writer, document)?;
    Ok(())
}

/// Deserialize a document from JSON.
pub fn read_json<R: Read>(reader: R) -> RecordResult<InstanceTreeDocument> {
    Ok(serde_json::from_reader(reader)?)
}

/// Write the tree's records to a JSON file.
pub fn save_tree<P: AsRef<Path>>(tree: &InstanceTree, library: &GeometryLibrary, path: P) -> RecordResult<()> {
    let document = tree.to_records(library)?;
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write_json(&document, &mut writer)?;
    writer.flush()?;
    log::info!("Saved {} instance records to {:?}", document.nodes.len(), path.as_ref());
    Ok(())
}

/// Read a tree from a JSON file written by [`save_tree`].
pub fn load_tree<P: AsRef<Path>>(path: P) -> RecordResult<InstanceTree> {
    let document = read_json(BufReader::new(File::open(path.as_ref())?))?;
    InstanceTree::from_records(&document)
}
