//! Helio Core - instanced scene hierarchy, traversal and photon export.
//!
//! This crate provides:
//!
//! - **Geometry library**: shared `Geometry` nodes with optional `Shape` and `Material`
//! - **Instance tree**: world placement of geometry, transform/box propagation
//! - **Traversal**: nearest-hit search over the instance tree
//! - **Records**: JSON persistence of the instance tree
//! - **Export**: the photon export state machine and its sinks
//!
//! # Example
//!
//! ```ignore
//! use helio_core::{Geometry, Scene};
//!
//! let mut scene = Scene::new("field", Geometry::group("Field"));
//! let mirror = scene.add_geometry(Geometry::surface("Mirror", shape));
//! scene.instantiate(scene.root(), mirror)?;
//! scene.update()?;
//! let hit = scene.intersect(&ray, &mut rng);
//! ```

pub mod export;
pub mod geometry;
pub mod instance;
pub mod photon;
pub mod record;
pub mod scene;
pub mod trace;

// Re-export commonly used types
pub use export::{ExportError, ExportState, ExporterRegistry, PhotonExporter, PhotonSink, PhotonsSettings};
pub use geometry::{Geometry, GeometryId, GeometryLibrary, Material, Shape, ShapeHit};
pub use instance::{InstanceNode, InstanceTree, NodeId, ShapePlacement, TreeError, TreeResult};
pub use photon::{Photon, Side};
pub use record::{load_tree, save_tree, InstanceRecord, InstanceTreeDocument, RecordError};
pub use scene::Scene;
pub use trace::{TraceHit, TIE_TOLERANCE};
