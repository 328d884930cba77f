// Re-export glam for convenience
pub use glam::*;

// Helio math types
mod interval;
mod aabb;
mod ray;
mod transform;

pub use aabb::Aabb;
pub use interval::Interval;
pub use ray::Ray;
pub use transform::{Mat4Ext, Transform};
