//! Photon records produced by the tracing driver.

use helio_math::Vec3;

use crate::instance::NodeId;

/// Which side of a surface a photon struck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn from_front(is_front: bool) -> Self {
        if is_front {
            Side::Front
        } else {
            Side::Back
        }
    }

    /// Numeric code used in exported rows: 1 front, 0 back.
    pub fn code(self) -> f64 {
        match self {
            Side::Front => 1.0,
            Side::Back => 0.0,
        }
    }
}

/// One photon event: emission at the sun aperture or an interaction with a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Photon {
    /// Id of the photon path; every event of one path shares it
    pub id: u64,
    /// World-space position
    pub position: Vec3,
    /// Position in the struck surface's local frame (equals `position` at emission)
    pub local_position: Vec3,
    /// Direction of travel when the event happened
    pub direction: Vec3,
    /// Surface instance hit, `None` for the emission event
    pub surface: Option<NodeId>,
    pub side: Side,
}

impl Photon {
    /// An emission event on the sun aperture.
    pub fn emitted(id: u64, position: Vec3, direction: Vec3) -> Self {
        Self {
            id,
            position,
            local_position: position,
            direction,
            surface: None,
            side: Side::Front,
        }
    }
}
