#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Re-export of the Rapier 2D physics engine.
///
/// This is available when the `dim2` feature is enabled.
#[cfg(feature = "dim2")]
pub extern crate rapier2d as rapier;
/// Re-export of the Rapier 3D physics engine.
///
/// This is available when the `dim3` feature is enabled.
#[cfg(feature = "dim3")]
pub extern crate rapier3d as rapier;

/// Anchors binding one rod node to one rigid body.
///
/// This module contains the coupler itself: the attachment geometry and the
/// per-step force/impulse exchange between the two representations.
pub mod anchor;
/// The rigid-body side of an anchor.
///
/// Defines the [`body::AnchorBody`] interface and its implementation for Rapier rigid-bodies.
pub mod body;
/// Errors reported by anchors and anchor sets.
pub mod error;
/// The flexible side of an anchor: rod elements and the [`rod::FlexibleNode`] interface.
pub mod rod;
/// Storage and stepping of every anchor of a simulation.
pub mod set;

pub use anchor::{Anchor, AnchorResponse, CouplingMode};
pub use body::AnchorBody;
pub use error::AnchorError;
pub use rod::{
    FlexibleNode, Rod, RodDesc, RodElementHandle, RodOrientationElement, RodPositionElement,
};
pub use set::{AnchorHandle, AnchorSet};

/// Mathematical types and utilities for anchor coupling.
///
/// Re-exports Rapier's math types so that both the rigid and the flexible side
/// share the same scalar and vector types.
pub mod math {
    /// Re-export all mathematical types from Rapier (vectors, matrices, etc.)
    pub use rapier::math::*;
}
