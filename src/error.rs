use crate::math::Real;
use crate::set::AnchorHandle;

/// Errors that can occur while building, stepping, or releasing anchors.
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq)]
pub enum AnchorError {
    /// A collaborator could not be resolved or a construction parameter is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The rod node already has a live anchor attached to it.
    #[error("the rod node is already anchored")]
    NodeAlreadyAnchored,
    /// The timestep given to a solve was not strictly positive.
    #[error("the timestep must be strictly positive, got {0}")]
    NonPositiveTimestep(Real),
    /// The rigid-body referenced by an anchor no longer exists.
    #[error("the rigid-body attached to {0:?} no longer exists")]
    MissingBody(AnchorHandle),
    /// The rod element referenced by an anchor no longer exists.
    #[error("the rod element attached to {0:?} no longer exists")]
    MissingElement(AnchorHandle),
    /// No anchor is registered under this handle.
    #[error("unknown anchor {0:?}")]
    UnknownAnchor(AnchorHandle),
}
