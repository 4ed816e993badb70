//! Rod elements and the flexible-node interface.
//!
//! A rod is discretized into position elements (mass points) and orientation elements
//! (one per segment). The rod integrator owning these elements is external to this crate:
//! it fills the predicted state (`pos_new`, `vel_new`) and consumes the accumulated
//! forces. Anchors only read the predicted state, add forces, and toggle the
//! anchored flag.

use crate::error::AnchorError;
use crate::math::{AngVector, Point, Real, Rotation, Vector};
use num_traits::Zero;

/// The operations an anchor needs from the rod node it is attached to.
pub trait FlexibleNode {
    /// The node position predicted by the rod integrator for the end of the current step.
    fn predicted_position(&self) -> Point<Real>;
    /// The node velocity predicted by the rod integrator for the end of the current step.
    fn predicted_velocity(&self) -> Vector<Real>;
    /// The node mass.
    fn mass(&self) -> Real;
    /// The sum of all forces applied to this node since the last time they were cleared.
    fn accumulated_force(&self) -> Vector<Real>;
    /// Adds `force` to the node's force accumulator.
    fn apply_force(&mut self, force: Vector<Real>);
    /// Is this node currently held by an anchor?
    fn is_anchored(&self) -> bool;
    /// Marks this node as held (or no longer held) by an anchor.
    fn set_anchored(&mut self, anchored: bool);
}

/// A mass point of a rod.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RodPositionElement {
    /// The position at the beginning of the step.
    pub pos: Point<Real>,
    /// The predicted position at the end of the step.
    pub pos_new: Point<Real>,
    /// The velocity at the beginning of the step.
    pub vel: Vector<Real>,
    /// The predicted velocity at the end of the step.
    pub vel_new: Vector<Real>,
    /// The mass of this point.
    pub mass: Real,
    /// Accumulated forces, cleared by the rod integrator after each step.
    pub force: Vector<Real>,
    /// Set while an anchor is attached, so the integrator can special-case this node.
    pub is_anchor: bool,
}

impl RodPositionElement {
    /// Creates a resting mass point at `pos`.
    pub fn new(pos: Point<Real>, mass: Real) -> Self {
        Self {
            pos,
            pos_new: pos,
            vel: Vector::zeros(),
            vel_new: Vector::zeros(),
            mass,
            force: Vector::zeros(),
            is_anchor: false,
        }
    }

    /// Resets the force accumulator.
    pub fn clear_force(&mut self) {
        self.force = Vector::zeros();
    }
}

impl FlexibleNode for RodPositionElement {
    fn predicted_position(&self) -> Point<Real> {
        self.pos_new
    }

    fn predicted_velocity(&self) -> Vector<Real> {
        self.vel_new
    }

    fn mass(&self) -> Real {
        self.mass
    }

    fn accumulated_force(&self) -> Vector<Real> {
        self.force
    }

    fn apply_force(&mut self, force: Vector<Real>) {
        self.force += force;
    }

    fn is_anchored(&self) -> bool {
        self.is_anchor
    }

    fn set_anchored(&mut self, anchored: bool) {
        self.is_anchor = anchored;
    }
}

/// The orientation of a rod segment.
///
/// Anchors keep a reference to the orientation element of the segment they hold, but do
/// not exchange torques with it yet.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RodOrientationElement {
    /// The orientation at the beginning of the step.
    pub q: Rotation<Real>,
    /// The predicted orientation at the end of the step.
    pub q_new: Rotation<Real>,
    /// The angular velocity of the segment.
    pub angvel: AngVector<Real>,
    /// Accumulated torques, cleared by the rod integrator after each step.
    pub torque: AngVector<Real>,
}

impl RodOrientationElement {
    /// Creates a resting orientation element.
    pub fn new(q: Rotation<Real>) -> Self {
        Self {
            q,
            q_new: q,
            angvel: AngVector::<Real>::zero(),
            torque: AngVector::<Real>::zero(),
        }
    }
}

impl Default for RodOrientationElement {
    fn default() -> Self {
        Self::new(Rotation::<Real>::identity())
    }
}

/// Index of an element of a [`Rod`].
///
/// The same handle addresses position element `i` and the orientation element of
/// segment `i` (the segment going from position element `i` to `i + 1`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RodElementHandle(pub u32);

impl RodElementHandle {
    /// The index of the element inside of the rod's element arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Helper struct for building a straight [`Rod`].
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RodDesc {
    /// World-space position of the first node.
    pub start: Point<Real>,
    /// World-space position of the last node.
    pub end: Point<Real>,
    /// Number of segments; the rod has `segments + 1` nodes.
    pub segments: u32,
    /// Mass of each node.
    pub node_mass: Real,
}

impl Default for RodDesc {
    fn default() -> Self {
        Self {
            start: Point::origin(),
            end: Point::from(Vector::x()),
            segments: 10,
            node_mass: 1.0,
        }
    }
}

/// The elements of a discretized rod.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Rod {
    positions: Vec<RodPositionElement>,
    orientations: Vec<RodOrientationElement>,
}

impl Rod {
    /// Builds a straight rod from `desc`.
    pub fn new(desc: &RodDesc) -> Result<Self, AnchorError> {
        if desc.segments == 0 {
            return Err(AnchorError::InvalidArgument("a rod needs at least one segment"));
        }

        let points: Vec<_> = (0..=desc.segments)
            .map(|i| {
                let t = i as Real / desc.segments as Real;
                desc.start + (desc.end - desc.start) * t
            })
            .collect();

        Self::from_points(&points, desc.node_mass)
    }

    /// Builds a rod going through every point of `points`, each node having the mass `node_mass`.
    pub fn from_points(points: &[Point<Real>], node_mass: Real) -> Result<Self, AnchorError> {
        check_node_count(points.len())?;
        if !(node_mass > 0.0 && node_mass.is_finite()) {
            return Err(AnchorError::InvalidArgument(
                "rod node mass must be positive and finite",
            ));
        }

        let positions = points
            .iter()
            .map(|pt| RodPositionElement::new(*pt, node_mass))
            .collect();
        let orientations = vec![RodOrientationElement::default(); points.len() - 1];

        Ok(Self {
            positions,
            orientations,
        })
    }

    /// Number of position elements (nodes) of this rod.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Does this rod have no nodes?
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of segments (orientation elements) of this rod.
    pub fn num_segments(&self) -> usize {
        self.orientations.len()
    }

    /// Handle of the first node.
    pub fn first(&self) -> RodElementHandle {
        RodElementHandle(0)
    }

    /// Handle of the last node.
    ///
    /// The orientation element of the last segment is at `RodElementHandle(last.0 - 1)`.
    pub fn last(&self) -> RodElementHandle {
        // Node counts are checked against `u32::MAX` at construction.
        RodElementHandle(self.positions.len().saturating_sub(1) as u32)
    }

    /// The position element with the given handle, if it exists.
    pub fn position(&self, handle: RodElementHandle) -> Option<&RodPositionElement> {
        self.positions.get(handle.index())
    }

    /// The mutable position element with the given handle, if it exists.
    pub fn position_mut(&mut self, handle: RodElementHandle) -> Option<&mut RodPositionElement> {
        self.positions.get_mut(handle.index())
    }

    /// The orientation element with the given handle, if it exists.
    pub fn orientation(&self, handle: RodElementHandle) -> Option<&RodOrientationElement> {
        self.orientations.get(handle.index())
    }

    /// The mutable orientation element with the given handle, if it exists.
    pub fn orientation_mut(
        &mut self,
        handle: RodElementHandle,
    ) -> Option<&mut RodOrientationElement> {
        self.orientations.get_mut(handle.index())
    }

    /// All the position elements of this rod.
    pub fn positions(&self) -> &[RodPositionElement] {
        &self.positions
    }

    /// All the orientation elements of this rod.
    pub fn orientations(&self) -> &[RodOrientationElement] {
        &self.orientations
    }

    /// Clears the force accumulator of every node.
    pub fn clear_forces(&mut self) {
        self.positions
            .iter_mut()
            .for_each(RodPositionElement::clear_force);
        self.orientations
            .iter_mut()
            .for_each(|q| q.torque = AngVector::<Real>::zero());
    }
}

/// Every node of a rod must be addressable by a [`RodElementHandle`].
fn check_node_count(len: usize) -> Result<(), AnchorError> {
    if len < 2 {
        return Err(AnchorError::InvalidArgument("a rod needs at least two nodes"));
    }
    if len > u32::MAX as usize {
        return Err(AnchorError::InvalidArgument(
            "a rod cannot have more than u32::MAX nodes",
        ));
    }
    Ok(())
}
