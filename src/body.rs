//! Rigid-body interface consumed by anchors.

use crate::math::{Isometry, Point, Real, Vector};
use rapier::dynamics::RigidBody;

/// The operations an anchor needs from the rigid-body it is attached to.
///
/// All positions are expressed in world-space except where noted. "Relative" points are
/// world-space offsets from the body's center-of-mass, the convention Rapier uses for
/// impulse application.
pub trait AnchorBody {
    /// The body's current world-space pose.
    fn world_transform(&self) -> Isometry<Real>;
    /// The body's current world-space center-of-mass.
    fn center_of_mass(&self) -> Point<Real>;
    /// The body's inverse mass, `0.0` for bodies that cannot be moved by impulses.
    fn inv_mass(&self) -> Real;
    /// The velocity of the material point located at `relative_point` from the center-of-mass.
    fn velocity_at_local_point(&self, relative_point: &Vector<Real>) -> Vector<Real>;
    /// Applies `impulse` at `relative_point` from the center-of-mass.
    fn apply_impulse(&mut self, impulse: Vector<Real>, relative_point: &Vector<Real>);
    /// Ensures the body is awake so the next impulse is integrated.
    fn activate(&mut self);
}

impl AnchorBody for RigidBody {
    fn world_transform(&self) -> Isometry<Real> {
        *self.position()
    }

    fn center_of_mass(&self) -> Point<Real> {
        *RigidBody::center_of_mass(self)
    }

    fn inv_mass(&self) -> Real {
        // Fixed and kinematic bodies have infinite mass as far as anchors are concerned.
        if self.is_dynamic() {
            self.mass_properties().local_mprops.inv_mass
        } else {
            0.0
        }
    }

    fn velocity_at_local_point(&self, relative_point: &Vector<Real>) -> Vector<Real> {
        let com = *RigidBody::center_of_mass(self);
        self.velocity_at_point(&(com + relative_point))
    }

    fn apply_impulse(&mut self, impulse: Vector<Real>, relative_point: &Vector<Real>) {
        let com = *RigidBody::center_of_mass(self);
        self.apply_impulse_at_point(impulse, com + relative_point, true);
    }

    fn activate(&mut self) {
        self.wake_up(true);
    }
}
