//! Anchor coupling between a rigid-body and a rod node.
//!
//! An [`Anchor`] pins a material point of a rigid-body to one node of a rod. Each step it
//! measures how far apart the two representations drifted and splits the correction between
//! them according to their masses: a force added to the rod node and an impulse applied to
//! the rigid-body at the anchor point.

use crate::body::AnchorBody;
use crate::error::AnchorError;
use crate::math::{Point, Real, Vector};
use crate::rod::FlexibleNode;

/// The quantity an anchor drives to agreement between the rigid-body and the rod node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CouplingMode {
    /// Correct the positional disagreement.
    ///
    /// The rod node receives `m / dt² * correction` and the rigid-body receives an impulse
    /// that also carries the node's accumulated forces.
    #[default]
    Position,
    /// Correct the velocity disagreement.
    ///
    /// The rod node receives `m / dt * correction` and the rigid-body receives the matching
    /// impulse, without any transfer of the node's accumulated forces.
    Velocity,
}

/// What a single [`Anchor::solve`] applied to both sides.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AnchorResponse {
    /// Fraction of the disagreement absorbed by the rod node.
    pub mass_ratio: Real,
    /// Force added to the rod node.
    pub soft_force: Vector<Real>,
    /// Impulse applied to the rigid-body (zero for immovable bodies).
    pub rigid_impulse: Vector<Real>,
    /// Application point of the impulse, relative to the rigid-body's center-of-mass.
    pub application_point: Vector<Real>,
}

/// A persistent attachment between one rigid-body and one rod node.
///
/// The anchor does not own either side: it only remembers where, in the rigid-body's local
/// frame, the rod node is attached. Both sides are borrowed for the duration of each call.
/// An anchor must be given back to [`Anchor::release`] so the node stops being flagged as
/// anchored.
///
/// Anchors are neither `Clone` nor `Deserialize`: [`Anchor::attach`] is the only way to obtain
/// one, so every live anchor corresponds to exactly one flagged node.
#[must_use = "an anchor must be released to clear the anchored flag of its rod node"]
#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize))]
pub struct Anchor {
    rest_offset: Point<Real>,
    mode: CouplingMode,
}

impl Anchor {
    /// Attaches `node` to `body` at the world-space point `world_point`.
    ///
    /// The anchor point is converted into the body's local frame right away, so it follows the
    /// body's subsequent translations and rotations. Fails with
    /// [`AnchorError::NodeAlreadyAnchored`] if another anchor already holds `node`.
    pub fn attach<B, N>(
        body: &B,
        node: &mut N,
        world_point: Point<Real>,
        mode: CouplingMode,
    ) -> Result<Self, AnchorError>
    where
        B: AnchorBody + ?Sized,
        N: FlexibleNode + ?Sized,
    {
        if node.is_anchored() {
            return Err(AnchorError::NodeAlreadyAnchored);
        }

        let rest_offset = body
            .world_transform()
            .inverse_transform_point(&world_point);
        node.set_anchored(true);
        tracing::debug!(?world_point, ?rest_offset, ?mode, "anchor attached");

        Ok(Self { rest_offset, mode })
    }

    /// Detaches this anchor from `node`.
    ///
    /// `node` must be the node given to [`Anchor::attach`]: the anchor does not remember which
    /// node it holds, and releasing it onto another node clears that node's flag instead.
    pub fn release<N: FlexibleNode + ?Sized>(self, node: &mut N) {
        node.set_anchored(false);
        tracing::debug!(rest_offset = ?self.rest_offset, "anchor released");
    }

    /// The anchor point, in the local frame of the rigid-body.
    pub fn rest_offset(&self) -> &Point<Real> {
        &self.rest_offset
    }

    /// The coupling formulation used by this anchor.
    pub fn mode(&self) -> CouplingMode {
        self.mode
    }

    /// The current world-space position of the anchor point.
    pub fn world_position<B: AnchorBody + ?Sized>(&self, body: &B) -> Point<Real> {
        body.world_transform() * self.rest_offset
    }

    /// The current anchor point relative to the body's center-of-mass.
    ///
    /// This is where impulses are applied so they induce the right torque.
    pub fn relative_position<B: AnchorBody + ?Sized>(&self, body: &B) -> Vector<Real> {
        self.world_position(body) - body.center_of_mass()
    }

    /// Fraction of a disagreement the rod node has to absorb.
    ///
    /// This is `1` exactly if the body is immovable.
    pub fn mass_ratio<B, N>(&self, body: &B, node: &N) -> Real
    where
        B: AnchorBody + ?Sized,
        N: FlexibleNode + ?Sized,
    {
        mass_ratio(rigid_mass(body.inv_mass()), node.mass())
    }

    /// Exchanges forces between `body` and `node` for a step of length `dt`.
    ///
    /// The node receives a force pulling it toward the anchor point, and the body receives an
    /// impulse at the anchor point pulling it toward the node, the split being given by
    /// [`Anchor::mass_ratio`]. Immovable bodies are never touched.
    ///
    /// Nothing is applied if `dt` isn't strictly positive.
    pub fn solve<B, N>(
        &self,
        body: &mut B,
        node: &mut N,
        dt: Real,
    ) -> Result<AnchorResponse, AnchorError>
    where
        B: AnchorBody + ?Sized,
        N: FlexibleNode + ?Sized,
    {
        // Also rejects NaN.
        if !(dt > 0.0) {
            return Err(AnchorError::NonPositiveTimestep(dt));
        }

        let inv_dt = 1.0 / dt;
        let rigid_mass = rigid_mass(body.inv_mass());
        let node_mass = node.mass();
        let mass_ratio = mass_ratio(rigid_mass, node_mass);
        let application_point = self.relative_position(&*body);

        let (soft_force, rigid_impulse) = match self.mode {
            CouplingMode::Position => {
                let pos_diff = self.world_position(&*body) - node.predicted_position();
                let soft_correction = pos_diff * mass_ratio;
                let rigid_correction = -pos_diff * (1.0 - mass_ratio);

                let soft_force = soft_correction * (inv_dt * inv_dt * node_mass);
                node.apply_force(soft_force);

                // The accumulated force read here includes `soft_force`.
                let rigid_impulse = rigid_correction * (inv_dt * rigid_mass)
                    + node.accumulated_force() * dt;
                (soft_force, rigid_impulse)
            }
            CouplingMode::Velocity => {
                let vel_diff =
                    body.velocity_at_local_point(&application_point) - node.predicted_velocity();
                let soft_correction = vel_diff * mass_ratio;
                let rigid_correction = -vel_diff * (1.0 - mass_ratio);

                let soft_force = soft_correction * (inv_dt * node_mass);
                node.apply_force(soft_force);

                // NOTE: unlike the position formulation, no accumulated force is transferred.
                (soft_force, rigid_correction * rigid_mass)
            }
        };

        let rigid_impulse = if rigid_mass > 0.0 {
            body.activate();
            body.apply_impulse(rigid_impulse, &application_point);
            rigid_impulse
        } else {
            Vector::zeros()
        };

        tracing::trace!(
            mass_ratio,
            ?soft_force,
            ?rigid_impulse,
            ?application_point,
            "anchor solved"
        );

        Ok(AnchorResponse {
            mass_ratio,
            soft_force,
            rigid_impulse,
            application_point,
        })
    }
}

fn rigid_mass(inv_mass: Real) -> Real {
    if inv_mass > 0.0 {
        1.0 / inv_mass
    } else {
        0.0
    }
}

fn mass_ratio(rigid_mass: Real, node_mass: Real) -> Real {
    // An immovable body leaves the whole correction to the rod.
    if rigid_mass == 0.0 {
        1.0
    } else {
        rigid_mass / (rigid_mass + node_mass)
    }
}

#[cfg(test)]
mod test {
    use super::{Anchor, CouplingMode};
    use crate::body::AnchorBody;
    use crate::error::AnchorError;
    use crate::math::{AngVector, Isometry, Point, Real, Rotation, Vector};
    use crate::rod::{FlexibleNode, RodPositionElement};
    use approx::assert_relative_eq;
    use num_traits::Zero;

    /// A rigid-body recording every impulse it receives.
    ///
    /// Its center-of-mass coincides with its origin.
    struct TestBody {
        pose: Isometry<Real>,
        inv_mass: Real,
        linvel: Vector<Real>,
        angvel: AngVector<Real>,
        impulses: Vec<(Vector<Real>, Vector<Real>)>,
        awake: bool,
    }

    impl TestBody {
        fn new(pose: Isometry<Real>, inv_mass: Real) -> Self {
            Self {
                pose,
                inv_mass,
                linvel: Vector::zeros(),
                angvel: AngVector::<Real>::zero(),
                impulses: vec![],
                awake: false,
            }
        }
    }

    impl AnchorBody for TestBody {
        fn world_transform(&self) -> Isometry<Real> {
            self.pose
        }

        fn center_of_mass(&self) -> Point<Real> {
            Point::from(self.pose.translation.vector)
        }

        fn inv_mass(&self) -> Real {
            self.inv_mass
        }

        fn velocity_at_local_point(&self, p: &Vector<Real>) -> Vector<Real> {
            #[cfg(feature = "dim2")]
            return self.linvel + Vector::new(-self.angvel * p.y, self.angvel * p.x);
            #[cfg(feature = "dim3")]
            return self.linvel + self.angvel.cross(p);
        }

        fn apply_impulse(&mut self, impulse: Vector<Real>, relative_point: &Vector<Real>) {
            self.impulses.push((impulse, *relative_point));
        }

        fn activate(&mut self) {
            self.awake = true;
        }
    }

    fn translation(v: Vector<Real>) -> Isometry<Real> {
        Isometry::from_parts(v.into(), Rotation::identity())
    }

    fn anchor_point() -> Point<Real> {
        Point::from(Vector::x() * 2.0 + Vector::y())
    }

    fn attach(body: &TestBody, node: &mut RodPositionElement, mode: CouplingMode) -> Anchor {
        Anchor::attach(body, node, anchor_point(), mode).unwrap()
    }

    #[test]
    fn immovable_body_gets_no_impulse() {
        let mut body = TestBody::new(translation(Vector::zeros()), 0.0);
        let mut node = RodPositionElement::new(anchor_point(), 1.5);
        let anchor = attach(&body, &mut node, CouplingMode::Position);
        node.pos_new = anchor_point() - Vector::y() * 0.1;
        node.force = Vector::x() * 7.0;

        assert_eq!(anchor.mass_ratio(&body, &node), 1.0);
        let response = anchor.solve(&mut body, &mut node, 0.1).unwrap();

        assert_eq!(response.mass_ratio, 1.0);
        assert_eq!(response.rigid_impulse, Vector::zeros());
        assert!(body.impulses.is_empty());
        // The whole correction goes to the rod node: 1.5 / 0.01 * 0.1 = 15.
        assert_relative_eq!(response.soft_force, Vector::y() * 15.0, epsilon = 1.0e-3);
        assert_relative_eq!(node.force, Vector::x() * 7.0 + Vector::y() * 15.0, epsilon = 1.0e-3);

        anchor.release(&mut node);
    }

    #[test]
    fn equal_masses_split_evenly() {
        let body = TestBody::new(translation(Vector::zeros()), 0.5);
        let mut node = RodPositionElement::new(anchor_point(), 2.0);
        let anchor = attach(&body, &mut node, CouplingMode::Position);
        assert_eq!(anchor.mass_ratio(&body, &node), 0.5);
        anchor.release(&mut node);
    }

    #[test]
    fn world_position_round_trip() {
        #[cfg(feature = "dim2")]
        let rotation = Rotation::new(0.7);
        #[cfg(feature = "dim3")]
        let rotation = Rotation::from_axis_angle(&Vector::z_axis(), 0.7);
        let pose = Isometry::from_parts((Vector::x() * 3.0 - Vector::y()).into(), rotation);
        let body = TestBody::new(pose, 1.0);
        let mut node = RodPositionElement::new(anchor_point(), 1.0);

        let anchor = attach(&body, &mut node, CouplingMode::Position);

        assert_relative_eq!(anchor.world_position(&body), anchor_point(), epsilon = 1.0e-5);
        assert_relative_eq!(
            *anchor.rest_offset(),
            pose.inverse_transform_point(&anchor_point()),
            epsilon = 1.0e-5
        );
        anchor.release(&mut node);
    }

    #[test]
    fn anchor_follows_body_rotation() {
        let com = Vector::x() - Vector::y() * 2.0;
        let mut body = TestBody::new(translation(com), 1.0);
        let mut node = RodPositionElement::new(anchor_point(), 1.0);
        let anchor = attach(&body, &mut node, CouplingMode::Position);

        #[cfg(feature = "dim2")]
        let rotation = Rotation::new(std::f32::consts::FRAC_PI_3);
        #[cfg(feature = "dim3")]
        let rotation = Rotation::from_axis_angle(&Vector::y_axis(), std::f32::consts::FRAC_PI_3);
        body.pose.rotation = rotation;

        let expected = Point::from(com + rotation * (anchor_point().coords - com));
        assert_relative_eq!(anchor.world_position(&body), expected, epsilon = 1.0e-5);
        assert_relative_eq!(
            anchor.relative_position(&body),
            rotation * (anchor_point().coords - com),
            epsilon = 1.0e-5
        );
        anchor.release(&mut node);
    }

    #[test]
    fn position_force_matches_correction() {
        let mut body = TestBody::new(translation(Vector::zeros()), 0.5);
        let mut node = RodPositionElement::new(anchor_point(), 2.0);
        let anchor = attach(&body, &mut node, CouplingMode::Position);
        node.pos_new = anchor_point() - Vector::x();

        let response = anchor.solve(&mut body, &mut node, 0.01).unwrap();

        assert_eq!(response.mass_ratio, 0.5);
        assert_relative_eq!(response.soft_force, Vector::x() * 10_000.0, max_relative = 1.0e-5);
        assert_relative_eq!(node.force, Vector::x() * 10_000.0, max_relative = 1.0e-5);
        // With equal masses, the transferred node force cancels the rigid correction.
        assert_relative_eq!(response.rigid_impulse, Vector::zeros(), epsilon = 1.0e-3);
        assert!(body.awake);
        assert_eq!(body.impulses.len(), 1);
        assert_relative_eq!(body.impulses[0].1, anchor_point().coords, epsilon = 1.0e-5);
        anchor.release(&mut node);
    }

    #[test]
    fn position_mode_transfers_node_forces() {
        let mut body = TestBody::new(translation(Vector::zeros()), 0.25);
        let mut node = RodPositionElement::new(anchor_point(), 1.0);
        let anchor = attach(&body, &mut node, CouplingMode::Position);
        node.force = Vector::y() * 5.0;

        let response = anchor.solve(&mut body, &mut node, 0.01).unwrap();

        // No disagreement: the only impulse is the node's internal force times dt.
        assert_relative_eq!(response.soft_force, Vector::zeros());
        assert_relative_eq!(response.rigid_impulse, Vector::y() * 0.05, epsilon = 1.0e-6);
        assert_relative_eq!(body.impulses[0].0, Vector::y() * 0.05, epsilon = 1.0e-6);
        anchor.release(&mut node);
    }

    #[test]
    fn velocity_mode() {
        let mut body = TestBody::new(translation(Vector::zeros()), 0.5);
        body.linvel = Vector::x();
        let mut node = RodPositionElement::new(anchor_point(), 2.0);
        let anchor = attach(&body, &mut node, CouplingMode::Velocity);
        node.force = Vector::y() * 5.0;

        let response = anchor.solve(&mut body, &mut node, 0.01).unwrap();

        assert_eq!(anchor.mode(), CouplingMode::Velocity);
        assert_relative_eq!(response.soft_force, Vector::x() * 100.0, max_relative = 1.0e-5);
        // Documented asymmetry: the node's accumulated force is not transferred in this mode.
        assert_relative_eq!(response.rigid_impulse, -Vector::x(), epsilon = 1.0e-5);
        assert_relative_eq!(body.impulses[0].0, -Vector::x(), epsilon = 1.0e-5);
        anchor.release(&mut node);
    }

    #[test]
    fn velocity_mode_uses_point_velocity() {
        let mut body = TestBody::new(translation(Vector::zeros()), 0.0);
        #[cfg(feature = "dim2")]
        {
            body.angvel = 1.0;
        }
        #[cfg(feature = "dim3")]
        {
            body.angvel = Vector::z();
        }
        let mut node = RodPositionElement::new(Point::from(Vector::x()), 1.0);
        let point = Point::from(Vector::x());
        let anchor = Anchor::attach(&body, &mut node, point, CouplingMode::Velocity).unwrap();

        let response = anchor.solve(&mut body, &mut node, 0.5).unwrap();

        // The anchor point moves along +y at unit speed.
        assert_relative_eq!(response.soft_force, Vector::y() * 2.0, epsilon = 1.0e-5);
        assert!(body.impulses.is_empty());
        anchor.release(&mut node);
    }

    #[test]
    fn non_positive_timestep_is_rejected() {
        let mut body = TestBody::new(translation(Vector::zeros()), 1.0);
        let mut node = RodPositionElement::new(anchor_point(), 1.0);
        let anchor = attach(&body, &mut node, CouplingMode::Position);
        node.pos_new = Point::origin();

        for dt in [0.0, -0.01, Real::NAN] {
            let result = anchor.solve(&mut body, &mut node, dt);
            assert!(matches!(result, Err(AnchorError::NonPositiveTimestep(_))));
        }

        assert_eq!(node.force, Vector::zeros());
        assert!(body.impulses.is_empty());
        assert!(!body.awake);
        anchor.release(&mut node);
    }

    #[test]
    fn anchored_flag_lifecycle() {
        let body = TestBody::new(translation(Vector::zeros()), 1.0);
        let mut node = RodPositionElement::new(anchor_point(), 1.0);

        let first = attach(&body, &mut node, CouplingMode::Position);
        assert!(node.is_anchored());

        // A second attachment on the same node is refused and does not touch the flag.
        let second = Anchor::attach(&body, &mut node, anchor_point(), CouplingMode::Velocity);
        assert_eq!(second, Err(AnchorError::NodeAlreadyAnchored));
        assert!(node.is_anchored());

        first.release(&mut node);
        assert!(!node.is_anchored());

        // Once released, the node can be anchored again.
        let third = attach(&body, &mut node, CouplingMode::Velocity);
        assert!(node.is_anchored());
        third.release(&mut node);
        assert!(!node.is_anchored());
    }
}
