//! Ground contact.

use crate::body::RigidBodyState;
use crate::config::GroundParams;
use crate::geometry::KiteGeometry;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlane {
    params: GroundParams,
}

impl GroundPlane {
    pub fn new(params: &GroundParams) -> Self {
        Self {
            params: params.clamped(),
        }
    }

    pub fn params(&self) -> &GroundParams {
        &self.params
    }

    pub fn height(&self) -> f64 {
        self.params.height
    }

    /// Deepest penetration of any structural point below the ground, or zero.
    pub fn penetration(&self, body: &RigidBodyState, geometry: &KiteGeometry) -> f64 {
        geometry
            .points()
            .map(|(_, local)| self.params.height - body.world_point(&local).y)
            .fold(0.0, f64::max)
    }

    /// Lift the body out of the ground as one rigid correction, then bounce
    /// and scrub the velocities. Returns whether contact happened.
    pub fn apply_constraints(&self, body: &mut RigidBodyState, geometry: &KiteGeometry) -> bool {
        let depth = self.penetration(body, geometry);
        if depth <= 0.0 {
            return false;
        }
        body.position.y += depth;
        if body.velocity.y < 0.0 {
            body.velocity.y *= -self.params.restitution;
        }
        body.velocity.x *= self.params.friction;
        body.velocity.z *= self.params.friction;
        body.angular_velocity *= self.params.angular_damping;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec3;
    use crate::config::GeometryParams;
    use approx::assert_relative_eq;
    use na::UnitQuaternion;
    use std::f64::consts::PI;

    fn body(position: Vec3, orientation: UnitQuaternion<f64>) -> RigidBodyState {
        RigidBodyState::new(position, orientation, 0.31, Vec3::new(0.03, 0.04, 0.06))
    }

    #[test]
    fn airborne_body_is_untouched() {
        let geometry = KiteGeometry::build(&GeometryParams::default());
        let ground = GroundPlane::new(&GroundParams::default());
        let mut b = body(Vec3::new(0.0, 3.0, 0.0), UnitQuaternion::identity());
        b.velocity = Vec3::new(1.0, -2.0, 3.0);
        let before = b.clone();
        assert!(!ground.apply_constraints(&mut b, &geometry));
        assert_eq!(b, before);
    }

    #[test]
    fn penetration_is_resolved_with_bounce_and_friction() {
        let geometry = KiteGeometry::build(&GeometryParams::default());
        let ground = GroundPlane::new(&GroundParams::default());
        let mut b = body(Vec3::new(0.0, -0.2, 0.0), UnitQuaternion::identity());
        b.velocity = Vec3::new(2.0, -4.0, -1.0);
        b.angular_velocity = Vec3::new(1.0, 1.0, 1.0);

        assert!(ground.apply_constraints(&mut b, &geometry));
        // Spine bottom and wing tips are the lowest points at y = 0 locally.
        assert_relative_eq!(b.position.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(b.velocity, Vec3::new(1.9, 2.0, -0.95), epsilon = 1e-12);
        assert_relative_eq!(b.angular_velocity, Vec3::new(0.9, 0.9, 0.9), epsilon = 1e-12);
        assert_eq!(ground.penetration(&b, &geometry), 0.0);
    }

    #[test]
    fn rising_body_keeps_vertical_speed() {
        let geometry = KiteGeometry::build(&GeometryParams::default());
        let ground = GroundPlane::new(&GroundParams::default());
        let mut b = body(Vec3::new(0.0, -0.1, 0.0), UnitQuaternion::identity());
        b.velocity = Vec3::new(0.0, 3.0, 0.0);
        ground.apply_constraints(&mut b, &geometry);
        assert_eq!(b.velocity.y, 3.0);
    }

    #[test]
    fn upside_down_nose_is_the_deepest_point() {
        let geometry = KiteGeometry::build(&GeometryParams::default());
        let ground = GroundPlane::new(&GroundParams {
            height: 1.0,
            ..Default::default()
        });
        let flipped = UnitQuaternion::from_axis_angle(&Vec3::z_axis(), PI);
        let mut b = body(Vec3::new(0.0, 1.5, 0.0), flipped);
        // Nose points down to y = 1.5 - 0.65.
        assert_relative_eq!(ground.penetration(&b, &geometry), 0.15, epsilon = 1e-9);
        ground.apply_constraints(&mut b, &geometry);
        let lowest = geometry
            .points()
            .map(|(_, p)| b.world_point(&p).y)
            .fold(f64::INFINITY, f64::min);
        assert_relative_eq!(lowest, 1.0, epsilon = 1e-9);
    }
}
