//! Rigid body state of the kite and its explicit Euler integration.

use bevy::prelude::Component;
use na::{Unit, UnitQuaternion};
use serde::Serialize;
use std::ops::{Add, AddAssign};
use tracing::warn;

use crate::Vec3;
use crate::config::IntegratorLimits;

/// Net force and torque (about the centre of mass), world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Loads {
    pub force: Vec3,
    pub torque: Vec3,
}

impl Default for Loads {
    fn default() -> Self {
        Self::zero()
    }
}

impl Loads {
    pub fn zero() -> Self {
        Self {
            force: Vec3::zeros(),
            torque: Vec3::zeros(),
        }
    }

    /// Add `force` applied at `lever` (world offset from the centre of mass).
    pub fn add_at(&mut self, lever: &Vec3, force: &Vec3) {
        self.force += force;
        self.torque += lever.cross(force);
    }
}

impl AddAssign for Loads {
    fn add_assign(&mut self, rhs: Self) {
        self.force += rhs.force;
        self.torque += rhs.torque;
    }
}

impl Add for Loads {
    type Output = Loads;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Component, Serialize)]
pub struct RigidBodyState {
    /// Position of the body origin, world frame.
    pub position: Vec3,
    /// Velocity of the centre of mass.
    pub velocity: Vec3,
    /// Orientation: body -> world
    pub orientation: UnitQuaternion<f64>,
    /// Angular velocity, world frame.
    pub angular_velocity: Vec3,
    pub mass: f64,
    /// Principal inertia about the centre of mass, body frame.
    pub inertia: Vec3,
    /// Centre of mass relative to the body origin, body frame.
    pub center_of_mass: Vec3,
}

impl RigidBodyState {
    pub fn new(position: Vec3, orientation: UnitQuaternion<f64>, mass: f64, inertia: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::zeros(),
            orientation,
            angular_velocity: Vec3::zeros(),
            mass: mass.max(f64::MIN_POSITIVE),
            inertia: inertia.map(|i| i.max(f64::MIN_POSITIVE)),
            center_of_mass: Vec3::zeros(),
        }
    }

    pub fn with_center_of_mass(mut self, center_of_mass: Vec3) -> Self {
        self.center_of_mass = center_of_mass;
        self
    }

    /// Put the body at rest at a new pose.
    pub fn reset(&mut self, position: Vec3, orientation: UnitQuaternion<f64>) {
        self.position = position;
        self.orientation = orientation;
        self.velocity = Vec3::zeros();
        self.angular_velocity = Vec3::zeros();
    }

    /// World-frame offset of a body-frame point from the centre of mass.
    pub fn lever_arm(&self, local: &Vec3) -> Vec3 {
        self.orientation * (local - self.center_of_mass)
    }

    pub fn world_point(&self, local: &Vec3) -> Vec3 {
        self.position + self.orientation * local
    }

    pub fn world_center_of_mass(&self) -> Vec3 {
        self.world_point(&self.center_of_mass)
    }

    /// Velocity of a material point at world offset `lever` from the centre of mass.
    pub fn point_velocity(&self, lever: &Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(lever)
    }

    /// World-frame angular acceleration for a world-frame torque. The diagonal
    /// inertia lives in the body frame, so the torque is divided there.
    pub fn angular_acceleration(&self, torque_w: &Vec3) -> Vec3 {
        let torque_b = self.orientation.inverse_transform_vector(torque_w);
        self.orientation
            .transform_vector(&torque_b.component_div(&self.inertia))
    }

    /// Integrate velocities from the summed loads, then apply the safety
    /// clamps. Non-finite results are zeroed.
    pub fn integrate_velocities(&mut self, loads: &Loads, dt: f64, limits: &IntegratorLimits) {
        let acceleration = loads.force / self.mass;
        self.velocity += acceleration * dt;
        self.angular_velocity += self.angular_acceleration(&loads.torque) * dt;

        if !is_finite(&self.velocity) {
            warn!("non-finite velocity, zeroing");
            self.velocity = Vec3::zeros();
        }
        if !is_finite(&self.angular_velocity) {
            warn!("non-finite angular velocity, zeroing");
            self.angular_velocity = Vec3::zeros();
        }
        self.velocity = self.velocity.cap_magnitude(limits.max_speed);
        self.angular_velocity = self.angular_velocity.cap_magnitude(limits.max_angular_speed);
    }

    /// Advance the position. Returns false if the result is not finite, in
    /// which case the position is left unchanged for the caller to recover.
    pub fn integrate_position(&mut self, dt: f64) -> bool {
        let next = self.position + self.velocity * dt;
        if !is_finite(&next) {
            return false;
        }
        self.position = next;
        true
    }

    /// Rotate the orientation by `angular_velocity * dt` about the centre of
    /// mass, moving the origin with it. An increment of π or more is treated
    /// as a blow-up and skipped. Returns whether it applied.
    pub fn integrate_orientation(&mut self, dt: f64) -> bool {
        let omega = self.angular_velocity.norm();
        if omega <= 0.0 {
            return false;
        }
        let angle = omega * dt;
        if !angle.is_finite() || angle >= std::f64::consts::PI {
            warn!(angle, "orientation increment too large, skipping");
            return false;
        }
        let pivot = self.world_center_of_mass();
        let dq = exp_quat(&(self.angular_velocity * dt));
        self.orientation = dq * self.orientation;
        self.orientation.renormalize();
        self.position = pivot - self.orientation * self.center_of_mass;
        true
    }
}

fn is_finite(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// Exponential map: converts axis-angle vector to unit quaternion.
///
/// Given a 3D vector v = θ * n (where n is unit axis, θ is rotation angle),
/// returns the unit quaternion q representing rotation by θ radians around n.
pub fn exp_quat(v: &Vec3) -> UnitQuaternion<f64> {
    let theta = v.norm();
    if theta < 1e-12 {
        UnitQuaternion::identity()
    } else {
        UnitQuaternion::from_axis_angle(&Unit::new_normalize(*v), theta)
    }
}
