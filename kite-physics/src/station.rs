//! Pilot station on the ground, holding the two line handles.

use na::UnitQuaternion;
use serde::Serialize;

use crate::Vec3;
use crate::config::StationParams;

/// World positions of the two line handles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Handles {
    pub left: Vec3,
    pub right: Vec3,
}

impl Handles {
    pub fn midpoint(&self) -> Vec3 {
        (self.left + self.right) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundStation {
    params: StationParams,
}

impl GroundStation {
    pub fn new(params: &StationParams) -> Self {
        Self {
            params: params.clamped(),
        }
    }

    pub fn params(&self) -> &StationParams {
        &self.params
    }

    fn rotation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vec3::y_axis(), self.params.heading_deg.to_radians())
    }

    /// Horizontal unit vector the pilot is facing.
    pub fn facing(&self) -> Vec3 {
        self.rotation() * Vec3::new(0.0, 0.0, -1.0)
    }

    pub fn handles(&self) -> Handles {
        let [x, y, z] = self.params.position;
        let base = Vec3::new(x, y + self.params.handle_height, z);
        // Pilot's left is -X when facing -Z.
        let half = self.rotation() * Vec3::new(self.params.handle_spacing / 2.0, 0.0, 0.0);
        Handles {
            left: base - half,
            right: base + half,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_handles() {
        let handles = GroundStation::new(&StationParams::default()).handles();
        assert_relative_eq!(handles.left, Vec3::new(-0.25, 1.2, 0.0), epsilon = 1e-12);
        assert_relative_eq!(handles.right, Vec3::new(0.25, 1.2, 0.0), epsilon = 1e-12);
        assert_relative_eq!(handles.midpoint(), Vec3::new(0.0, 1.2, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn heading_turns_the_handle_bar() {
        let station = GroundStation::new(&StationParams {
            heading_deg: 90.0,
            position: [1.0, 0.0, 2.0],
            ..Default::default()
        });
        // Facing -X after a quarter turn to the left; the left hand is at +Z.
        assert_relative_eq!(station.facing(), Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
        let handles = station.handles();
        assert_relative_eq!(handles.left, Vec3::new(1.0, 1.2, 2.25), epsilon = 1e-12);
        assert_relative_eq!(handles.right, Vec3::new(1.0, 1.2, 1.75), epsilon = 1e-12);
    }
}
