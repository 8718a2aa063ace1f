//! Uniform wind field.

use na::Unit;

use crate::Vec3;
use crate::config::{KMH_TO_MS, WindParams};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wind {
    params: WindParams,
    /// m/s
    speed: f64,
    direction: Unit<Vec3>,
}

impl Wind {
    pub fn new(params: &WindParams) -> Self {
        let params = params.clamped();
        let [x, y, z] = params.direction;
        Self {
            params,
            speed: params.speed_kmh * KMH_TO_MS,
            direction: Unit::new_unchecked(Vec3::new(x, y, z)),
        }
    }

    pub fn params(&self) -> &WindParams {
        &self.params
    }

    /// Speed in m/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn speed_kmh(&self) -> f64 {
        self.params.speed_kmh
    }

    pub fn direction(&self) -> &Unit<Vec3> {
        &self.direction
    }

    pub fn velocity(&self) -> Vec3 {
        self.direction.into_inner() * self.speed
    }

    pub fn set_speed_kmh(&mut self, speed_kmh: f64) {
        *self = Self::new(&WindParams {
            speed_kmh,
            ..self.params
        });
    }

    pub fn set_direction(&mut self, direction: [f64; 3]) {
        *self = Self::new(&WindParams {
            direction,
            ..self.params
        });
    }
}

/// Wind felt by a body moving at `kite_velocity`.
pub fn apparent_wind(wind_velocity: &Vec3, kite_velocity: &Vec3) -> Vec3 {
    wind_velocity - kite_velocity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WIND_SPEED_MAX_KMH;
    use approx::assert_relative_eq;

    #[test]
    fn velocity_from_kmh() {
        let wind = Wind::new(&WindParams {
            speed_kmh: 36.0,
            direction: [0.0, 0.0, -2.0],
        });
        assert_relative_eq!(wind.velocity(), Vec3::new(0.0, 0.0, -10.0), epsilon = 1e-12);
    }

    #[test]
    fn apparent_wind_subtracts_body_motion() {
        let wind = Vec3::new(0.0, 0.0, -5.0);
        let kite = Vec3::new(1.0, 2.0, -5.0);
        assert_eq!(apparent_wind(&wind, &kite), Vec3::new(-1.0, -2.0, 0.0));
    }

    #[test]
    fn setters_clamp() {
        let mut wind = Wind::new(&WindParams::default());
        wind.set_speed_kmh(1000.0);
        assert_eq!(wind.speed_kmh(), WIND_SPEED_MAX_KMH);
        wind.set_speed_kmh(-4.0);
        assert_eq!(wind.speed(), 0.0);
        wind.set_direction([0.0, 0.0, 0.0]);
        assert_eq!(wind.direction().into_inner(), Vec3::new(0.0, 0.0, -1.0));
        wind.set_direction([2.0, 0.0, 0.0]);
        assert_relative_eq!(wind.direction().into_inner(), Vec3::x());
    }
}
