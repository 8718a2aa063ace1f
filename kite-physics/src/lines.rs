//! The two control lines between the pilot's handles and the bridle points.
//!
//! Each line is a one-sided spring-damper with a small constant tension when
//! slack. The raw tension is low-pass filtered across steps so that switching
//! between the slack and taut regimes never shows up as a force spike.

use serde::Serialize;
use tracing::debug;

use crate::Vec3;
use crate::body::{Loads, RigidBodyState};
use crate::config::{TetherParams, TetherUpdate, clamp_field};
use crate::geometry::{KiteGeometry, PointId};
use crate::station::Handles;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineSide {
    Left,
    Right,
}

impl LineSide {
    pub const BOTH: [LineSide; 2] = [LineSide::Left, LineSide::Right];

    /// Bridle point the line is tied to.
    pub fn control_point(self) -> PointId {
        match self {
            LineSide::Left => PointId::LeftCtrl,
            LineSide::Right => PointId::RightCtrl,
        }
    }

    /// Sign of this line's share of the delta: positive delta shortens the left line.
    fn sign(self) -> f64 {
        match self {
            LineSide::Left => -1.0,
            LineSide::Right => 1.0,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn handle(self, handles: &Handles) -> Vec3 {
        match self {
            LineSide::Left => handles.left,
            LineSide::Right => handles.right,
        }
    }
}

/// State of one line after the last force evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineReading {
    /// Smoothed tension, newtons.
    pub tension: f64,
    pub target_length: f64,
    /// Handle to bridle point distance.
    pub distance: f64,
    /// Whether the line was at or beyond its rest length.
    pub taut: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TetherSystem {
    params: TetherParams,
    delta: f64,
    smoothed: [f64; 2],
    readings: [LineReading; 2],
}

impl TetherSystem {
    pub fn new(params: &TetherParams) -> Self {
        let params = params.clamped();
        let mut tether = Self {
            params,
            delta: 0.0,
            smoothed: [params.tension_min; 2],
            readings: [LineReading {
                tension: params.tension_min,
                target_length: params.base_length,
                distance: 0.0,
                taut: false,
            }; 2],
        };
        tether.refresh_targets();
        tether
    }

    pub fn params(&self) -> &TetherParams {
        &self.params
    }

    pub fn apply(&mut self, update: &TetherUpdate) {
        self.params.apply(update);
        self.delta = self.delta.clamp(-self.params.delta_max, self.params.delta_max);
        self.refresh_targets();
    }

    pub fn base_length(&self) -> f64 {
        self.params.base_length
    }

    pub fn set_base_length(&mut self, length: f64) {
        self.apply(&TetherUpdate {
            base_length: Some(length),
            ..Default::default()
        });
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Set the differential length, clamped to ±`delta_max`.
    pub fn set_delta(&mut self, delta: f64) {
        let max = self.params.delta_max;
        self.delta = clamp_field("tether.delta", delta, -max, max, self.delta);
        self.refresh_targets();
    }

    pub fn adjust_delta(&mut self, change: f64) {
        self.set_delta(self.delta + change);
    }

    pub fn target_length(&self, side: LineSide) -> f64 {
        self.params.base_length + side.sign() * self.delta / 2.0
    }

    pub fn rest_length(&self, side: LineSide) -> f64 {
        self.target_length(side) * self.params.rest_ratio
    }

    pub fn smoothed_tension(&self, side: LineSide) -> f64 {
        self.smoothed[side.index()]
    }

    pub fn reading(&self, side: LineSide) -> LineReading {
        self.readings[side.index()]
    }

    /// Forget the filter history.
    pub fn reset_tension(&mut self) {
        self.smoothed = [self.params.tension_min; 2];
        for side in LineSide::BOTH {
            self.readings[side.index()].tension = self.params.tension_min;
        }
    }

    fn refresh_targets(&mut self) {
        for side in LineSide::BOTH {
            self.readings[side.index()].target_length = self.target_length(side);
        }
    }

    /// Unfiltered tension for a line at `distance`, stretching at `stretch_rate`.
    pub fn raw_tension(&self, side: LineSide, distance: f64, stretch_rate: f64) -> f64 {
        let p = &self.params;
        let rest = self.rest_length(side);
        if distance < rest {
            return p.tension_min;
        }
        let tension = p.stiffness * (distance - rest) + p.damping * stretch_rate;
        tension.clamp(p.tension_min, p.tension_max)
    }

    /// Line loads on the body, advancing the tension filter by one sample.
    pub fn compute_forces(
        &mut self,
        body: &RigidBodyState,
        handles: &Handles,
        geometry: &KiteGeometry,
    ) -> Loads {
        let mut loads = Loads::zero();
        for side in LineSide::BOTH {
            let local = geometry.point(side.control_point());
            let lever = body.lever_arm(&local);
            let attach = body.world_point(&local);
            let diff = attach - side.handle(handles);
            let distance = diff.norm();
            let i = side.index();
            self.readings[i].distance = distance;
            if distance < self.params.min_distance {
                debug!(?side, distance, "line handle on its bridle point, skipped");
                continue;
            }
            let direction = diff / distance;
            let stretch_rate = body.point_velocity(&lever).dot(&direction);
            let raw = self.raw_tension(side, distance, stretch_rate);

            let alpha = self.params.smoothing;
            let smoothed = (alpha * raw + (1.0 - alpha) * self.smoothed[i])
                .clamp(self.params.tension_min, self.params.tension_max);
            self.smoothed[i] = smoothed;
            self.readings[i] = LineReading {
                tension: smoothed,
                target_length: self.target_length(side),
                distance,
                taut: distance >= self.rest_length(side),
            };

            loads.add_at(&lever, &(-direction * smoothed));
        }
        loads
    }
}
