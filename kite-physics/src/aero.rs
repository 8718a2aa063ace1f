//! Panel-based aerodynamics.
//!
//! Every sail panel is treated as a flat plate. Lift and drag are evaluated
//! per panel from the local angle of attack, so any asymmetry in attitude
//! shows up as a net torque. In flight each panel sees its own apparent
//! wind, including the part due to the kite's rotation, and torques are taken
//! about the centre of mass.

use na::UnitQuaternion;
use serde::Serialize;

use crate::Vec3;
use crate::body::{Loads, RigidBodyState};
use crate::config::{AeroParams, LiftDragCurve};
use crate::geometry::{KiteGeometry, Panel};

/// Below this squared apparent wind speed no force is produced.
pub const MIN_WIND_SQ: f64 = 0.01;
/// Below this |cos θ| between normal and wind the flow is treated as grazing.
pub const GRAZING_COS: f64 = 0.01;
const LIFT_AXIS_EPS: f64 = 1e-9;

impl LiftDragCurve {
    /// `(Cl, Cd)` at angle of attack `alpha`, radians in [0, π/2].
    pub fn coefficients(&self, alpha: f64) -> (f64, f64) {
        use std::f64::consts::FRAC_PI_2;

        let alpha = alpha.clamp(0.0, FRAC_PI_2);
        let stall = self.stall_deg.to_radians().clamp(1e-3, FRAC_PI_2 - 1e-3);
        let cl = if alpha <= stall {
            self.cl_zero + (self.cl_max - self.cl_zero) * (FRAC_PI_2 * alpha / stall).sin()
        } else {
            let t = (alpha - stall) / (FRAC_PI_2 - stall);
            self.cl_ninety + (self.cl_max - self.cl_ninety) * (FRAC_PI_2 * t).cos()
        };
        let cd = self.cd_zero + (self.cd_max - self.cd_zero) * alpha.sin().powf(self.cd_exponent);
        (cl, cd)
    }
}

/// Aerodynamic result for one panel, one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForceSample {
    pub panel: usize,
    pub lift: Vec3,
    pub drag: Vec3,
    pub force: Vec3,
    /// Outward (front) panel normal, world frame.
    pub normal: Vec3,
    pub apparent_wind: Vec3,
    /// Panel centroid as a world-frame offset from the point torques are taken about.
    pub lever_arm: Vec3,
    pub area: f64,
    /// Angle of attack in radians, zero when no force was produced.
    pub alpha: f64,
}

impl ForceSample {
    fn idle(panel: usize, lever_arm: Vec3, normal: Vec3, apparent_wind: Vec3, area: f64) -> Self {
        Self {
            panel,
            lift: Vec3::zeros(),
            drag: Vec3::zeros(),
            force: Vec3::zeros(),
            normal,
            apparent_wind,
            lever_arm,
            area,
            alpha: 0.0,
        }
    }
}

/// Lift and drag on every panel of `geometry` for a uniform apparent wind,
/// with lever arms from the body origin.
pub fn compute_panel_forces(
    geometry: &KiteGeometry,
    orientation: &UnitQuaternion<f64>,
    apparent_wind: &Vec3,
    params: &AeroParams,
) -> Vec<ForceSample> {
    geometry
        .panels()
        .iter()
        .enumerate()
        .map(|(index, panel)| {
            let lever_arm = orientation * panel.centroid();
            panel_force(index, panel, orientation, lever_arm, apparent_wind, params)
        })
        .collect()
}

/// Lift and drag on every panel of a moving body in `wind`. Each panel sees
/// the wind minus the velocity of its own centroid, and lever arms run from
/// the centre of mass.
pub fn compute_body_panel_forces(
    geometry: &KiteGeometry,
    body: &RigidBodyState,
    wind: &Vec3,
    params: &AeroParams,
) -> Vec<ForceSample> {
    geometry
        .panels()
        .iter()
        .enumerate()
        .map(|(index, panel)| {
            let lever_arm = body.lever_arm(&panel.centroid());
            let apparent_wind = wind - body.point_velocity(&lever_arm);
            panel_force(index, panel, &body.orientation, lever_arm, &apparent_wind, params)
        })
        .collect()
}

fn panel_force(
    index: usize,
    panel: &Panel,
    orientation: &UnitQuaternion<f64>,
    lever_arm: Vec3,
    apparent_wind: &Vec3,
    params: &AeroParams,
) -> ForceSample {
    let cross = panel.cross();
    let area = 0.5 * cross.norm();
    let Some(local_normal) = cross.try_normalize(LIFT_AXIS_EPS) else {
        return ForceSample::idle(index, lever_arm, Vec3::zeros(), *apparent_wind, area);
    };
    let normal = orientation * local_normal;
    let idle = ForceSample::idle(index, lever_arm, normal, *apparent_wind, area);

    let wind_sq = apparent_wind.norm_squared();
    if wind_sq < MIN_WIND_SQ {
        return idle;
    }
    let wind_dir = apparent_wind / wind_sq.sqrt();
    let cos_theta = normal.dot(&wind_dir);
    if cos_theta.abs() < GRAZING_COS {
        return idle;
    }

    let alpha = cos_theta.abs().min(1.0).asin();
    let (cl, cd) = params.curve.coefficients(alpha);
    let q = 0.5 * params.air_density * wind_sq;
    let mut lift_mag = q * area * cl;
    let mut drag_mag = q * area * cd;

    // Normal of the face the flow pushes on, pointing downstream.
    let pushed = if cos_theta > 0.0 { normal } else { -normal };
    let lift_dir = wind_dir
        .cross(&pushed.cross(&wind_dir))
        .try_normalize(LIFT_AXIS_EPS);
    if lift_dir.is_none() {
        lift_mag = 0.0;
    }

    if let Some(max) = params.max_panel_force {
        let total = lift_mag.hypot(drag_mag);
        if total > max {
            let scale = max / total;
            lift_mag *= scale;
            drag_mag *= scale;
        }
    }

    let lift = lift_dir.map_or_else(Vec3::zeros, |dir| dir * lift_mag);
    let drag = wind_dir * drag_mag;
    ForceSample {
        lift,
        drag,
        force: lift + drag,
        alpha,
        ..idle
    }
}

/// Sum of the panel forces and their torques about the lever arm origin.
pub fn total_loads(samples: &[ForceSample]) -> Loads {
    let mut loads = Loads::zero();
    for sample in samples {
        loads.add_at(&sample.lever_arm, &sample.force);
    }
    loads
}
