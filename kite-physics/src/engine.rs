//! The simulation driver.
//!
//! [`KiteSim`] owns every piece of state. The outside world talks to it
//! through [`SimCommand`]s, which are queued and applied at the start of the
//! next step, so the rigid body only ever has one writer.

use std::collections::VecDeque;
use std::sync::Arc;

use bevy::prelude::Resource;
use na::UnitQuaternion;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::Vec3;
use crate::aero::{ForceSample, compute_body_panel_forces, total_loads};
use crate::body::{Loads, RigidBodyState};
use crate::config::{GeometryUpdate, SimConfig, TetherUpdate};
use crate::geometry::{KiteGeometry, PointId};
use crate::ground::GroundPlane;
use crate::lines::{LineReading, LineSide, TetherSystem};
use crate::station::{GroundStation, Handles};
use crate::wind::{Wind, apparent_wind};

/// Slack left under the frame/substep ratio before rounding up to another substep.
const SUBSTEP_ROUNDING: f64 = 1e-9;

/// Input from the outside world, applied at the start of the next step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SimCommand {
    SetLineDelta(f64),
    AdjustLineDelta(f64),
    SetBaseLength(f64),
    SetWindSpeedKmh(f64),
    SetWindDirection([f64; 3]),
    UpdateGeometry(GeometryUpdate),
    UpdateTether(TetherUpdate),
    Reset,
}

/// Loads of the last step, split by source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadBudget {
    pub aero: Loads,
    pub gravity: Loads,
    pub tether: Loads,
}

impl LoadBudget {
    pub fn total(&self) -> Loads {
        self.aero + self.gravity + self.tether
    }
}

/// Per-step snapshot for loggers and overlays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Telemetry {
    pub time: f64,
    pub position: Vec3,
    pub velocity: Vec3,
    pub speed: f64,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
    pub apparent_wind_speed: f64,
    pub aero_force: f64,
    pub gravity_force: f64,
    pub tether_force: f64,
    pub total_force: f64,
    pub left: LineReading,
    pub right: LineReading,
    pub delta: f64,
}

#[derive(Debug, Clone, Resource)]
pub struct KiteSim {
    config: SimConfig,
    geometry: Arc<KiteGeometry>,
    body: RigidBodyState,
    tether: TetherSystem,
    wind: Wind,
    ground: GroundPlane,
    station: GroundStation,
    commands: VecDeque<SimCommand>,
    panel_forces: Vec<ForceSample>,
    loads: LoadBudget,
    telemetry: Telemetry,
    time: f64,
}

impl Default for KiteSim {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl KiteSim {
    pub fn new(config: SimConfig) -> Self {
        let config = config.clamped();
        let geometry = Arc::new(KiteGeometry::build(&config.geometry));
        let tether = TetherSystem::new(&config.tether);
        let wind = Wind::new(&config.wind);
        let station = GroundStation::new(&config.station);
        let (position, orientation) = launch_pose(&config, &geometry, &tether, &wind, &station);
        let position = config
            .body
            .initial_position
            .map_or(position, |[x, y, z]| Vec3::new(x, y, z));
        let [ix, iy, iz] = config.body.inertia;
        let body = RigidBodyState::new(position, orientation, config.body.mass, Vec3::new(ix, iy, iz))
            .with_center_of_mass(geometry.center_of_mass());

        let mut sim = Self {
            config,
            geometry,
            body,
            tether,
            wind,
            ground: GroundPlane::new(&config.ground),
            station,
            commands: VecDeque::new(),
            panel_forces: Vec::new(),
            loads: LoadBudget::default(),
            telemetry: Telemetry::empty(),
            time: 0.0,
        };
        sim.telemetry = sim.capture();
        sim
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Shared, read-only geometry. A geometry update swaps in a new one.
    pub fn geometry(&self) -> &Arc<KiteGeometry> {
        &self.geometry
    }

    pub fn body(&self) -> &RigidBodyState {
        &self.body
    }

    pub fn tether(&self) -> &TetherSystem {
        &self.tether
    }

    pub fn wind(&self) -> &Wind {
        &self.wind
    }

    pub fn ground(&self) -> &GroundPlane {
        &self.ground
    }

    pub fn station(&self) -> &GroundStation {
        &self.station
    }

    pub fn handles(&self) -> Handles {
        self.station.handles()
    }

    /// Per-panel forces of the last step.
    pub fn panel_forces(&self) -> &[ForceSample] {
        &self.panel_forces
    }

    pub fn loads(&self) -> &LoadBudget {
        &self.loads
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Simulated seconds since construction or the last reset.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    pub fn queue(&mut self, command: SimCommand) {
        self.commands.push_back(command);
    }

    /// Advance by one integration step of `dt` seconds.
    pub fn step(&mut self, dt: f64, handles: &Handles) {
        self.drain_commands();
        if !dt.is_finite() || dt <= 0.0 {
            debug!(dt, "ignoring step with invalid dt");
            return;
        }

        self.panel_forces =
            compute_body_panel_forces(&self.geometry, &self.body, &self.wind.velocity(), &self.config.aero);
        self.loads = LoadBudget {
            aero: total_loads(&self.panel_forces),
            gravity: self.gravity_loads(),
            tether: self.tether.compute_forces(&self.body, handles, &self.geometry),
        };

        self.body
            .integrate_velocities(&self.loads.total(), dt, &self.config.limits);
        if !self.body.integrate_position(dt) {
            error!(time = self.time, "non-finite position, resetting to the launch pose");
            self.recover();
        }
        self.body.integrate_orientation(dt);
        self.ground.apply_constraints(&mut self.body, &self.geometry);

        self.time += dt;
        self.telemetry = self.capture();
    }

    /// Advance by a wall-clock frame, split into equal substeps no longer
    /// than `max_substep`. Frames longer than `max_frame_dt` are shortened.
    /// Returns the number of substeps taken.
    pub fn advance(&mut self, frame_dt: f64, handles: &Handles) -> usize {
        let limits = self.config.limits;
        if !frame_dt.is_finite() || frame_dt <= 0.0 {
            self.drain_commands();
            return 0;
        }
        let frame = frame_dt.min(limits.max_frame_dt);
        let substeps = ((frame / limits.max_substep) - SUBSTEP_ROUNDING).ceil().max(1.0) as usize;
        let dt = frame / substeps as f64;
        for _ in 0..substeps {
            self.step(dt, handles);
        }
        substeps
    }

    /// Launch position and orientation for the current configuration.
    pub fn launch_pose(&self) -> (Vec3, UnitQuaternion<f64>) {
        launch_pose(&self.config, &self.geometry, &self.tether, &self.wind, &self.station)
    }

    /// Back to the launch pose, at rest, with the clock at zero.
    pub fn reset(&mut self) {
        let (position, orientation) = self.launch_pose();
        let position = self
            .config
            .body
            .initial_position
            .map_or(position, |[x, y, z]| Vec3::new(x, y, z));
        self.place(position, orientation);
        info!(?position, "simulation reset");
    }

    /// At rest at `position`, facing the pilot, with the clock at zero.
    pub fn reset_to(&mut self, position: Vec3) {
        let (_, orientation) = self.launch_pose();
        self.place(position, orientation);
        info!(?position, "simulation reset");
    }

    fn place(&mut self, position: Vec3, orientation: UnitQuaternion<f64>) {
        self.body.reset(position, orientation);
        self.tether.reset_tension();
        self.panel_forces.clear();
        self.loads = LoadBudget::default();
        self.time = 0.0;
        self.telemetry = self.capture();
    }

    /// Safe pose after a blow-up. Keeps the clock running.
    fn recover(&mut self) {
        let (position, orientation) = self.launch_pose();
        self.body.reset(position, orientation);
        self.tether.reset_tension();
    }

    fn drain_commands(&mut self) {
        while let Some(command) = self.commands.pop_front() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: SimCommand) {
        debug!(?command, "applying command");
        match command {
            SimCommand::SetLineDelta(delta) => self.tether.set_delta(delta),
            SimCommand::AdjustLineDelta(change) => self.tether.adjust_delta(change),
            SimCommand::SetBaseLength(length) => {
                self.tether.set_base_length(length);
                self.config.tether = *self.tether.params();
            }
            SimCommand::UpdateTether(update) => {
                self.tether.apply(&update);
                self.config.tether = *self.tether.params();
            }
            SimCommand::SetWindSpeedKmh(speed) => {
                self.wind.set_speed_kmh(speed);
                self.config.wind = *self.wind.params();
            }
            SimCommand::SetWindDirection(direction) => {
                self.wind.set_direction(direction);
                self.config.wind = *self.wind.params();
            }
            SimCommand::UpdateGeometry(update) => {
                self.config.geometry.apply(&update);
                self.geometry = Arc::new(KiteGeometry::build(&self.config.geometry));
                self.body.center_of_mass = self.geometry.center_of_mass();
                debug!(area = self.geometry.total_area(), panels = self.geometry.panels().len(), "geometry rebuilt");
            }
            SimCommand::Reset => self.reset(),
        }
    }

    /// Weight, shared evenly between the panel centroids. The mass centre is
    /// their mean, so the weight alone makes no torque.
    fn gravity_loads(&self) -> Loads {
        let weight = self.body.mass * self.config.body.gravity;
        let panels = self.geometry.panels();
        let mut loads = Loads::zero();
        if panels.is_empty() {
            loads.force.y = -weight;
            return loads;
        }
        let share = Vec3::new(0.0, -weight / panels.len() as f64, 0.0);
        for panel in panels {
            let lever = self.body.lever_arm(&panel.centroid());
            loads.add_at(&lever, &share);
        }
        loads
    }

    fn capture(&self) -> Telemetry {
        let (pitch, yaw, roll) = self.body.orientation.euler_angles();
        let apparent = apparent_wind(&self.wind.velocity(), &self.body.velocity);
        Telemetry {
            time: self.time,
            position: self.body.position,
            velocity: self.body.velocity,
            speed: self.body.velocity.norm(),
            roll_deg: roll.to_degrees(),
            pitch_deg: pitch.to_degrees(),
            yaw_deg: yaw.to_degrees(),
            apparent_wind_speed: apparent.norm(),
            aero_force: self.loads.aero.force.norm(),
            gravity_force: self.loads.gravity.force.norm(),
            tether_force: self.loads.tether.force.norm(),
            total_force: self.loads.total().force.norm(),
            left: self.tether.reading(LineSide::Left),
            right: self.tether.reading(LineSide::Right),
            delta: self.tether.delta(),
        }
    }
}

impl Telemetry {
    fn empty() -> Self {
        let line = LineReading {
            tension: 0.0,
            target_length: 0.0,
            distance: 0.0,
            taut: false,
        };
        Self {
            time: 0.0,
            position: Vec3::zeros(),
            velocity: Vec3::zeros(),
            speed: 0.0,
            roll_deg: 0.0,
            pitch_deg: 0.0,
            yaw_deg: 0.0,
            apparent_wind_speed: 0.0,
            aero_force: 0.0,
            gravity_force: 0.0,
            tether_force: 0.0,
            total_force: 0.0,
            left: line,
            right: line,
            delta: 0.0,
        }
    }
}

/// Kite downwind of the handles at the launch elevation, facing the pilot,
/// with the bridle midpoint just past the line rest length.
fn launch_pose(
    config: &SimConfig,
    geometry: &KiteGeometry,
    tether: &TetherSystem,
    wind: &Wind,
    station: &GroundStation,
) -> (Vec3, UnitQuaternion<f64>) {
    let downwind = Vec3::new(wind.direction().x, 0.0, wind.direction().z)
        .try_normalize(1e-9)
        .unwrap_or_else(|| station.facing());
    let facing = -downwind;
    let orientation = UnitQuaternion::from_axis_angle(&Vec3::y_axis(), facing.x.atan2(facing.z));

    let ctrl_mid =
        orientation * (geometry.point(PointId::LeftCtrl) + geometry.point(PointId::RightCtrl)) / 2.0;
    let params = tether.params();
    let reach = params.base_length * params.rest_ratio + config.body.launch_pretension;
    let elevation = config.body.launch_elevation_deg.to_radians();
    let out = downwind * elevation.cos() + Vec3::y() * elevation.sin();
    (station.handles().midpoint() + out * reach - ctrl_mid, orientation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn default_launch_pose() {
        let sim = KiteSim::default();
        let body = sim.body();
        assert_relative_eq!(body.position, Vec3::new(0.0, 6.9595, -14.0066), epsilon = 1e-3);
        assert_eq!(body.center_of_mass, sim.geometry().center_of_mass());
        assert_relative_eq!(body.orientation, UnitQuaternion::identity(), epsilon = 1e-12);
        assert_eq!(body.velocity, Vec3::zeros());
        assert_eq!(sim.time(), 0.0);
    }

    #[test]
    fn lines_start_just_taut() {
        let mut sim = KiteSim::default();
        let handles = sim.handles();
        sim.step(1.0 / 240.0, &handles);
        for side in LineSide::BOTH {
            let reading = sim.tether().reading(side);
            assert!(reading.taut);
            assert!(reading.tension > sim.tether().params().tension_min);
            assert_abs_diff_eq!(reading.distance, 14.9, epsilon = 0.01);
        }
    }

    #[test]
    fn launch_pose_follows_the_wind() {
        let mut config = SimConfig::default();
        config.wind.direction = [1.0, 0.0, 0.0];
        let sim = KiteSim::new(config);
        let body = sim.body();
        assert!(body.position.x > 10.0);
        // The bridle side of the kite looks back at the pilot.
        let front = body.orientation * Vec3::z();
        assert_relative_eq!(front, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn substeps_split_the_frame() {
        let mut sim = KiteSim::default();
        let handles = sim.handles();
        assert_eq!(sim.advance(1.0 / 60.0, &handles), 4);
        assert_relative_eq!(sim.time(), 1.0 / 60.0, epsilon = 1e-12);
        // Long frames are shortened.
        assert_eq!(sim.advance(10.0, &handles), 12);
        assert_relative_eq!(sim.time(), 1.0 / 60.0 + 0.05, epsilon = 1e-12);
        assert_eq!(sim.advance(0.001, &handles), 1);
        assert_eq!(sim.advance(0.0, &handles), 0);
        assert_eq!(sim.advance(f64::NAN, &handles), 0);
    }

    #[test]
    fn commands_wait_for_the_next_step() {
        let mut sim = KiteSim::default();
        let handles = sim.handles();
        sim.queue(SimCommand::SetLineDelta(9.0));
        sim.queue(SimCommand::SetWindSpeedKmh(500.0));
        sim.queue(SimCommand::SetBaseLength(1.0));
        assert_eq!(sim.tether().delta(), 0.0);
        assert_eq!(sim.pending_commands(), 3);

        sim.step(1.0 / 240.0, &handles);
        assert_eq!(sim.pending_commands(), 0);
        assert_eq!(sim.tether().delta(), 0.5);
        assert_eq!(sim.wind().speed_kmh(), 60.0);
        assert_eq!(sim.tether().base_length(), 2.0);
        assert_eq!(sim.config().wind.speed_kmh, 60.0);

        sim.queue(SimCommand::AdjustLineDelta(-0.7));
        sim.step(1.0 / 240.0, &handles);
        assert_relative_eq!(sim.tether().delta(), -0.2, epsilon = 1e-12);
    }

    #[test]
    fn invalid_dt_still_applies_commands() {
        let mut sim = KiteSim::default();
        let handles = sim.handles();
        let before = sim.body().clone();
        sim.queue(SimCommand::SetLineDelta(0.1));
        sim.step(f64::NAN, &handles);
        sim.step(-1.0, &handles);
        assert_eq!(sim.tether().delta(), 0.1);
        assert_eq!(sim.body(), &before);
        assert_eq!(sim.time(), 0.0);
    }

    #[test]
    fn geometry_update_swaps_the_shared_geometry() {
        let mut sim = KiteSim::default();
        let handles = sim.handles();
        let old = Arc::clone(sim.geometry());
        sim.queue(SimCommand::UpdateGeometry(GeometryUpdate {
            wingspan: Some(2.0),
            ..Default::default()
        }));
        sim.step(1.0 / 240.0, &handles);
        assert_eq!(old.params().wingspan, 1.65);
        assert_eq!(sim.geometry().params().wingspan, 2.0);
        assert!(sim.geometry().total_area() > old.total_area());

        sim.queue(SimCommand::UpdateGeometry(GeometryUpdate {
            height: Some(1.0),
            subdivisions: Some(2),
            ..Default::default()
        }));
        sim.step(1.0 / 240.0, &handles);
        assert_eq!(sim.geometry().panels().len(), 64);
        assert_eq!(sim.panel_forces().len(), 64);
        assert_eq!(sim.body().center_of_mass, sim.geometry().center_of_mass());
    }

    #[test]
    fn gravity_is_spread_over_panels() {
        let mut sim = KiteSim::default();
        let handles = sim.handles();
        sim.step(1.0 / 240.0, &handles);
        let gravity = sim.loads().gravity;
        let weight = 0.15 * 9.81;
        assert_relative_eq!(gravity.force, Vec3::new(0.0, -weight, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(gravity.torque, Vec3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(sim.telemetry().gravity_force, weight, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_position_recovers_to_launch_pose() {
        let mut sim = KiteSim::default();
        let handles = sim.handles();
        sim.advance(0.5, &handles);
        let time = sim.time();
        sim.body.position.x = f64::NAN;
        sim.step(1.0 / 240.0, &handles);

        let (launch, _) = sim.launch_pose();
        assert!(sim.body().position.iter().all(|c| c.is_finite()));
        assert_relative_eq!(sim.body().position, launch, epsilon = 1e-12);
        assert_eq!(sim.body().velocity, Vec3::zeros());
        assert_eq!(sim.body().angular_velocity, Vec3::zeros());
        assert!(sim.time() > time);

        // The run goes on afterwards.
        sim.advance(0.5, &handles);
        assert!(sim.body().position.iter().all(|c| c.is_finite()));
        for side in LineSide::BOTH {
            assert!(sim.tether().smoothed_tension(side).is_finite());
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let mut sim = KiteSim::default();
        let handles = sim.handles();
        sim.queue(SimCommand::SetLineDelta(0.3));
        sim.advance(0.5, &handles);
        let target = Vec3::new(1.0, 5.0, -3.0);
        sim.reset_to(target);
        let first = sim.body().clone();
        sim.reset_to(target);
        assert_eq!(sim.body(), &first);
        assert_eq!(first.position, target);
        assert_eq!(first.velocity, Vec3::zeros());
        assert_eq!(first.angular_velocity, Vec3::zeros());
        assert_relative_eq!(first.orientation, UnitQuaternion::identity(), epsilon = 1e-12);
        assert_eq!(sim.time(), 0.0);
        assert!(sim.panel_forces().is_empty());
        assert_eq!(
            sim.tether().smoothed_tension(LineSide::Left),
            sim.tether().params().tension_min
        );

        sim.queue(SimCommand::Reset);
        sim.step(1.0 / 240.0, &handles);
        let (launch, _) = sim.launch_pose();
        assert!((sim.body().position - launch).norm() < 0.01);
    }

    #[test]
    fn telemetry_tracks_the_step() {
        let mut sim = KiteSim::default();
        let handles = sim.handles();
        sim.advance(0.25, &handles);
        let t = sim.telemetry();
        assert_relative_eq!(t.time, sim.time());
        assert_eq!(t.position, sim.body().position);
        assert_relative_eq!(t.speed, sim.body().velocity.norm());
        assert_eq!(t.left, sim.tether().reading(LineSide::Left));
        assert!(t.aero_force > 0.0);
        assert!(t.tether_force > 0.0);
        assert_eq!(sim.panel_forces().len(), sim.geometry().panels().len());
    }
}
