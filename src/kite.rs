//! The flown kite: pilot input, autopilot and the fixed-rate physics step.
//!
//! All physics state lives in the [`KiteSim`] resource. Input systems only
//! queue [`SimCommand`]s; the fixed update is the single place that steps it.

use bevy::prelude::*;
use kite_physics::{KiteSim, RigidBodyState, SimCommand, Telemetry};
use serde::{Deserialize, Serialize};

/// Line delta change per second while a steering key is held, meters.
const STEER_RATE: f64 = 1.0;
/// Fraction of the delta removed per second once the keys are released.
const RECENTER_RATE: f64 = 4.0;
const WIND_STEP_KMH: f64 = 1.0;

#[derive(Component)]
pub struct KiteMarker;

#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    #[default]
    Manual,
    Autopilot,
}

#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Paused(pub bool);

/// Gains of the lateral autopilot. The kite is steered back towards the
/// vertical plane through the pilot that contains the wind.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotGains {
    /// Delta per meter of lateral offset.
    pub kp: f64,
    /// Delta per m/s of lateral speed.
    pub kd: f64,
}

impl Default for AutopilotGains {
    fn default() -> Self {
        Self { kp: 0.08, kd: 0.05 }
    }
}

/// Throttle for the telemetry log line.
#[derive(Resource, Debug)]
pub struct TelemetryLog {
    interval: f64,
    next: f64,
}

impl TelemetryLog {
    pub fn every(interval: Option<f64>) -> Self {
        Self {
            interval: interval.unwrap_or(0.5).max(0.01),
            next: 0.0,
        }
    }

    /// Whether a line is due at simulated time `now`.
    fn due(&mut self, now: f64) -> bool {
        if now + self.interval < self.next {
            // The clock went back: a reset.
            self.next = now;
        }
        if now < self.next {
            return false;
        }
        self.next = now + self.interval;
        true
    }
}

#[derive(Default)]
pub struct KitePlugin;

impl Plugin for KitePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ControlMode>();
        app.init_resource::<Paused>();
        app.add_systems(Startup, setup_kite);
        app.add_systems(Update, (keys_to_commands, autopilot).chain());
        app.add_systems(FixedUpdate, (step_physics, sync_kite, log_telemetry).chain());
    }
}

fn setup_kite(sim: Res<KiteSim>, mut commands: Commands) {
    commands.spawn((
        Name::new("Kite"),
        Transform::from_translation(crate::ui::to_bevy(&sim.body().position))
            .with_rotation(crate::ui::to_bevy_quat(&sim.body().orientation)),
        sim.body().clone(),
        KiteMarker,
    ));
}

fn keys_to_commands(
    kb: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
    mut mode: ResMut<ControlMode>,
    mut paused: ResMut<Paused>,
    mut sim: ResMut<KiteSim>,
) {
    if kb.just_pressed(KeyCode::Tab) {
        *mode = match *mode {
            ControlMode::Manual => ControlMode::Autopilot,
            ControlMode::Autopilot => ControlMode::Manual,
        };
        info!("control mode: {:?}", *mode);
    }
    if kb.just_pressed(KeyCode::KeyP) {
        paused.0 = !paused.0;
    }
    if kb.just_pressed(KeyCode::KeyR) {
        sim.queue(SimCommand::Reset);
    }

    let wind = sim.wind().speed_kmh();
    if kb.just_pressed(KeyCode::ArrowUp) {
        sim.queue(SimCommand::SetWindSpeedKmh(wind + WIND_STEP_KMH));
    }
    if kb.just_pressed(KeyCode::ArrowDown) {
        sim.queue(SimCommand::SetWindSpeedKmh(wind - WIND_STEP_KMH));
    }

    if *mode != ControlMode::Manual {
        return;
    }
    let dt = time.delta_secs_f64();
    let mut steer = 0.0;
    // A shorter left line turns left.
    if kb.pressed(KeyCode::ArrowLeft) || kb.pressed(KeyCode::KeyA) {
        steer += 1.0;
    }
    if kb.pressed(KeyCode::ArrowRight) || kb.pressed(KeyCode::KeyD) {
        steer -= 1.0;
    }
    if steer != 0.0 {
        sim.queue(SimCommand::AdjustLineDelta(steer * STEER_RATE * dt));
    } else {
        let delta = sim.tether().delta();
        if delta != 0.0 {
            sim.queue(SimCommand::SetLineDelta(recenter(delta, dt)));
        }
    }
}

/// Ease the line delta back to zero.
pub fn recenter(delta: f64, dt: f64) -> f64 {
    let next = delta * (1.0 - RECENTER_RATE * dt).max(0.0);
    if next.abs() < 1e-4 { 0.0 } else { next }
}

fn autopilot(mode: Res<ControlMode>, gains: Res<AutopilotGains>, mut sim: ResMut<KiteSim>) {
    if *mode != ControlMode::Autopilot {
        return;
    }
    let station = sim.station();
    // Lateral axis: the pilot's right hand.
    let right = station.facing().cross(&na::Vector3::y());
    let offset = (sim.body().position - sim.handles().midpoint()).dot(&right);
    let rate = sim.body().velocity.dot(&right);
    let delta_max = sim.tether().params().delta_max;
    let delta = autopilot_delta(&gains, offset, rate, delta_max);
    sim.queue(SimCommand::SetLineDelta(delta));
}

/// PD steering on the lateral offset. A kite to the right is pulled back
/// left by shortening the left line, which is a positive delta.
pub fn autopilot_delta(gains: &AutopilotGains, offset: f64, rate: f64, delta_max: f64) -> f64 {
    (gains.kp * offset + gains.kd * rate).clamp(-delta_max, delta_max)
}

fn step_physics(time: Res<Time>, paused: Res<Paused>, mut sim: ResMut<KiteSim>) {
    if paused.0 {
        return;
    }
    let handles = sim.handles();
    sim.advance(time.delta_secs_f64(), &handles);
}

/// Copy the physics state onto the kite entity for rendering.
fn sync_kite(
    sim: Res<KiteSim>,
    mut query: Query<(&mut Transform, &mut RigidBodyState), With<KiteMarker>>,
) {
    for (mut transform, mut state) in query.iter_mut() {
        *state = sim.body().clone();
        transform.translation = crate::ui::to_bevy(&state.position);
        transform.rotation = crate::ui::to_bevy_quat(&state.orientation);
    }
}

fn log_telemetry(sim: Res<KiteSim>, paused: Res<Paused>, mut log: ResMut<TelemetryLog>) {
    if paused.0 || !log.due(sim.time()) {
        return;
    }
    let t: &Telemetry = sim.telemetry();
    info!(
        "t={:.2}s pos=({:.2}, {:.2}, {:.2}) speed={:.2} m/s roll={:.0} pitch={:.0} yaw={:.0} \
         aero={:.1}N tether={:.1}N lines L={:.1}N R={:.1}N delta={:.3}",
        t.time,
        t.position.x,
        t.position.y,
        t.position.z,
        t.speed,
        t.roll_deg,
        t.pitch_deg,
        t.yaw_deg,
        t.aero_force,
        t.tether_force,
        t.left.tension,
        t.right.tension,
        t.delta,
    );
}
