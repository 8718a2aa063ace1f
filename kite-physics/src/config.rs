//! Simulator configuration.
//!
//! Every component gets its own parameter struct. All of them deserialize with
//! defaults for missing fields, so a partial JSON file is a valid
//! configuration. Values coming from the outside world go through `clamped()`
//! or `apply()` before they reach the physics: out-of-range input is pulled
//! back into its valid range, never rejected.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// km/h -> m/s
pub const KMH_TO_MS: f64 = 1.0 / 3.6;

pub const WIND_SPEED_MAX_KMH: f64 = 60.0;
pub const BRIDLE_MIN: f64 = 0.2;
pub const BRIDLE_MAX: f64 = 2.0;
/// Deepest panel subdivision. Each level multiplies the panel count by four.
pub const SUBDIVISIONS_MAX: u32 = 4;

/// Clamp one configuration field, falling back to `fallback` on NaN/inf.
pub(crate) fn clamp_field(name: &str, value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if !value.is_finite() {
        debug!(field = name, value, fallback, "non-finite configuration value replaced");
        return fallback;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        debug!(field = name, value, clamped, "configuration value clamped");
    }
    clamped
}

/// Unit vector from a user supplied direction, or `fallback` if it has no usable length.
pub(crate) fn unit_or(direction: [f64; 3], fallback: [f64; 3]) -> [f64; 3] {
    let [x, y, z] = direction;
    let norm = (x * x + y * y + z * z).sqrt();
    if norm.is_finite() && norm > 1e-9 {
        [x / norm, y / norm, z / norm]
    } else {
        debug!(?direction, "degenerate direction replaced");
        fallback
    }
}

/// Lengths of the three bridle segments on each side, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridleLengths {
    pub nose: f64,
    pub intermediate: f64,
    pub center: f64,
}

impl Default for BridleLengths {
    fn default() -> Self {
        Self {
            nose: 0.76,
            intermediate: 0.63,
            center: 0.84,
        }
    }
}

impl BridleLengths {
    pub fn clamped(self) -> Self {
        let d = Self::default();
        Self {
            nose: clamp_field("bridle.nose", self.nose, BRIDLE_MIN, BRIDLE_MAX, d.nose),
            intermediate: clamp_field(
                "bridle.intermediate",
                self.intermediate,
                BRIDLE_MIN,
                BRIDLE_MAX,
                d.intermediate,
            ),
            center: clamp_field("bridle.center", self.center, BRIDLE_MIN, BRIDLE_MAX, d.center),
        }
    }
}

/// Shape of the kite frame, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryParams {
    pub wingspan: f64,
    pub height: f64,
    /// How far the whiskers sit behind the sail plane.
    pub depth: f64,
    /// Rod diameter. Only used for drawing.
    pub structure_diameter: f64,
    pub bridle: BridleLengths,
    /// How many times each sail triangle is split in four for the aerodynamics.
    pub subdivisions: u32,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            wingspan: 1.65,
            height: 0.65,
            depth: 0.02,
            structure_diameter: 0.01,
            bridle: BridleLengths::default(),
            subdivisions: 1,
        }
    }
}

impl GeometryParams {
    pub fn clamped(self) -> Self {
        let d = Self::default();
        Self {
            wingspan: clamp_field("wingspan", self.wingspan, 0.5, 5.0, d.wingspan),
            height: clamp_field("height", self.height, 0.2, 2.0, d.height),
            depth: clamp_field("depth", self.depth, 0.0, 1.0, d.depth),
            structure_diameter: clamp_field(
                "structure_diameter",
                self.structure_diameter,
                0.001,
                0.1,
                d.structure_diameter,
            ),
            bridle: self.bridle.clamped(),
            subdivisions: if self.subdivisions > SUBDIVISIONS_MAX {
                debug!(value = self.subdivisions, "subdivisions clamped");
                SUBDIVISIONS_MAX
            } else {
                self.subdivisions
            },
        }
    }

    /// Merge a partial update, clamping every field it touches.
    pub fn apply(&mut self, update: &GeometryUpdate) {
        if let Some(v) = update.wingspan {
            self.wingspan = v;
        }
        if let Some(v) = update.height {
            self.height = v;
        }
        if let Some(v) = update.depth {
            self.depth = v;
        }
        if let Some(v) = update.bridle_nose {
            self.bridle.nose = v;
        }
        if let Some(v) = update.bridle_intermediate {
            self.bridle.intermediate = v;
        }
        if let Some(v) = update.bridle_center {
            self.bridle.center = v;
        }
        if let Some(v) = update.subdivisions {
            self.subdivisions = v;
        }
        *self = self.clamped();
    }
}

/// A partial change to [`GeometryParams`]. `None` leaves the field alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryUpdate {
    pub wingspan: Option<f64>,
    pub height: Option<f64>,
    pub depth: Option<f64>,
    pub bridle_nose: Option<f64>,
    pub bridle_intermediate: Option<f64>,
    pub bridle_center: Option<f64>,
    pub subdivisions: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindParams {
    pub speed_kmh: f64,
    /// Direction the wind blows towards, world frame.
    pub direction: [f64; 3],
}

impl Default for WindParams {
    fn default() -> Self {
        Self {
            speed_kmh: 18.0,
            direction: [0.0, 0.0, -1.0],
        }
    }
}

impl WindParams {
    pub fn clamped(self) -> Self {
        let d = Self::default();
        Self {
            speed_kmh: clamp_field("wind.speed_kmh", self.speed_kmh, 0.0, WIND_SPEED_MAX_KMH, 0.0),
            direction: unit_or(self.direction, d.direction),
        }
    }
}

/// Empirical lift/drag coefficient curve of a sail panel.
///
/// Below the stall angle lift rises as a quarter sine from `cl_zero` to
/// `cl_max`; past it, lift falls off as a quarter cosine to `cl_ninety` at
/// 90°. Drag rises as `sin(α)^cd_exponent` from `cd_zero` to `cd_max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiftDragCurve {
    pub cl_zero: f64,
    pub cl_max: f64,
    pub stall_deg: f64,
    pub cl_ninety: f64,
    pub cd_zero: f64,
    pub cd_max: f64,
    pub cd_exponent: f64,
}

impl Default for LiftDragCurve {
    fn default() -> Self {
        Self {
            cl_zero: 0.1,
            cl_max: 0.93,
            stall_deg: 20.0,
            cl_ninety: 0.0,
            cd_zero: 0.05,
            cd_max: 1.55,
            cd_exponent: 0.5,
        }
    }
}

impl LiftDragCurve {
    pub fn clamped(self) -> Self {
        let d = Self::default();
        let cl_max = clamp_field("curve.cl_max", self.cl_max, 0.0, 3.0, d.cl_max);
        let cd_max = clamp_field("curve.cd_max", self.cd_max, 0.0, 3.0, d.cd_max);
        Self {
            cl_zero: clamp_field("curve.cl_zero", self.cl_zero, 0.0, cl_max, d.cl_zero.min(cl_max)),
            cl_max,
            stall_deg: clamp_field("curve.stall_deg", self.stall_deg, 5.0, 60.0, d.stall_deg),
            cl_ninety: clamp_field("curve.cl_ninety", self.cl_ninety, 0.0, cl_max, 0.0),
            cd_zero: clamp_field("curve.cd_zero", self.cd_zero, 0.0, cd_max, d.cd_zero.min(cd_max)),
            cd_max,
            cd_exponent: clamp_field("curve.cd_exponent", self.cd_exponent, 0.1, 4.0, d.cd_exponent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AeroParams {
    /// kg/m³
    pub air_density: f64,
    pub curve: LiftDragCurve,
    /// Per-panel force ceiling in newtons. `None` disables it.
    pub max_panel_force: Option<f64>,
}

impl Default for AeroParams {
    fn default() -> Self {
        Self {
            air_density: 1.225,
            curve: LiftDragCurve::default(),
            max_panel_force: Some(200.0),
        }
    }
}

impl AeroParams {
    pub fn clamped(self) -> Self {
        Self {
            air_density: clamp_field("aero.air_density", self.air_density, 0.0, 5.0, 1.225),
            curve: self.curve.clamped(),
            max_panel_force: self
                .max_panel_force
                .map(|f| clamp_field("aero.max_panel_force", f, 1.0, 1.0e4, 200.0)),
        }
    }
}

/// Control line model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherParams {
    /// Nominal length shared by both lines, meters.
    pub base_length: f64,
    pub min_length: f64,
    pub max_length: f64,
    /// Bound on the differential length, meters.
    pub delta_max: f64,
    /// Rest length as a fraction of the target length.
    pub rest_ratio: f64,
    /// N/m
    pub stiffness: f64,
    /// N·s/m
    pub damping: f64,
    pub tension_min: f64,
    pub tension_max: f64,
    /// Weight of the newest sample in the tension low-pass filter.
    pub smoothing: f64,
    /// Below this handle-to-attachment distance a line is ignored for the frame.
    pub min_distance: f64,
}

impl Default for TetherParams {
    fn default() -> Self {
        Self {
            base_length: 15.0,
            min_length: 2.0,
            max_length: 100.0,
            delta_max: 0.5,
            rest_ratio: 0.99,
            stiffness: 100.0,
            damping: 5.4,
            tension_min: 0.1,
            tension_max: 100.0,
            smoothing: 0.45,
            min_distance: 1e-3,
        }
    }
}

impl TetherParams {
    pub fn clamped(self) -> Self {
        let d = Self::default();
        let min_length = clamp_field("tether.min_length", self.min_length, 0.5, 1000.0, d.min_length);
        let max_length =
            clamp_field("tether.max_length", self.max_length, min_length, 1000.0, d.max_length.max(min_length));
        let tension_min = clamp_field("tether.tension_min", self.tension_min, 0.0, 1.0e3, d.tension_min);
        Self {
            base_length: clamp_field(
                "tether.base_length",
                self.base_length,
                min_length,
                max_length,
                d.base_length.clamp(min_length, max_length),
            ),
            min_length,
            max_length,
            delta_max: clamp_field("tether.delta_max", self.delta_max, 0.0, 5.0, d.delta_max),
            rest_ratio: clamp_field("tether.rest_ratio", self.rest_ratio, 0.5, 1.0, d.rest_ratio),
            stiffness: clamp_field("tether.stiffness", self.stiffness, 0.0, 1.0e5, d.stiffness),
            damping: clamp_field("tether.damping", self.damping, 0.0, 1.0e3, d.damping),
            tension_min,
            tension_max: clamp_field(
                "tether.tension_max",
                self.tension_max,
                tension_min,
                1.0e5,
                d.tension_max.max(tension_min),
            ),
            smoothing: clamp_field("tether.smoothing", self.smoothing, 0.01, 1.0, d.smoothing),
            min_distance: clamp_field("tether.min_distance", self.min_distance, 1e-9, 1.0, d.min_distance),
        }
    }

    pub fn apply(&mut self, update: &TetherUpdate) {
        if let Some(v) = update.base_length {
            self.base_length = v;
        }
        if let Some(v) = update.stiffness {
            self.stiffness = v;
        }
        if let Some(v) = update.damping {
            self.damping = v;
        }
        if let Some(v) = update.smoothing {
            self.smoothing = v;
        }
        *self = self.clamped();
    }
}

/// A partial change to [`TetherParams`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherUpdate {
    pub base_length: Option<f64>,
    pub stiffness: Option<f64>,
    pub damping: Option<f64>,
    pub smoothing: Option<f64>,
}

/// Mass properties and launch pose of the kite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyParams {
    /// kg
    pub mass: f64,
    /// m/s²
    pub gravity: f64,
    /// Principal moments about the centre of mass: pitch, yaw, roll axes.
    pub inertia: [f64; 3],
    /// Explicit start position. `None` computes the launch pose from the lines.
    pub initial_position: Option<[f64; 3]>,
    pub launch_elevation_deg: f64,
    /// How far beyond the rest length the bridle sits at launch.
    pub launch_pretension: f64,
}

impl Default for BodyParams {
    fn default() -> Self {
        Self {
            mass: 0.15,
            gravity: 9.81,
            inertia: [0.01, 0.01, 0.02],
            initial_position: None,
            launch_elevation_deg: 25.0,
            launch_pretension: 0.05,
        }
    }
}

impl BodyParams {
    pub fn clamped(self) -> Self {
        let d = Self::default();
        let [ix, iy, iz] = self.inertia;
        Self {
            mass: clamp_field("body.mass", self.mass, 0.01, 100.0, d.mass),
            gravity: clamp_field("body.gravity", self.gravity, 0.0, 100.0, d.gravity),
            inertia: [
                clamp_field("body.inertia.x", ix, 1e-5, 100.0, d.inertia[0]),
                clamp_field("body.inertia.y", iy, 1e-5, 100.0, d.inertia[1]),
                clamp_field("body.inertia.z", iz, 1e-5, 100.0, d.inertia[2]),
            ],
            initial_position: self
                .initial_position
                .filter(|p| p.iter().all(|c| c.is_finite())),
            launch_elevation_deg: clamp_field(
                "body.launch_elevation_deg",
                self.launch_elevation_deg,
                0.0,
                85.0,
                d.launch_elevation_deg,
            ),
            launch_pretension: clamp_field(
                "body.launch_pretension",
                self.launch_pretension,
                -1.0,
                1.0,
                d.launch_pretension,
            ),
        }
    }
}

/// Numerical safety limits of the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorLimits {
    /// m/s
    pub max_speed: f64,
    /// rad/s
    pub max_angular_speed: f64,
    /// Longest single integration step, seconds.
    pub max_substep: f64,
    /// Longest wall-clock frame accepted by `advance`, seconds.
    pub max_frame_dt: f64,
}

impl Default for IntegratorLimits {
    fn default() -> Self {
        Self {
            max_speed: 30.0,
            max_angular_speed: 15.0,
            max_substep: 1.0 / 240.0,
            max_frame_dt: 0.05,
        }
    }
}

impl IntegratorLimits {
    pub fn clamped(self) -> Self {
        let d = Self::default();
        let max_substep = clamp_field("limits.max_substep", self.max_substep, 1e-5, 0.1, d.max_substep);
        Self {
            max_speed: clamp_field("limits.max_speed", self.max_speed, 0.1, 1000.0, d.max_speed),
            max_angular_speed: clamp_field(
                "limits.max_angular_speed",
                self.max_angular_speed,
                0.1,
                1000.0,
                d.max_angular_speed,
            ),
            max_substep,
            max_frame_dt: clamp_field(
                "limits.max_frame_dt",
                self.max_frame_dt,
                max_substep,
                1.0,
                d.max_frame_dt.max(max_substep),
            ),
        }
    }
}

/// Ground contact response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundParams {
    pub height: f64,
    /// Fraction of downward speed kept, upwards, on contact.
    pub restitution: f64,
    /// Factor applied to horizontal velocity on contact.
    pub friction: f64,
    /// Factor applied to angular velocity on contact.
    pub angular_damping: f64,
}

impl Default for GroundParams {
    fn default() -> Self {
        Self {
            height: 0.0,
            restitution: 0.5,
            friction: 0.95,
            angular_damping: 0.9,
        }
    }
}

impl GroundParams {
    pub fn clamped(self) -> Self {
        let d = Self::default();
        Self {
            height: clamp_field("ground.height", self.height, -1.0e3, 1.0e3, d.height),
            restitution: clamp_field("ground.restitution", self.restitution, 0.0, 1.0, d.restitution),
            friction: clamp_field("ground.friction", self.friction, 0.0, 1.0, d.friction),
            angular_damping: clamp_field(
                "ground.angular_damping",
                self.angular_damping,
                0.0,
                1.0,
                d.angular_damping,
            ),
        }
    }
}

/// Pilot / winch station on the ground.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationParams {
    pub position: [f64; 3],
    /// Rotation about +Y. At zero the pilot faces -Z.
    pub heading_deg: f64,
    pub handle_spacing: f64,
    pub handle_height: f64,
}

impl Default for StationParams {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            heading_deg: 0.0,
            handle_spacing: 0.5,
            handle_height: 1.2,
        }
    }
}

impl StationParams {
    pub fn clamped(self) -> Self {
        let d = Self::default();
        Self {
            position: if self.position.iter().all(|c| c.is_finite()) {
                self.position
            } else {
                d.position
            },
            heading_deg: clamp_field("station.heading_deg", self.heading_deg, -360.0, 360.0, 0.0),
            handle_spacing: clamp_field(
                "station.handle_spacing",
                self.handle_spacing,
                0.0,
                5.0,
                d.handle_spacing,
            ),
            handle_height: clamp_field(
                "station.handle_height",
                self.handle_height,
                0.0,
                10.0,
                d.handle_height,
            ),
        }
    }
}

/// Everything needed to build a [`crate::KiteSim`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub geometry: GeometryParams,
    pub wind: WindParams,
    pub aero: AeroParams,
    pub tether: TetherParams,
    pub body: BodyParams,
    pub limits: IntegratorLimits,
    pub ground: GroundParams,
    pub station: StationParams,
}

impl SimConfig {
    pub fn clamped(self) -> Self {
        Self {
            geometry: self.geometry.clamped(),
            wind: self.wind.clamped(),
            aero: self.aero.clamped(),
            tether: self.tether.clamped(),
            body: self.body.clamped(),
            limits: self.limits.clamped(),
            ground: self.ground.clamped(),
            station: self.station.clamped(),
        }
    }
}
