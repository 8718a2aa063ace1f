//! Physics core of a two-line stunt kite simulator.
//!
//! A rigid kite frame is pushed around by per-panel aerodynamics, gravity and
//! two elastic control lines, and integrated with explicit Euler steps.
//! Everything runs on the caller's thread; [`KiteSim`] is the entry point.

extern crate nalgebra as na;

pub mod aero;
pub mod body;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod ground;
pub mod lines;
pub mod station;
pub mod wind;

pub type Vec3 = na::Vector3<f64>;

pub use body::{Loads, RigidBodyState};
pub use config::SimConfig;
pub use engine::{KiteSim, LoadBudget, SimCommand, Telemetry};
pub use geometry::{KiteGeometry, PointId};
pub use lines::{LineReading, LineSide};
pub use station::Handles;
