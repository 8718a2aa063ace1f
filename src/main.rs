//! Two-line stunt kite simulator.
//!
//! The physics lives in `kite-physics`; this binary wires it into bevy. The
//! core is Y-up, same as bevy, so positions carry over without a basis change.

// Recommended alias.
extern crate nalgebra as na;

use std::path::{Path, PathBuf};

use anyhow::Context;
use bevy::prelude::*;
use kite_physics::{KiteSim, SimConfig};
use serde::{Deserialize, Serialize};

mod kite;
mod ui;

use kite::{AutopilotGains, KitePlugin};
use ui::UIPlugin;

const DEFAULT_CONFIG: &str = "kitesim.json";

/// Contents of the configuration file: the simulation itself plus a few
/// application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub sim: SimConfig,
    pub autopilot: AutopilotGains,
    /// Seconds of simulated time between telemetry log lines.
    pub telemetry_interval: Option<f64>,
}

/// Where the configuration came from, reported once the logger is up.
#[derive(Resource, Debug)]
struct ConfigSource {
    path: PathBuf,
    found: bool,
}

/// Read the configuration at `path`. A missing file is not an error and
/// yields `None`.
fn load_config(path: &Path) -> anyhow::Result<Option<AppConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading configuration {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("parsing configuration {}", path.display()))?;
    Ok(Some(config))
}

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let loaded = load_config(&path)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "kitesim".into(),
                ..default()
            }),
            ..default()
        }))
        .insert_resource(Time::<Fixed>::from_hz(60.0))
        .insert_resource(KiteSim::new(config.sim))
        .insert_resource(config.autopilot)
        .insert_resource(kite::TelemetryLog::every(config.telemetry_interval))
        .insert_resource(ConfigSource { path, found })
        .add_plugins((KitePlugin, UIPlugin))
        .add_systems(Startup, report_config)
        .run();
    Ok(())
}

fn report_config(source: Res<ConfigSource>) {
    if source.found {
        info!("configuration loaded from {}", source.path.display());
    } else {
        warn!(
            "no configuration at {}, using defaults",
            source.path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back() {
        let loaded = load_config(Path::new("definitely/not/here.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn partial_file_is_merged_with_defaults() {
        let path = std::env::temp_dir().join("kitesim-partial-config.json");
        std::fs::write(
            &path,
            r#"{ "wind": { "speed_kmh": 30.0 }, "autopilot": { "kp": 0.2 } }"#,
        )
        .unwrap();
        let config = load_config(&path).unwrap().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.sim.wind.speed_kmh, 30.0);
        assert_eq!(config.sim.tether, SimConfig::default().tether);
        assert_eq!(config.autopilot.kp, 0.2);
        assert_eq!(config.autopilot.kd, AutopilotGains::default().kd);
        assert_eq!(config.telemetry_interval, None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join("kitesim-bad-config.json");
        std::fs::write(&path, "{ wind: ").unwrap();
        let err = load_config(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(format!("{err:#}").contains("parsing configuration"));
    }
}
