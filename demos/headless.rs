//! Fly the kite without a window and print telemetry as JSON lines.
//!
//! The pilot holds the lines straight for two seconds, pulls left for two
//! seconds, then right. Pass a number of seconds to fly for as the first
//! argument (default 8).

use kite_physics::{KiteSim, SimCommand, SimConfig};

const FRAME: f64 = 1.0 / 60.0;
const PRINT_EVERY: usize = 6;

fn main() -> anyhow::Result<()> {
    let seconds: f64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 8.0,
    };

    let mut sim = KiteSim::new(SimConfig::default());
    let handles = sim.handles();
    let frames = (seconds / FRAME).round() as usize;

    for frame in 0..frames {
        let t = frame as f64 * FRAME;
        let delta = if t < 2.0 {
            0.0
        } else if t < 4.0 {
            0.3
        } else {
            -0.3
        };
        sim.queue(SimCommand::SetLineDelta(delta));
        sim.advance(FRAME, &handles);

        if frame % PRINT_EVERY == 0 {
            println!("{}", serde_json::to_string(sim.telemetry())?);
        }
    }
    Ok(())
}
