//! The basic UI.
//!
//! Draws the kite frame, its sail, the lines and optionally the panel forces
//! with gizmos, and overlays some information about the flight.

use bevy::{
    color::palettes::css::{DEEP_SKY_BLUE, GOLD, LIGHT_GRAY, ORANGE_RED, WHITE, YELLOW_GREEN},
    prelude::*,
};

use kite_physics::{KiteSim, LineSide};

use crate::kite::{ControlMode, KiteMarker, Paused};

/// Newtons per meter of drawn force arrow.
const FORCE_SCALE: f32 = 0.1;

#[derive(Component)]
pub struct InfoText;

#[derive(Component)]
pub struct MainCameraMarker;

#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct ShowForces(pub bool);

#[derive(Default)]
pub struct UIPlugin;

impl Plugin for UIPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ShowForces>();
        app.add_systems(Startup, setup_ui);
        app.add_systems(
            Update,
            (toggle_forces, draw_kite, draw_lines, draw_forces, follow_kite, update_ui),
        );
    }
}

fn setup_ui(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    sim: Res<KiteSim>,
) {
    // Informative text.
    commands.spawn((
        Text::new(""),
        TextFont {
            font_size: 18.0,
            ..default()
        },
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(5.0),
            left: Val::Px(5.0),
            ..default()
        },
        Name::new("Info Text"),
        InfoText,
    ));

    let ground = meshes.add(Plane3d::default().mesh().size(400.0, 400.0));
    commands.spawn((
        Mesh3d(ground),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb_from_array([0.3, 0.5, 0.2]),
            perceptual_roughness: 0.95,
            reflectance: 0.02,
            ..default()
        })),
        Transform::from_xyz(0.0, sim.ground().height() as f32, 0.0),
        Name::new("Ground"),
    ));

    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 300.0,
        ..default()
    });

    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            illuminance: 10_000.0,
            ..default()
        },
        Transform::default().looking_to(Vec3::new(0.3, -1.0, -0.5).normalize(), Vec3::Y),
        Name::new("Sun"),
    ));

    // Over the pilot's shoulder, looking downwind.
    let handles = sim.handles();
    let eye = to_bevy(&handles.midpoint()) - to_bevy(&sim.station().facing()) * 4.0 + Vec3::Y;
    commands.spawn((
        Camera3d::default(),
        Camera {
            order: 0,
            ..default()
        },
        Name::new("Main 3D Camera"),
        Transform::from_translation(eye).looking_at(to_bevy(&sim.body().position), Vec3::Y),
        Projection::Perspective(PerspectiveProjection {
            fov: std::f32::consts::FRAC_PI_3,
            near: 0.1,
            far: 2_000.0,
            ..default()
        }),
        MainCameraMarker,
    ));
}

fn toggle_forces(kb: Res<ButtonInput<KeyCode>>, mut show: ResMut<ShowForces>) {
    if kb.just_pressed(KeyCode::KeyF) {
        show.0 = !show.0;
    }
}

/// Frame rods, bridles and sail outline.
fn draw_kite(sim: Res<KiteSim>, mut gizmos: Gizmos) {
    let geometry = sim.geometry();
    let body = sim.body();
    let world = |local: &na::Vector3<f64>| to_bevy(&body.world_point(local));

    for &(a, b) in geometry.connections() {
        gizmos.line(world(&geometry.point(a)), world(&geometry.point(b)), LIGHT_GRAY);
    }
    for panel in geometry.panels() {
        let [a, b, c] = panel.vertices.map(|v| world(&v));
        gizmos.linestrip([a, b, c, a], ORANGE_RED);
    }
}

fn draw_lines(sim: Res<KiteSim>, mut gizmos: Gizmos) {
    let geometry = sim.geometry();
    let body = sim.body();
    let handles = sim.handles();
    for (side, handle) in [(LineSide::Left, handles.left), (LineSide::Right, handles.right)] {
        let attach = body.world_point(&geometry.point(side.control_point()));
        let color = if sim.tether().reading(side).taut {
            WHITE
        } else {
            GOLD
        };
        gizmos.line(to_bevy(&handle), to_bevy(&attach), color);
    }
}

/// One arrow per panel from its centroid.
fn draw_forces(sim: Res<KiteSim>, show: Res<ShowForces>, mut gizmos: Gizmos) {
    if !show.0 {
        return;
    }
    let origin = sim.body().world_center_of_mass();
    for sample in sim.panel_forces() {
        let start = to_bevy(&(origin + sample.lever_arm));
        gizmos.arrow(start, start + to_bevy(&sample.lift) * FORCE_SCALE, YELLOW_GREEN);
        gizmos.arrow(start, start + to_bevy(&sample.drag) * FORCE_SCALE, DEEP_SKY_BLUE);
    }
}

/// Keep the kite in view from the pilot's position.
fn follow_kite(
    kite: Query<&Transform, (With<KiteMarker>, Without<MainCameraMarker>)>,
    mut camera: Query<&mut Transform, With<MainCameraMarker>>,
) {
    let (Ok(kite), Ok(mut camera)) = (kite.single(), camera.single_mut()) else {
        return;
    };
    camera.look_at(kite.translation, Vec3::Y);
}

fn update_ui(
    mut text: Query<&mut Text, With<InfoText>>,
    sim: Res<KiteSim>,
    mode: Res<ControlMode>,
    paused: Res<Paused>,
) {
    let Ok(mut text) = text.single_mut() else {
        return;
    };
    **text = overlay_text(&sim, *mode, paused.0);
}

/// Status block shown in the corner of the window.
pub fn overlay_text(sim: &KiteSim, mode: ControlMode, paused: bool) -> String {
    let t = sim.telemetry();
    format!(
        "Time: {:.2} s{}\n\
         Mode: {mode:?}\n\
         Position: {:.2}, {:.2}, {:.2} m\n\
         Speed: {:.2} m/s  apparent wind: {:.2} m/s\n\
         Roll {:.0}  pitch {:.0}  yaw {:.0}\n\
         Lines: L {:.1} N / {:.2} m  R {:.1} N / {:.2} m  delta {:+.3} m\n\
         Forces: aero {:.1} N  tether {:.1} N  total {:.1} N\n\
         Wind: {:.0} km/h\n\
         [←/→ A/D] steer  [↑/↓] wind  [Tab] autopilot  [F] forces  [P] pause  [R] reset",
        t.time,
        if paused { "  [paused]" } else { "" },
        t.position.x,
        t.position.y,
        t.position.z,
        t.speed,
        t.apparent_wind_speed,
        t.roll_deg,
        t.pitch_deg,
        t.yaw_deg,
        t.left.tension,
        t.left.target_length,
        t.right.tension,
        t.right.target_length,
        t.delta,
        t.aero_force,
        t.tether_force,
        t.total_force,
        sim.wind().speed_kmh(),
    )
}

/// Convert a nalgebra vector (f64) to a bevy one (f32). Both frames are Y-up.
pub fn to_bevy(v: &na::Vector3<f64>) -> Vec3 {
    Vec3::new(v.x as f32, v.y as f32, v.z as f32)
}

pub fn to_bevy_quat(q: &na::UnitQuaternion<f64>) -> Quat {
    Quat::from_array([q.i as f32, q.j as f32, q.k as f32, q.w as f32])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotations_agree_with_nalgebra() {
        let q = na::UnitQuaternion::from_euler_angles(0.3, -1.1, 2.0);
        let v = na::Vector3::new(1.0, -2.0, 0.5);
        let expected = to_bevy(&(q * v));
        let got = to_bevy_quat(&q) * to_bevy(&v);
        assert!((expected - got).length() < 1e-5);
    }

    #[test]
    fn overlay_lists_the_flight_state() {
        let sim = KiteSim::default();
        let text = overlay_text(&sim, ControlMode::Manual, true);
        assert!(text.starts_with("Time: 0.00 s  [paused]\n"));
        assert!(text.contains("Mode: Manual\n"));
        assert!(text.contains("Wind: 18 km/h\n"));
        assert_eq!(text.lines().count(), 9);
        assert!(!overlay_text(&sim, ControlMode::Autopilot, false).contains("[paused]"));
    }
}
