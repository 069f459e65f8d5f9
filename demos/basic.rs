//! Retopologize a sphere.
//!
//! F2 starts drawing, Shift+F2 grows a grid from the disc's boundary.
//! Hold the right mouse button to orbit the camera, scroll to zoom.

use bevy::{
    input::mouse::{AccumulatedMouseMotion, AccumulatedMouseScroll},
    prelude::*,
};
use quick_retopo::{AlignReference, RetopoPlugin, RetopoTarget, session::ActiveSession};

fn main() {
    App::new()
        .add_plugins((DefaultPlugins, RetopoPlugin::default()))
        .add_systems(Startup, setup)
        .add_systems(Update, orbit_camera)
        .run();
}

#[derive(Component)]
struct Orbit {
    yaw: f32,
    pitch: f32,
    distance: f32,
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Name::new("Sphere"),
        RetopoTarget,
        Mesh3d(meshes.add(Sphere::new(1.0).mesh().uv(48, 24))),
        MeshMaterial3d(materials.add(Color::srgb(0.8, 0.8, 0.8))),
        Transform::default(),
    ));

    commands.spawn((
        Name::new("Reference Disc"),
        AlignReference,
        Mesh3d(meshes.add(Circle::new(0.6).mesh().resolution(12))),
        MeshMaterial3d(materials.add(Color::srgba(0.3, 0.5, 0.9, 0.4))),
        Transform::from_xyz(0.0, 0.0, 1.0),
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: 8000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(4.0, 6.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    let orbit = Orbit {
        yaw: 0.0,
        pitch: 0.3,
        distance: 4.0,
    };
    commands.spawn((Camera3d::default(), orbit_transform(&orbit), orbit));
}

fn orbit_transform(orbit: &Orbit) -> Transform {
    let rotation = Quat::from_euler(EulerRot::YXZ, orbit.yaw, -orbit.pitch, 0.0);
    Transform::from_translation(rotation * Vec3::Z * orbit.distance).looking_at(Vec3::ZERO, Vec3::Y)
}

fn orbit_camera(
    mouse: Res<ButtonInput<MouseButton>>,
    motion: Res<AccumulatedMouseMotion>,
    scroll: Res<AccumulatedMouseScroll>,
    active: Res<ActiveSession>,
    mut cameras: Query<(&mut Orbit, &mut Transform)>,
) {
    let Ok((mut orbit, mut transform)) = cameras.single_mut() else {
        return;
    };
    if mouse.pressed(MouseButton::Right) {
        orbit.yaw -= motion.delta.x * 0.005;
        orbit.pitch = (orbit.pitch + motion.delta.y * 0.005).clamp(-1.5, 1.5);
    }
    // The wheel also resizes segments while a session is using the pointer.
    if !active.captured {
        orbit.distance = (orbit.distance - scroll.delta.y * 0.2).clamp(1.5, 20.0);
    }
    *transform = orbit_transform(&orbit);
}
