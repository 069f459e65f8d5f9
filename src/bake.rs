use bevy::{
    asset::RenderAssetUsages,
    mesh::{Indices, PrimitiveTopology},
    prelude::*,
};
use retopo_commands::{CommandGroup, RetopoCommand, run_command};
use retopo_grid::{
    BakedMesh, EditMode, RetopoError, SurfaceQuery, WELD_DISTANCE, bake_grid,
    select_faces_under_grid, snap_to_surface, weld_meshes,
};

use crate::{
    RetopoMesh, RetopoSystems,
    session::ActiveSession,
    settings::RetopoSettings,
    status::RetopoStatus,
    surface::{MeshSurface, mesh_triangles},
};

pub struct BakePlugin;

impl Plugin for BakePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FaceSelection>()
            .add_message::<BakeOp>()
            .add_systems(
                Update,
                (handle_bake_keys, apply_bake_ops)
                    .chain()
                    .in_set(RetopoSystems::Operators),
            );
    }
}

#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BakeOp {
    /// Turn the grid into a mesh, or select the target faces under it.
    Bake,
    /// Re-snap the vertices of baked meshes onto the target.
    SnapToSurface,
    /// Join all baked meshes of the target and weld their seams.
    Stitch,
}

/// Target faces picked by baking in [`EditMode::SelectFaces`].
#[derive(Resource, Default)]
pub struct FaceSelection {
    pub target: Option<Entity>,
    pub faces: Vec<usize>,
    /// World-space centers of the selected faces.
    pub centers: Vec<Vec3>,
}

fn handle_bake_keys(keyboard: Res<ButtonInput<KeyCode>>, mut ops: MessageWriter<BakeOp>) {
    if keyboard.just_pressed(KeyCode::Enter) || keyboard.just_pressed(KeyCode::NumpadEnter) {
        ops.write(BakeOp::Bake);
    }
    if keyboard.just_pressed(KeyCode::F5) {
        ops.write(BakeOp::SnapToSurface);
    }
    if keyboard.just_pressed(KeyCode::F6) {
        ops.write(BakeOp::Stitch);
    }
}

// ---------------------------------------------------------------------------
// Mesh conversion
// ---------------------------------------------------------------------------

/// Bevy mesh of `baked` with positions relative to `origin`.
pub fn baked_to_mesh(baked: &BakedMesh, origin: Vec3) -> Mesh {
    let positions: Vec<[f32; 3]> = baked
        .vertices
        .iter()
        .map(|v| (*v - origin).to_array())
        .collect();
    let indices: Vec<u32> = baked.triangles().into_iter().flatten().collect();
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_indices(Indices::U32(indices));
    mesh.compute_normals();
    mesh
}

/// World-space triangles of a mesh as baked data. Triangles indexing past the
/// position list are dropped.
pub fn mesh_to_baked(mesh: &Mesh, transform: &GlobalTransform) -> Option<BakedMesh> {
    let (positions, mut triangles) = mesh_triangles(mesh)?;
    let count = positions.len() as u32;
    triangles.retain(|tri| tri.iter().all(|i| *i < count));
    let world = transform.to_matrix();
    Some(BakedMesh {
        vertices: positions
            .into_iter()
            .map(|p| world.transform_point3(p))
            .collect(),
        faces: triangles.iter().map(|t| t.to_vec()).collect(),
    })
}

/// Copy of `mesh` with its vertices projected onto `surface`.
///
/// Returns the new mesh and the number of vertices that found the surface.
pub fn snapped_mesh<S: SurfaceQuery + ?Sized>(
    mesh: &Mesh,
    transform: &GlobalTransform,
    surface: &S,
) -> Option<(Mesh, usize)> {
    let (positions, _) = mesh_triangles(mesh)?;
    let world = transform.to_matrix();
    if world.determinant().abs() <= f32::EPSILON {
        return None;
    }
    let inverse = world.inverse();
    let mut points: Vec<Vec3> = positions
        .iter()
        .map(|p| world.transform_point3(*p))
        .collect();
    let snapped = snap_to_surface(surface, &mut points);
    let local: Vec<[f32; 3]> = points
        .iter()
        .map(|p| inverse.transform_point3(*p).to_array())
        .collect();
    let mut result = mesh.clone();
    result.insert_attribute(Mesh::ATTRIBUTE_POSITION, local);
    result.compute_normals();
    Some((result, snapped))
}

// ---------------------------------------------------------------------------
// SetRetopoMesh command
// ---------------------------------------------------------------------------

/// Swaps the mesh shown by a [`RetopoMesh`] entity. `None` hides it.
pub struct SetRetopoMesh {
    pub entity: Entity,
    pub before: Option<Handle<Mesh>>,
    pub after: Option<Handle<Mesh>>,
    pub label: String,
}

impl SetRetopoMesh {
    fn apply(&self, world: &mut World, mesh: &Option<Handle<Mesh>>) {
        let Ok(mut entity) = world.get_entity_mut(self.entity) else {
            return;
        };
        match mesh {
            Some(handle) => {
                entity.insert(Mesh3d(handle.clone()));
            }
            None => {
                entity.remove::<Mesh3d>();
            }
        }
    }
}

impl RetopoCommand for SetRetopoMesh {
    fn execute(&self, world: &mut World) {
        self.apply(world, &self.after);
    }

    fn undo(&self, world: &mut World) {
        self.apply(world, &self.before);
    }

    fn description(&self) -> &str {
        &self.label
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

fn apply_bake_ops(
    mut ops: MessageReader<BakeOp>,
    mut commands: Commands,
    mut active: ResMut<ActiveSession>,
    mut status: ResMut<RetopoStatus>,
    mut selection: ResMut<FaceSelection>,
    settings: Res<RetopoSettings>,
    surface: Res<MeshSurface>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut material: Local<Option<Handle<StandardMaterial>>>,
    baked: Query<(Entity, &Mesh3d, &GlobalTransform, &RetopoMesh)>,
) {
    for op in ops.read() {
        let material = material
            .get_or_insert_with(|| {
                materials.add(StandardMaterial {
                    base_color: Color::srgb(0.35, 0.6, 0.9),
                    perceptual_roughness: 0.8,
                    ..default()
                })
            })
            .clone();
        match op {
            BakeOp::Bake => bake(
                &mut commands,
                &mut active,
                &mut status,
                &mut selection,
                &settings,
                &surface,
                &mut meshes,
                material,
            ),
            BakeOp::SnapToSurface => snap_baked(&mut commands, &mut status, &surface, &mut meshes, &baked),
            BakeOp::Stitch => stitch_baked(&mut commands, &mut status, &surface, &mut meshes, material, &baked),
        }
    }
}

fn bake(
    commands: &mut Commands,
    active: &mut ActiveSession,
    status: &mut RetopoStatus,
    selection: &mut FaceSelection,
    settings: &RetopoSettings,
    surface: &MeshSurface,
    meshes: &mut Assets<Mesh>,
    material: Handle<StandardMaterial>,
) {
    let (Some(session), Some(target)) = (active.session.as_mut(), active.target) else {
        status.error(&RetopoError::NoSession);
        return;
    };

    match settings.grid.edit_mode {
        EditMode::Create => {
            let baked = match bake_grid(session.store()) {
                Ok(baked) => baked,
                Err(err) => {
                    status.error(&err);
                    return;
                }
            };
            let center = baked.bounds_center();
            let handle = meshes.add(baked_to_mesh(&baked, center));
            let entity = commands
                .spawn((
                    Name::new("Retopo Mesh"),
                    RetopoMesh { target },
                    MeshMaterial3d(material),
                    Transform::from_translation(center),
                ))
                .id();
            let command = SetRetopoMesh {
                entity,
                before: None,
                after: Some(handle),
                label: "Bake retopology grid".to_string(),
            };
            commands.queue(move |world: &mut World| run_command(world, Box::new(command)));

            session.teardown();
            active.end(status);
            status.info(format!(
                "Baked {} faces and {} vertices.",
                baked.faces.len(),
                baked.vertices.len()
            ));
        }
        EditMode::SelectFaces => {
            let Some(target_surface) = surface.get() else {
                status.error(&RetopoError::SurfaceMiss);
                return;
            };
            let samples = target_surface.face_samples();
            let faces = select_faces_under_grid(session.store(), &samples);
            if faces.is_empty() {
                status.warn("No faces lie under the grid.");
                return;
            }
            *selection = FaceSelection {
                target: Some(target),
                centers: faces.iter().map(|i| samples[*i].0).collect(),
                faces,
            };
            session.teardown();
            active.end(status);
            status.info(format!("Selected {} faces.", selection.faces.len()));
        }
    }
}

fn snap_baked(
    commands: &mut Commands,
    status: &mut RetopoStatus,
    surface: &MeshSurface,
    meshes: &mut Assets<Mesh>,
    baked: &Query<(Entity, &Mesh3d, &GlobalTransform, &RetopoMesh)>,
) {
    let Some(target_surface) = surface.get() else {
        status.error(&RetopoError::SurfaceMiss);
        return;
    };
    let mut steps: Vec<Box<dyn RetopoCommand>> = Vec::new();
    let mut total = 0;
    for (entity, mesh3d, transform, retopo) in baked {
        if Some(retopo.target) != surface.target() {
            continue;
        }
        let Some(mesh) = meshes.get(&mesh3d.0) else {
            continue;
        };
        let Some((snapped, count)) = snapped_mesh(mesh, transform, target_surface) else {
            warn!("Could not snap {entity}: unreadable mesh or singular transform");
            continue;
        };
        total += count;
        steps.push(Box::new(SetRetopoMesh {
            entity,
            before: Some(mesh3d.0.clone()),
            after: Some(meshes.add(snapped)),
            label: format!("Snap {entity} to surface"),
        }));
    }
    if steps.is_empty() {
        status.warn("No baked retopology mesh to snap.");
        return;
    }
    let group = CommandGroup {
        commands: steps,
        label: "Snap retopology meshes to surface".to_string(),
    };
    commands.queue(move |world: &mut World| run_command(world, Box::new(group)));
    status.info(format!("Snapped {total} vertices to the surface."));
}

fn stitch_baked(
    commands: &mut Commands,
    status: &mut RetopoStatus,
    surface: &MeshSurface,
    meshes: &mut Assets<Mesh>,
    material: Handle<StandardMaterial>,
    baked: &Query<(Entity, &Mesh3d, &GlobalTransform, &RetopoMesh)>,
) {
    let Some(target) = surface.target() else {
        status.warn("Add a RetopoTarget mesh to start retopology.");
        return;
    };
    let parts: Vec<(Entity, Handle<Mesh>, BakedMesh)> = baked
        .iter()
        .filter(|(.., retopo)| retopo.target == target)
        .filter_map(|(entity, mesh3d, transform, _)| {
            let mesh = meshes.get(&mesh3d.0)?;
            Some((entity, mesh3d.0.clone(), mesh_to_baked(mesh, transform)?))
        })
        .collect();
    if parts.len() < 2 {
        status.warn("Stitching needs at least two baked meshes.");
        return;
    }

    let pieces: Vec<BakedMesh> = parts.iter().map(|(.., mesh)| mesh.clone()).collect();
    let joined = weld_meshes(&pieces, WELD_DISTANCE);
    let center = joined.bounds_center();
    let handle = meshes.add(baked_to_mesh(&joined, center));
    let entity = commands
        .spawn((
            Name::new("Retopo Mesh"),
            RetopoMesh { target },
            MeshMaterial3d(material),
            Transform::from_translation(center),
        ))
        .id();

    let mut steps: Vec<Box<dyn RetopoCommand>> = vec![Box::new(SetRetopoMesh {
        entity,
        before: None,
        after: Some(handle),
        label: "Add stitched mesh".to_string(),
    })];
    for (part, mesh, _) in &parts {
        steps.push(Box::new(SetRetopoMesh {
            entity: *part,
            before: Some(mesh.clone()),
            after: None,
            label: format!("Hide stitched part {part}"),
        }));
    }
    let group = CommandGroup {
        commands: steps,
        label: "Stitch retopology meshes".to_string(),
    };
    commands.queue(move |world: &mut World| run_command(world, Box::new(group)));
    status.info(format!(
        "Stitched {} meshes into one with {} vertices.",
        parts.len(),
        joined.vertices.len()
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use retopo_commands::CommandHistory;
    use retopo_grid::TriangleSurface;

    fn quad() -> BakedMesh {
        BakedMesh {
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            faces: vec![vec![0, 1, 2, 3]],
        }
    }

    #[test]
    fn baked_mesh_is_centered_on_origin() {
        let baked = quad();
        let mesh = baked_to_mesh(&baked, baked.bounds_center());
        let (positions, triangles) = mesh_triangles(&mesh).unwrap();
        assert_eq!(triangles.len(), 2);
        assert_eq!(positions[0], Vec3::new(-0.5, -0.5, 0.0));
        assert!(mesh.attribute(Mesh::ATTRIBUTE_NORMAL).is_some());

        let back = mesh_to_baked(
            &mesh,
            &GlobalTransform::from_translation(Vec3::new(0.5, 0.5, 0.0)),
        )
        .unwrap();
        assert_eq!(back.vertices, baked.vertices);
    }

    #[test]
    fn stitching_survives_bad_indices() {
        let mut broken = baked_to_mesh(&quad(), Vec3::ZERO);
        broken.insert_indices(Indices::U32(vec![0, 1, 2, 0, 2, 9]));
        let baked = mesh_to_baked(&broken, &GlobalTransform::IDENTITY).unwrap();
        assert_eq!(baked.faces, vec![vec![0, 1, 2]]);

        let other = mesh_to_baked(
            &baked_to_mesh(&quad(), Vec3::ZERO),
            &GlobalTransform::from_translation(Vec3::X),
        )
        .unwrap();
        let stitched = weld_meshes(&[baked, other], WELD_DISTANCE);
        assert_eq!(stitched.faces.len(), 3);
    }

    #[test]
    fn snapping_lands_on_the_surface() {
        let raised = BakedMesh {
            vertices: quad().vertices.iter().map(|v| *v + Vec3::Z * 0.3).collect(),
            faces: quad().faces,
        };
        let mesh = baked_to_mesh(&raised, Vec3::ZERO);
        let ground = TriangleSurface::new(
            vec![
                Vec3::new(-5.0, -5.0, 0.0),
                Vec3::new(5.0, -5.0, 0.0),
                Vec3::new(0.0, 5.0, 0.0),
            ],
            vec![[0, 1, 2]],
            Mat4::IDENTITY,
        );
        let transform = GlobalTransform::from_translation(Vec3::new(0.0, 0.0, 1.0));
        let (snapped, count) = snapped_mesh(&mesh, &transform, &ground).unwrap();
        assert_eq!(count, 4);
        let world = mesh_to_baked(&snapped, &transform).unwrap();
        assert!(world.vertices.iter().all(|v| v.z.abs() < 1e-5));
    }

    #[test]
    fn set_mesh_undoes_to_hidden() {
        let mut world = World::new();
        world.init_resource::<CommandHistory>();
        let entity = world.spawn_empty().id();
        let handle = Handle::<Mesh>::default();
        run_command(
            &mut world,
            Box::new(SetRetopoMesh {
                entity,
                before: None,
                after: Some(handle.clone()),
                label: "Bake".to_string(),
            }),
        );
        assert_eq!(world.get::<Mesh3d>(entity).map(|m| m.0.clone()), Some(handle));

        world.resource_scope(|world, mut history: Mut<CommandHistory>| history.undo(world));
        assert!(world.get::<Mesh3d>(entity).is_none());
        world.resource_scope(|world, mut history: Mut<CommandHistory>| history.redo(world));
        assert!(world.get::<Mesh3d>(entity).is_some());
    }
}
