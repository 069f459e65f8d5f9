use std::cell::RefCell;

use bevy::{
    mesh::{Indices, PrimitiveTopology, VertexAttributeValues},
    picking::mesh_picking::ray_cast::{MeshRayCast, MeshRayCastSettings, RayCastVisibility},
    prelude::*,
};
use retopo_grid::{ContainerMesh, RayHit, SurfaceHit, SurfaceQuery, TriangleSurface};

use crate::{AlignReference, RetopoTarget};

pub struct RetopoSurfacePlugin;

impl Plugin for RetopoSurfacePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MeshSurface>()
            .add_systems(PreUpdate, refresh_mesh_surface);
    }
}

/// Triangle-list geometry of a mesh asset in local space.
///
/// `None` for other topologies or meshes without float positions. Unindexed
/// meshes are read as consecutive triples.
pub fn mesh_triangles(mesh: &Mesh) -> Option<(Vec<Vec3>, Vec<[u32; 3]>)> {
    if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
        return None;
    }
    let Some(VertexAttributeValues::Float32x3(positions)) =
        mesh.attribute(Mesh::ATTRIBUTE_POSITION)
    else {
        return None;
    };
    let positions: Vec<Vec3> = positions.iter().map(|p| Vec3::from_array(*p)).collect();

    let flat: Vec<u32> = match mesh.indices() {
        Some(Indices::U16(indices)) => indices.iter().map(|i| u32::from(*i)).collect(),
        Some(Indices::U32(indices)) => indices.clone(),
        None => (0..positions.len() as u32).collect(),
    };
    let triangles = flat
        .chunks_exact(3)
        .map(|tri| [tri[0], tri[1], tri[2]])
        .collect();
    Some((positions, triangles))
}

/// Container geometry of a mesh in world space.
pub fn container_from_mesh(mesh: &Mesh, transform: &GlobalTransform) -> Option<ContainerMesh> {
    let (positions, triangles) = mesh_triangles(mesh)?;
    let world = transform.to_matrix();
    let vertices = positions
        .into_iter()
        .map(|p| world.transform_point3(p))
        .collect();
    Some(ContainerMesh::from_triangles(vertices, &triangles))
}

/// Gathers every [`AlignReference`] mesh as a container.
pub fn collect_containers(
    references: &Query<(&Mesh3d, &GlobalTransform), With<AlignReference>>,
    meshes: &Assets<Mesh>,
) -> Vec<ContainerMesh> {
    references
        .iter()
        .filter_map(|(mesh3d, transform)| {
            let mesh = meshes.get(&mesh3d.0)?;
            container_from_mesh(mesh, transform)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MeshSurface resource
// ---------------------------------------------------------------------------

/// The retopology target as a queryable surface.
///
/// Rebuilt whenever the target entity, its mesh asset or its transform changes.
#[derive(Resource, Default)]
pub struct MeshSurface {
    target: Option<Entity>,
    mesh: Option<AssetId<Mesh>>,
    world: Mat4,
    surface: Option<TriangleSurface>,
}

impl MeshSurface {
    pub fn new(target: Entity, surface: TriangleSurface) -> Self {
        Self {
            target: Some(target),
            mesh: None,
            world: surface.world_transform(),
            surface: Some(surface),
        }
    }

    pub fn target(&self) -> Option<Entity> {
        self.target
    }

    pub fn get(&self) -> Option<&TriangleSurface> {
        self.surface.as_ref()
    }

    fn matches(&self, target: Entity, mesh: AssetId<Mesh>, world: Mat4) -> bool {
        self.target == Some(target) && self.mesh == Some(mesh) && self.world == world
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The target surface as seen from a running system: closest points come from
/// the cached [`TriangleSurface`], ray casts from Bevy's mesh picking against
/// the target entity only.
pub struct PickedSurface<'a, 'w, 's> {
    surface: &'a TriangleSurface,
    target: Entity,
    ray_cast: RefCell<&'a mut MeshRayCast<'w, 's>>,
}

impl<'a, 'w, 's> PickedSurface<'a, 'w, 's> {
    pub fn new(
        surface: &'a TriangleSurface,
        target: Entity,
        ray_cast: &'a mut MeshRayCast<'w, 's>,
    ) -> Self {
        Self {
            surface,
            target,
            ray_cast: RefCell::new(ray_cast),
        }
    }
}

impl SurfaceQuery for PickedSurface<'_, '_, '_> {
    fn project(&self, point: Vec3) -> Option<SurfaceHit> {
        self.surface.project(point)
    }

    fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<RayHit> {
        if !self.surface.is_valid() {
            return None;
        }
        let ray = Ray3d::new(origin, Dir3::new(direction).ok()?);
        let target = self.target;
        let filter = move |entity: Entity| entity == target;
        let settings = MeshRayCastSettings::default()
            .with_visibility(RayCastVisibility::Any)
            .with_filter(&filter);
        let mut ray_cast = self.ray_cast.borrow_mut();
        let (_, hit) = ray_cast.cast_ray(ray, &settings).first()?;
        Some(RayHit {
            location: hit.point,
            normal: hit.normal.normalize_or(Vec3::Z),
            face: hit.triangle_index.unwrap_or_default(),
            distance: origin.distance(hit.point),
        })
    }

    fn is_valid(&self) -> bool {
        self.surface.is_valid()
    }
}

fn refresh_mesh_surface(
    mut surface: ResMut<MeshSurface>,
    targets: Query<(Entity, &Mesh3d, &GlobalTransform), With<RetopoTarget>>,
    meshes: Res<Assets<Mesh>>,
    mut asset_events: MessageReader<AssetEvent<Mesh>>,
) {
    let Some((entity, mesh3d, transform)) = targets.iter().next() else {
        if surface.target.is_some() {
            debug!("Retopology target removed");
            surface.clear();
        }
        return;
    };
    let mesh_id = mesh3d.0.id();
    let world = transform.to_matrix();
    let modified = asset_events
        .read()
        .any(|event| event.is_modified(mesh_id) || event.is_loaded_with_dependencies(mesh_id));
    if !modified && surface.surface.is_some() && surface.matches(entity, mesh_id, world) {
        return;
    }

    let Some(mesh) = meshes.get(mesh_id) else {
        return;
    };
    let Some((positions, triangles)) = mesh_triangles(mesh) else {
        warn!("Retopology target {entity} is not a triangle mesh");
        surface.clear();
        return;
    };
    let built = TriangleSurface::new(positions, triangles, world);
    debug!(
        "Surface for {entity} rebuilt with {} triangles",
        built.triangle_count()
    );
    *surface = MeshSurface {
        target: Some(entity),
        mesh: Some(mesh_id),
        world,
        surface: Some(built),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::{asset::RenderAssetUsages, camera::primitives::Aabb, ecs::system::RunSystemOnce};

    #[test]
    fn cuboid_reads_as_triangles() {
        let mesh = Mesh::from(Cuboid::default());
        let (positions, triangles) = mesh_triangles(&mesh).unwrap();
        assert_eq!(positions.len(), 24);
        assert_eq!(triangles.len(), 12);
    }

    #[test]
    fn unindexed_mesh_uses_consecutive_triples() {
        let mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            );
        let (_, triangles) = mesh_triangles(&mesh).unwrap();
        assert_eq!(triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn line_meshes_are_rejected() {
        let mesh = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default())
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            );
        assert!(mesh_triangles(&mesh).is_none());
    }

    #[test]
    fn moved_plane_projects_in_world_space() {
        let mesh = Plane3d::default().mesh().size(4.0, 4.0).build();
        let (positions, triangles) = mesh_triangles(&mesh).unwrap();
        let world = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let surface = TriangleSurface::new(positions, triangles, world);

        let hit = surface.project(Vec3::new(0.5, 3.0, -0.25)).unwrap();
        assert!(hit.location.abs_diff_eq(Vec3::new(0.5, 2.0, -0.25), 1e-5));
        assert!(hit.normal.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn container_is_in_world_space() {
        let mesh = Plane3d::default().mesh().size(2.0, 2.0).build();
        let transform = GlobalTransform::from_translation(Vec3::new(10.0, 0.0, 0.0));
        let container = container_from_mesh(&mesh, &transform).unwrap();
        assert_eq!(container.faces().len(), 2);
        assert!(container.vertices().iter().all(|v| (v.x - 10.0).abs() <= 1.0 + 1e-5));
        assert_eq!(container.boundary_edges().len(), 4);
    }

    #[test]
    fn picked_surface_ignores_other_meshes() {
        let mut app = App::new();
        app.add_plugins(bevy::app::TaskPoolPlugin::default());
        app.init_resource::<Assets<Mesh>>();
        let mesh = Plane3d::default().mesh().size(2.0, 2.0).build();
        let (positions, triangles) = mesh_triangles(&mesh).unwrap();
        let handle = app.world_mut().resource_mut::<Assets<Mesh>>().add(mesh);

        let mut spawn_plane = |height: f32| {
            app.world_mut()
                .spawn((
                    Mesh3d(handle.clone()),
                    Aabb::from_min_max(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 0.0, 1.0)),
                    Transform::from_xyz(0.0, height, 0.0),
                    GlobalTransform::from_translation(Vec3::new(0.0, height, 0.0)),
                    InheritedVisibility::VISIBLE,
                    ViewVisibility::default(),
                ))
                .id()
        };
        let target = spawn_plane(0.0);
        spawn_plane(1.0);

        let cached = TriangleSurface::new(positions, triangles, Mat4::IDENTITY);
        let hit = app
            .world_mut()
            .run_system_once(move |mut ray_cast: MeshRayCast| {
                let picked = PickedSurface::new(&cached, target, &mut ray_cast);
                picked.raycast(Vec3::new(0.25, 5.0, 0.25), Vec3::NEG_Y)
            })
            .unwrap()
            .unwrap();
        assert!(hit.location.abs_diff_eq(Vec3::new(0.25, 0.0, 0.25), 1e-4));
        assert!((hit.distance - 5.0).abs() < 1e-4);
    }
}
