//! Editing engine for a quad grid drawn over a reference surface.
//!
//! The grid lives in a [`GridStore`]: cells keyed by lattice coordinate, a
//! merge relation between lattice corners, position overrides and pins.
//! [`GridStore::final_verts`] turns that into one position per logical
//! vertex. A [`RetopoSession`] drives interactive editing from pointer
//! events, and [`grid_ops`] and [`bake`] work on the grid as a whole.
//!
//! Nothing here depends on the ECS. The surface and the camera are reached
//! through the [`SurfaceQuery`] and [`ScreenProjector`] traits.

pub mod bake;
pub mod cell;
pub mod config;
pub mod container;
pub mod coord;
pub mod edit;
pub mod error;
pub mod grid_ops;
pub mod handles;
pub mod hover;
pub mod mesh_surface;
pub mod overlay;
pub mod resolve;
pub mod session;
pub mod spatial;
pub mod store;
pub mod surface;
pub mod topology;

#[cfg(test)]
mod testing;

pub use bake::{BakedMesh, WELD_DISTANCE, bake_grid, select_faces_under_grid, weld_meshes};
pub use cell::{Cell, CellSize, LegacyCell};
pub use config::{EditMode, GridConfig};
pub use container::ContainerMesh;
pub use coord::{EdgeKey, GridCoord, GridDir};
pub use error::{Result, RetopoError};
pub use grid_ops::PinAll;
pub use handles::{Derived, Handle, HandleSet};
pub use hover::{Modifiers, ScreenProjector, Viewport};
pub use mesh_surface::TriangleSurface;
pub use overlay::{Glyph, GridOverlay};
pub use resolve::{PinPolicy, VertexMap};
pub use session::{
    InteractionState, PointerEvent, PointerKind, RetopoSession, SessionFlow, StatusLevel,
    StatusMessage,
};
pub use store::GridStore;
pub use surface::{PreserveAxis, RayHit, SurfaceHit, SurfaceQuery, snap_to_surface};
