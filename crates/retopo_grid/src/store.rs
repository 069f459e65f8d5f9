use std::collections::{BTreeMap, BTreeSet};

use bevy::math::Vec3;

use crate::error::Result;
use crate::resolve::{PinPolicy, VertexMap, calculate_final_verts};
use crate::{Cell, GridCoord, RetopoError};

/// Authoritative grid state: cells, the vertex merge relation, per-vertex
/// position overrides and pinned positions.
///
/// Every map is ordered so that iteration, and therefore every derived
/// result, is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridStore {
    cells: BTreeMap<GridCoord, Cell>,
    /// Original corner coordinate → surviving vertex. Entries always point at
    /// a root, so chains never exceed one hop.
    merges: BTreeMap<GridCoord, GridCoord>,
    /// Keyed by original corner coordinate.
    overrides: BTreeMap<GridCoord, Vec3>,
    /// Keyed by resolved vertex coordinate.
    pins: BTreeMap<GridCoord, Vec3>,
}

impl GridStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------------
    // Cells
    // ---------------------------------------------------------------------

    pub fn cells(&self) -> &BTreeMap<GridCoord, Cell> {
        &self.cells
    }

    pub fn cell(&self, coord: GridCoord) -> Option<&Cell> {
        self.cells.get(&coord)
    }

    /// Mutable access for transform updates. Does not change topology.
    pub fn cell_mut(&mut self, coord: GridCoord) -> Option<&mut Cell> {
        self.cells.get_mut(&coord)
    }

    pub fn contains_cell(&self, coord: GridCoord) -> bool {
        self.cells.contains_key(&coord)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn insert_cell(&mut self, coord: GridCoord, cell: Cell) -> Result<()> {
        if self.cells.contains_key(&coord) {
            return Err(RetopoError::CellOccupied(coord));
        }
        self.cells.insert(coord, cell);
        self.prune();
        Ok(())
    }

    /// Removes a cell and drops any bookkeeping that only it referenced.
    pub fn remove_cell(&mut self, coord: GridCoord) -> Option<Cell> {
        let removed = self.cells.remove(&coord);
        if removed.is_some() {
            self.prune();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.merges.clear();
        self.overrides.clear();
        self.pins.clear();
    }

    // ---------------------------------------------------------------------
    // Merge relation
    // ---------------------------------------------------------------------

    pub fn merges(&self) -> &BTreeMap<GridCoord, GridCoord> {
        &self.merges
    }

    /// Follows the merge relation to the surviving vertex.
    ///
    /// Gives up with [`RetopoError::BrokenMergeChain`] instead of looping if the
    /// relation was ever corrupted into a cycle.
    pub fn resolve(&self, coord: GridCoord) -> Result<GridCoord> {
        let mut current = coord;
        for _ in 0..=self.merges.len() {
            match self.merges.get(&current) {
                Some(&next) => current = next,
                None => return Ok(current),
            }
        }
        Err(RetopoError::BrokenMergeChain(coord))
    }

    /// Merges the vertex `from` resolves to into the vertex `to` resolves to.
    /// Existing entries pointing at the absorbed root are redirected.
    pub fn merge(&mut self, from: GridCoord, to: GridCoord) -> Result<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        if from == to {
            return Err(RetopoError::AlreadyMerged);
        }
        for target in self.merges.values_mut() {
            if *target == from {
                *target = to;
            }
        }
        self.merges.insert(from, to);
        Ok(())
    }

    /// Coordinates that resolve to the same vertex as `vertex`, including itself.
    pub fn merged_group(&self, vertex: GridCoord) -> Vec<GridCoord> {
        let Ok(root) = self.resolve(vertex) else {
            return vec![vertex];
        };
        let mut group: BTreeSet<GridCoord> = self
            .merges
            .iter()
            .filter(|(_, to)| **to == root)
            .map(|(from, _)| *from)
            .collect();
        group.insert(root);
        group.into_iter().collect()
    }

    // ---------------------------------------------------------------------
    // Overrides
    // ---------------------------------------------------------------------

    pub fn overrides(&self) -> &BTreeMap<GridCoord, Vec3> {
        &self.overrides
    }

    pub fn set_override(&mut self, coord: GridCoord, pos: Vec3) {
        self.overrides.insert(coord, pos);
    }

    pub fn remove_override(&mut self, coord: GridCoord) -> Option<Vec3> {
        self.overrides.remove(&coord)
    }

    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Overrides the position of a logical vertex. Any override stored under
    /// another coordinate of the same merged group is dropped so that exactly
    /// one position applies.
    pub fn set_vertex_override(&mut self, vertex: GridCoord, pos: Vec3) {
        let root = self.resolve(vertex).unwrap_or(vertex);
        self.clear_vertex_overrides(root);
        self.overrides.insert(root, pos);
    }

    /// Drops every override that applies to the logical vertex `vertex`.
    pub fn clear_vertex_overrides(&mut self, vertex: GridCoord) {
        let root = self.resolve(vertex).unwrap_or(vertex);
        let stale: Vec<GridCoord> = self
            .overrides
            .keys()
            .filter(|coord| **coord == root || self.resolve(**coord).ok() == Some(root))
            .copied()
            .collect();
        for coord in stale {
            self.overrides.remove(&coord);
        }
    }

    // ---------------------------------------------------------------------
    // Pins
    // ---------------------------------------------------------------------

    pub fn pins(&self) -> &BTreeMap<GridCoord, Vec3> {
        &self.pins
    }

    pub fn pin(&self, vertex: GridCoord) -> Option<Vec3> {
        self.pins.get(&vertex).copied()
    }

    pub fn is_pinned(&self, vertex: GridCoord) -> bool {
        self.pins.contains_key(&vertex)
    }

    pub fn set_pin(&mut self, vertex: GridCoord, pos: Vec3) {
        self.pins.insert(vertex, pos);
    }

    pub fn remove_pin(&mut self, vertex: GridCoord) -> Option<Vec3> {
        self.pins.remove(&vertex)
    }

    pub fn clear_pins(&mut self) {
        self.pins.clear();
    }

    // ---------------------------------------------------------------------
    // Derived positions
    // ---------------------------------------------------------------------

    /// Final vertex positions with pins applied.
    pub fn final_verts(&self) -> VertexMap {
        calculate_final_verts(self, PinPolicy::Apply)
    }

    /// Vertex positions as they would be without any pins.
    pub fn dynamic_verts(&self) -> VertexMap {
        calculate_final_verts(self, PinPolicy::Ignore)
    }

    // ---------------------------------------------------------------------
    // Pruning
    // ---------------------------------------------------------------------

    /// Every corner coordinate of every live cell.
    pub fn referenced_coords(&self) -> BTreeSet<GridCoord> {
        self.cells.keys().flat_map(|cell| cell.corners()).collect()
    }

    /// Drops merge entries, overrides and pins that no live cell can reach.
    pub fn prune(&mut self) {
        if self.cells.is_empty() {
            self.merges.clear();
            self.overrides.clear();
            self.pins.clear();
            return;
        }

        let referenced = self.referenced_coords();
        let resolved: BTreeSet<GridCoord> = referenced
            .iter()
            .filter_map(|coord| self.resolve(*coord).ok())
            .collect();

        self.pins.retain(|vertex, _| resolved.contains(vertex));
        self.overrides.retain(|coord, _| referenced.contains(coord));

        let stale: Vec<GridCoord> = self
            .merges
            .keys()
            .filter(|from| {
                !referenced.contains(from)
                    || self
                        .resolve(**from)
                        .map_or(true, |root| !resolved.contains(&root))
            })
            .copied()
            .collect();
        for from in stale {
            self.merges.remove(&from);
        }
    }
}

#[cfg(test)]
mod tests {
    use bevy::math::{Mat3, Vec2};

    use super::*;

    fn cell_at(x: f32) -> Cell {
        Cell::new(Vec3::new(x, 0.0, 0.0), Mat3::IDENTITY, Vec2::splat(1.0))
    }

    fn strip(n: i32) -> GridStore {
        let mut store = GridStore::new();
        for i in 0..n {
            store
                .insert_cell(GridCoord::new(i, 0), cell_at(i as f32))
                .unwrap();
        }
        store
    }

    #[test]
    fn insert_rejects_occupied() {
        let mut store = strip(1);
        assert_eq!(
            store.insert_cell(GridCoord::new(0, 0), cell_at(0.0)),
            Err(RetopoError::CellOccupied(GridCoord::new(0, 0)))
        );
    }

    #[test]
    fn merge_flattens_chains() {
        let mut store = strip(3);
        let (a, b, c) = (GridCoord::new(0, 0), GridCoord::new(1, 0), GridCoord::new(2, 0));
        store.merge(a, b).unwrap();
        store.merge(b, c).unwrap();
        assert_eq!(store.merges().get(&a), Some(&c));
        assert_eq!(store.resolve(a), Ok(c));
        assert_eq!(store.merge(a, c), Err(RetopoError::AlreadyMerged));
        assert_eq!(store.merged_group(c), vec![a, b, c]);
    }

    #[test]
    fn resolve_terminates_on_cycle() {
        let mut store = strip(2);
        let (a, b) = (GridCoord::new(0, 0), GridCoord::new(1, 0));
        store.merges.insert(a, b);
        store.merges.insert(b, a);
        assert_eq!(store.resolve(a), Err(RetopoError::BrokenMergeChain(a)));
    }

    #[test]
    fn vertex_override_replaces_group_entries() {
        let mut store = strip(2);
        let (a, b) = (GridCoord::new(0, 1), GridCoord::new(2, 1));
        store.merge(b, a).unwrap();
        store.set_override(b, Vec3::ONE);
        store.set_vertex_override(b, Vec3::X);
        assert_eq!(store.overrides().len(), 1);
        assert_eq!(store.overrides().get(&a), Some(&Vec3::X));
    }

    #[test]
    fn removing_cell_prunes_unreferenced_state() {
        let mut store = strip(2);
        let shared = GridCoord::new(1, 0);
        let unique = GridCoord::new(2, 0);
        store.set_override(shared, Vec3::ONE);
        store.set_override(unique, Vec3::ONE);
        store.set_pin(GridCoord::new(2, 1), Vec3::ONE);

        store.remove_cell(GridCoord::new(1, 0));

        assert!(store.overrides().contains_key(&shared));
        assert!(!store.overrides().contains_key(&unique));
        assert!(store.pins().is_empty());
    }

    #[test]
    fn removing_last_cell_clears_everything() {
        let mut store = strip(1);
        store.set_pin(GridCoord::new(0, 0), Vec3::ZERO);
        store.set_override(GridCoord::new(1, 1), Vec3::ZERO);
        store.remove_cell(GridCoord::new(0, 0));
        assert!(store.is_empty());
        assert!(store.pins().is_empty());
        assert!(store.overrides().is_empty());
        assert!(store.merges().is_empty());
    }

    #[test]
    fn prune_drops_merges_from_dead_corners() {
        let mut store = strip(1);
        store
            .insert_cell(GridCoord::new(5, 0), cell_at(5.0))
            .unwrap();
        store.merge(GridCoord::new(5, 0), GridCoord::new(1, 0)).unwrap();
        store.remove_cell(GridCoord::new(5, 0));
        assert!(store.merges().is_empty());
    }
}
