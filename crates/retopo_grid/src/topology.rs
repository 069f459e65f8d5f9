use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::resolve::{VertexMap, resolved_corners};
use crate::{EdgeKey, GridCoord, GridDir, GridStore};

/// Number of cells using each resolved edge. Cells with a corner missing
/// from `verts` are skipped.
pub fn edge_counts(store: &GridStore, verts: &VertexMap) -> BTreeMap<EdgeKey, usize> {
    let mut counts = BTreeMap::new();
    for cell in store.cells().keys() {
        let Some(corners) = resolved_corners(store, *cell) else {
            continue;
        };
        if !corners.iter().all(|c| verts.contains_key(c)) {
            continue;
        }
        for i in 0..4 {
            if let Some(edge) = EdgeKey::new(corners[i], corners[(i + 1) % 4]) {
                *counts.entry(edge).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Resolved vertices touching at least one edge used by exactly one cell.
pub fn boundary_vertices(counts: &BTreeMap<EdgeKey, usize>) -> BTreeSet<GridCoord> {
    counts
        .iter()
        .filter(|(_, count)| **count == 1)
        .flat_map(|(EdgeKey(a, b), _)| [*a, *b])
        .collect()
}

/// An open side of a cell: the resolved edge on that side belongs to no
/// other cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenSide {
    pub cell: GridCoord,
    pub dir: GridDir,
    pub start: GridCoord,
    pub end: GridCoord,
}

pub fn open_sides(store: &GridStore, counts: &BTreeMap<EdgeKey, usize>) -> Vec<OpenSide> {
    let mut sides = Vec::new();
    for cell in store.cells().keys() {
        for dir in GridDir::ALL {
            let (a, b) = dir.edge_of(*cell);
            let (Ok(start), Ok(end)) = (store.resolve(a), store.resolve(b)) else {
                continue;
            };
            let Some(edge) = EdgeKey::new(start, end) else {
                continue;
            };
            if counts.get(&edge) == Some(&1) {
                sides.push(OpenSide {
                    cell: *cell,
                    dir,
                    start,
                    end,
                });
            }
        }
    }
    sides
}

/// Cells sharing at least one resolved edge with each cell. Merged corners
/// make cells adjacent even when they are not lattice neighbours.
pub fn cell_neighbors(store: &GridStore) -> BTreeMap<GridCoord, BTreeSet<GridCoord>> {
    let mut by_edge: BTreeMap<EdgeKey, Vec<GridCoord>> = BTreeMap::new();
    for cell in store.cells().keys() {
        let Some(corners) = resolved_corners(store, *cell) else {
            continue;
        };
        for i in 0..4 {
            if let Some(edge) = EdgeKey::new(corners[i], corners[(i + 1) % 4]) {
                by_edge.entry(edge).or_default().push(*cell);
            }
        }
    }

    let mut neighbors: BTreeMap<GridCoord, BTreeSet<GridCoord>> = store
        .cells()
        .keys()
        .map(|cell| (*cell, BTreeSet::new()))
        .collect();
    for cells in by_edge.values() {
        for (i, a) in cells.iter().enumerate() {
            for b in &cells[i + 1..] {
                if a != b {
                    neighbors.entry(*a).or_default().insert(*b);
                    neighbors.entry(*b).or_default().insert(*a);
                }
            }
        }
    }
    neighbors
}

/// Breadth-first ring index of every cell reachable from `start` through
/// shared edges, up to `max_depth` rings.
pub fn falloff_rings(
    store: &GridStore,
    start: GridCoord,
    max_depth: usize,
) -> BTreeMap<GridCoord, usize> {
    let mut depths = BTreeMap::new();
    if !store.contains_cell(start) {
        return depths;
    }
    let neighbors = cell_neighbors(store);
    depths.insert(start, 0);
    let mut queue = VecDeque::from([(start, 0usize)]);
    while let Some((cell, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(adjacent) = neighbors.get(&cell) else {
            continue;
        };
        for next in adjacent {
            if !depths.contains_key(next) {
                depths.insert(*next, depth + 1);
                queue.push_back((*next, depth + 1));
            }
        }
    }
    depths
}
