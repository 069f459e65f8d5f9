use bevy::math::Vec3;

/// A point returned by a [`PointIndex`] query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Index into the slice the index was built from.
    pub index: usize,
    pub position: Vec3,
    pub distance: f32,
}

struct KdNode {
    point: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Static 3D kd-tree over a point set.
pub struct PointIndex {
    points: Vec<Vec3>,
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

impl PointIndex {
    pub fn build(points: Vec<Vec3>) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::with_capacity(points.len());
        let root = build_node(&points, &mut order, 0, &mut nodes);
        Self {
            points,
            nodes,
            root,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn nearest(&self, query: Vec3) -> Option<Neighbor> {
        self.nearest_n(query, 1).into_iter().next()
    }

    /// Up to `k` closest points, nearest first.
    pub fn nearest_n(&self, query: Vec3, k: usize) -> Vec<Neighbor> {
        let mut best = Vec::with_capacity(k + 1);
        if k > 0 {
            self.search_nearest(self.root, query, k, &mut best);
        }
        best
    }

    /// Every point within `radius` of `query`, nearest first.
    pub fn within_radius(&self, query: Vec3, radius: f32) -> Vec<Neighbor> {
        let mut found = Vec::new();
        self.search_radius(self.root, query, radius, &mut found);
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)));
        found
    }

    fn search_nearest(&self, node: Option<usize>, query: Vec3, k: usize, best: &mut Vec<Neighbor>) {
        let Some(node) = node.map(|i| &self.nodes[i]) else {
            return;
        };
        let position = self.points[node.point];
        let distance = position.distance(query);
        if best.len() < k || best.last().is_some_and(|worst| distance < worst.distance) {
            let slot = best.partition_point(|n| n.distance <= distance);
            best.insert(
                slot,
                Neighbor {
                    index: node.point,
                    position,
                    distance,
                },
            );
            best.truncate(k);
        }

        let diff = query[node.axis] - position[node.axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.search_nearest(near, query, k, best);
        if best.len() < k || best.last().is_some_and(|worst| diff.abs() < worst.distance) {
            self.search_nearest(far, query, k, best);
        }
    }

    fn search_radius(&self, node: Option<usize>, query: Vec3, radius: f32, found: &mut Vec<Neighbor>) {
        let Some(node) = node.map(|i| &self.nodes[i]) else {
            return;
        };
        let position = self.points[node.point];
        let distance = position.distance(query);
        if distance <= radius {
            found.push(Neighbor {
                index: node.point,
                position,
                distance,
            });
        }
        let diff = query[node.axis] - position[node.axis];
        if diff - radius <= 0.0 {
            self.search_radius(node.left, query, radius, found);
        }
        if diff + radius >= 0.0 {
            self.search_radius(node.right, query, radius, found);
        }
    }
}

fn build_node(points: &[Vec3], order: &mut [usize], depth: usize, nodes: &mut Vec<KdNode>) -> Option<usize> {
    if order.is_empty() {
        return None;
    }
    let axis = depth % 3;
    order.sort_by(|a, b| points[*a][axis].total_cmp(&points[*b][axis]).then(a.cmp(b)));
    let mid = order.len() / 2;
    let point = order[mid];
    let (left, rest) = order.split_at_mut(mid);
    let right = &mut rest[1..];
    let left = build_node(points, left, depth + 1, nodes);
    let right = build_node(points, right, depth + 1, nodes);
    nodes.push(KdNode {
        point,
        axis,
        left,
        right,
    });
    Some(nodes.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice() -> Vec<Vec3> {
        let mut points = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                for z in 0..3 {
                    points.push(Vec3::new(x as f32, y as f32, z as f32 * 0.5));
                }
            }
        }
        points
    }

    fn brute_force(points: &[Vec3], query: Vec3) -> Vec<(usize, f32)> {
        let mut all: Vec<_> = points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.distance(query)))
            .collect();
        all.sort_by(|a, b| a.1.total_cmp(&b.1));
        all
    }

    #[test]
    fn empty_index_finds_nothing() {
        let index = PointIndex::build(Vec::new());
        assert!(index.nearest(Vec3::ZERO).is_none());
        assert!(index.within_radius(Vec3::ZERO, 10.0).is_empty());
    }

    #[test]
    fn nearest_matches_brute_force() {
        let points = lattice();
        let index = PointIndex::build(points.clone());
        for query in [
            Vec3::new(1.2, 3.7, 0.1),
            Vec3::new(-2.0, 0.4, 5.0),
            Vec3::new(4.49, 2.51, 0.74),
        ] {
            let expected = brute_force(&points, query);
            let found = index.nearest_n(query, 4);
            assert_eq!(found.len(), 4);
            for (n, (_, dist)) in found.iter().zip(expected.iter()) {
                assert!((n.distance - dist).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn radius_query_is_sorted_and_complete() {
        let points = lattice();
        let index = PointIndex::build(points.clone());
        let query = Vec3::new(2.0, 2.0, 0.5);
        let found = index.within_radius(query, 1.05);
        let expected = brute_force(&points, query)
            .into_iter()
            .filter(|(_, d)| *d <= 1.05)
            .count();
        assert_eq!(found.len(), expected);
        assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(found[0].distance, 0.0);
    }
}
