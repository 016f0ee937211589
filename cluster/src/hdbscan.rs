//! Density-based clustering with automatic cluster-count selection.
//!
//! The implementation follows the HDBSCAN formulation (Campello, Moulavi,
//! Sander 2013): core distances estimate local density, a minimum spanning
//! tree over mutual reachability distances captures the density hierarchy,
//! and clusters are read out of a condensed tree by stability ("excess of
//! mass"), preferring fewer persistent clusters over many small fragments.
//!
//! Two conventions matter for callers:
//!
//! - Neighbor counting for core distances includes the point itself, so
//!   `min_samples = 2` means "distance to the nearest other point".
//! - The root of the condensed tree is never selectable. A dataset with no
//!   internal density structure therefore comes back all noise rather than
//!   as one cluster covering everything.
//!
//! O(n^2) time and memory; fine for the per-partition group sizes this
//! workspace clusters.

use crate::NOISE;

pub(crate) fn hdbscan(points: &[Vec<f32>], min_cluster_size: usize, min_samples: usize) -> Vec<i32> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![NOISE];
    }
    let min_cluster_size = min_cluster_size.max(2);
    let min_samples = min_samples.max(1);

    let dists = pairwise_euclidean(points);
    let core = core_distances(&dists, n, min_samples);

    let mut edges = reachability_mst(n, &dists, &core);
    edges.sort_by(|a, b| a.2.total_cmp(&b.2));

    let tree = condense(&edges, n, min_cluster_size);
    compact_labels(&tree.labels(n), n)
}

fn pairwise_euclidean(points: &[Vec<f32>]) -> Vec<f32> {
    let n = points.len();
    let mut dists = vec![0.0f32; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = points[i]
                .iter()
                .zip(&points[j])
                .map(|(a, b)| {
                    let diff = a - b;
                    diff * diff
                })
                .sum::<f32>()
                .sqrt();
            dists[i * n + j] = d;
            dists[j * n + i] = d;
        }
    }
    dists
}

/// Distance from each point to its `min_samples`-th nearest neighbor,
/// counting the point itself as the first.
fn core_distances(dists: &[f32], n: usize, min_samples: usize) -> Vec<f32> {
    let k = min_samples.saturating_sub(1).min(n - 1);
    if k == 0 {
        return vec![0.0; n];
    }

    let mut core = Vec::with_capacity(n);
    for i in 0..n {
        let mut row: Vec<f32> = (0..n).filter(|&j| j != i).map(|j| dists[i * n + j]).collect();
        row.sort_by(|a, b| a.total_cmp(b));
        core.push(row[k - 1]);
    }
    core
}

/// Prim MST over the complete mutual-reachability graph.
///
/// `mrd(i, j) = max(core[i], core[j], dist(i, j))`.
fn reachability_mst(n: usize, dists: &[f32], core: &[f32]) -> Vec<(u32, u32, f32)> {
    let mrd = |i: usize, j: usize| dists[i * n + j].max(core[i]).max(core[j]);

    let mut in_tree = vec![false; n];
    let mut best = vec![f32::INFINITY; n];
    let mut from = vec![u32::MAX; n];
    best[0] = 0.0;

    for _ in 0..n {
        let mut u = usize::MAX;
        let mut u_best = f32::INFINITY;
        for i in 0..n {
            if !in_tree[i] && best[i] < u_best {
                u_best = best[i];
                u = i;
            }
        }
        if u == usize::MAX {
            break;
        }
        in_tree[u] = true;

        for v in 0..n {
            if in_tree[v] {
                continue;
            }
            let d = mrd(u, v);
            if d < best[v] {
                best[v] = d;
                from[v] = u as u32;
            }
        }
    }

    let mut edges = Vec::with_capacity(n - 1);
    for v in 1..n {
        if from[v] != u32::MAX {
            edges.push((from[v], v as u32, best[v]));
        }
    }
    edges
}

// ---------------------------------------------------------------------------
// Condensed cluster tree
// ---------------------------------------------------------------------------

/// One row of the condensed tree: a point (`child < n_points`) or a child
/// cluster (`child >= n_points`) leaving `parent` at density `lambda`.
struct TreeEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

struct CondensedTree {
    edges: Vec<TreeEdge>,
    n_points: usize,
    n_clusters: usize,
}

/// Disjoint components with explicit member lists, merged small-into-large.
struct Components {
    parent: Vec<u32>,
    members: Vec<Vec<u32>>,
}

impl Components {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
            members: (0..n as u32).map(|i| vec![i]).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] as usize != root {
            root = self.parent[root] as usize;
        }
        let mut cur = x;
        while self.parent[cur] as usize != root {
            let next = self.parent[cur] as usize;
            self.parent[cur] = root as u32;
            cur = next;
        }
        root
    }

    fn size(&self, root: usize) -> usize {
        self.members[root].len()
    }

    fn merge(&mut self, ra: usize, rb: usize) -> usize {
        let (big, small) = if self.members[ra].len() >= self.members[rb].len() {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big as u32;
        let moved = std::mem::take(&mut self.members[small]);
        self.members[big].extend(moved);
        big
    }
}

/// Walks the MST edges in ascending order, recording cluster births, splits,
/// and point fallouts into a flat condensed-tree table.
fn condense(edges: &[(u32, u32, f32)], n: usize, min_cluster_size: usize) -> CondensedTree {
    let mut comps = Components::new(n);
    // Cluster currently attached to a component root, if any.
    let mut cluster_of: Vec<Option<usize>> = vec![None; n];
    let mut next_cluster = n;
    let mut out: Vec<TreeEdge> = Vec::new();

    let fallout = |out: &mut Vec<TreeEdge>, members: &[u32], cluster: usize, lambda: f64| {
        for &p in members {
            out.push(TreeEdge {
                parent: cluster,
                child: p as usize,
                lambda,
                size: 1,
            });
        }
    };

    for &(u, v, dist) in edges {
        let ru = comps.find(u as usize);
        let rv = comps.find(v as usize);
        if ru == rv {
            continue;
        }

        let lambda = if dist > 0.0 {
            1.0 / dist as f64
        } else {
            f64::INFINITY
        };
        let su = comps.size(ru);
        let sv = comps.size(rv);
        let big_u = su >= min_cluster_size;
        let big_v = sv >= min_cluster_size;

        if big_u && big_v {
            // Genuine split seen bottom-up: both sides persist as clusters.
            let cu = match cluster_of[ru] {
                Some(c) => c,
                None => {
                    let c = next_cluster;
                    next_cluster += 1;
                    fallout(&mut out, &comps.members[ru], c, lambda);
                    c
                }
            };
            let cv = match cluster_of[rv] {
                Some(c) => c,
                None => {
                    let c = next_cluster;
                    next_cluster += 1;
                    fallout(&mut out, &comps.members[rv], c, lambda);
                    c
                }
            };
            let parent = next_cluster;
            next_cluster += 1;

            out.push(TreeEdge {
                parent,
                child: cu,
                lambda,
                size: su,
            });
            out.push(TreeEdge {
                parent,
                child: cv,
                lambda,
                size: sv,
            });

            let root = comps.merge(ru, rv);
            cluster_of[root] = Some(parent);
        } else if big_u || big_v {
            // Small side falls out of the persistent side point by point.
            let (big, small) = if big_u { (ru, rv) } else { (rv, ru) };
            let cluster = match cluster_of[big] {
                Some(c) => c,
                None => {
                    let c = next_cluster;
                    next_cluster += 1;
                    fallout(&mut out, &comps.members[big], c, lambda);
                    c
                }
            };
            fallout(&mut out, &comps.members[small], cluster, lambda);

            let root = comps.merge(big, small);
            cluster_of[root] = Some(cluster);
        } else {
            // Neither side is large enough for a cluster event yet.
            let root = comps.merge(ru, rv);
            cluster_of[root] = None;
        }
    }

    CondensedTree {
        edges: out,
        n_points: n,
        n_clusters: next_cluster - n,
    }
}

impl CondensedTree {
    /// Excess-of-mass cluster selection followed by point labeling.
    ///
    /// Returns raw labels: a selected-cluster index per point or [`NOISE`].
    fn labels(&self, n: usize) -> Vec<i32> {
        let nc = self.n_clusters;
        if nc == 0 {
            return vec![NOISE; n];
        }

        let mut birth = vec![0.0f64; nc];
        let mut is_child = vec![false; nc];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); nc];
        let mut point_children: Vec<Vec<usize>> = vec![Vec::new(); nc];

        for e in &self.edges {
            let parent = e.parent - self.n_points;
            if e.child >= self.n_points {
                let child = e.child - self.n_points;
                birth[child] = e.lambda;
                is_child[child] = true;
                children[parent].push(child);
            } else {
                point_children[parent].push(e.child);
            }
        }

        // stability(c) = sum over departures from c of size * (lambda - birth).
        // Duplicate points produce infinite lambdas; an inf-minus-inf term
        // carries no mass and is skipped.
        let mut stability = vec![0.0f64; nc];
        for e in &self.edges {
            let parent = e.parent - self.n_points;
            let delta = e.lambda - birth[parent];
            if !delta.is_nan() {
                stability[parent] += e.size as f64 * delta;
            }
        }

        // Select bottom-up: a parent replaces its children only when its own
        // stability exceeds their combined subtree stability. The tree root
        // is never selectable, so structureless data stays noise.
        let order = self.post_order(&children, &is_child);
        let mut selected = vec![false; nc];
        let mut subtree = stability.clone();

        for &i in &order {
            if !is_child[i] {
                continue;
            }
            if children[i].is_empty() {
                selected[i] = true;
            } else {
                let child_sum: f64 = children[i].iter().map(|&c| subtree[c]).sum();
                if stability[i] > child_sum {
                    selected[i] = true;
                    deselect_below(&children, i, &mut selected);
                } else {
                    subtree[i] = child_sum;
                }
            }
        }

        let mut labels = vec![NOISE; n];
        for (i, &sel) in selected.iter().enumerate() {
            if !sel {
                continue;
            }
            self.label_subtree(&children, &point_children, &selected, i, i as i32, &mut labels);
        }
        labels
    }

    /// Children-before-parents ordering over all clusters.
    fn post_order(&self, children: &[Vec<usize>], is_child: &[bool]) -> Vec<usize> {
        let nc = self.n_clusters;
        let mut order = Vec::with_capacity(nc);
        let mut stack: Vec<(usize, bool)> = (0..nc)
            .filter(|&c| !is_child[c])
            .map(|c| (c, false))
            .collect();

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            stack.push((node, true));
            for &c in &children[node] {
                stack.push((c, false));
            }
        }
        order
    }

    /// Labels the direct points of cluster `idx` and of every non-selected
    /// descendant.
    fn label_subtree(
        &self,
        children: &[Vec<usize>],
        point_children: &[Vec<usize>],
        selected: &[bool],
        idx: usize,
        label: i32,
        labels: &mut [i32],
    ) {
        let mut stack = vec![idx];
        while let Some(c) = stack.pop() {
            for &p in &point_children[c] {
                labels[p] = label;
            }
            for &child in &children[c] {
                if !selected[child] {
                    stack.push(child);
                }
            }
        }
    }
}

fn deselect_below(children: &[Vec<usize>], node: usize, selected: &mut [bool]) {
    let mut stack: Vec<usize> = children[node].clone();
    while let Some(c) = stack.pop() {
        selected[c] = false;
        stack.extend(children[c].iter().copied());
    }
}

/// Renumbers raw labels to `0..m` by first occurrence in point order.
fn compact_labels(raw: &[i32], n: usize) -> Vec<i32> {
    let mut mapping: Vec<(i32, i32)> = Vec::new();
    let mut out = Vec::with_capacity(n);
    for &l in raw {
        if l == NOISE {
            out.push(NOISE);
            continue;
        }
        let mapped = match mapping.iter().find(|(old, _)| *old == l) {
            Some(&(_, new)) => new,
            None => {
                let new = mapping.len() as i32;
                mapping.push((l, new));
                new
            }
        };
        out.push(mapped);
    }
    out
}
