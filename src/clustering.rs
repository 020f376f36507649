use crate::config::ClusterConfig;
use crate::matrix::SimilarityMatrix;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// One agglomeration step. Leaves are numbered `0..n`; the cluster created
/// by merge `k` is numbered `n + k`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Dendrogram {
    leaves: usize,
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Ward linkage over the rows of the distance matrix `1 - M`, each row
    /// being one observation vector.
    pub fn ward(matrix: &SimilarityMatrix) -> Self {
        let n = matrix.len();
        let observations = distance_matrix(matrix);

        // Pairwise Euclidean distances between observations, indexed by slot.
        let mut dist = vec![vec![0.0f64; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = observations[i]
                    .iter()
                    .zip(&observations[j])
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                dist[i][j] = d;
                dist[j][i] = d;
            }
        }

        // Each slot holds an active cluster (id, size) until merged away.
        let mut slots: Vec<Option<(usize, usize)>> = (0..n).map(|i| Some((i, 1))).collect();
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        for step in 0..n.saturating_sub(1) {
            let mut best: Option<(usize, usize, f64)> = None;
            for a in 0..n {
                if slots[a].is_none() {
                    continue;
                }
                for b in (a + 1)..n {
                    if slots[b].is_none() {
                        continue;
                    }
                    if best.map_or(true, |(_, _, d)| dist[a][b] < d) {
                        best = Some((a, b, dist[a][b]));
                    }
                }
            }

            let Some((a, b, height)) = best else {
                break;
            };
            let (Some((id_a, size_a)), Some((id_b, size_b))) = (slots[a], slots[b]) else {
                break;
            };
            let size = size_a + size_b;
            merges.push(Merge {
                left: id_a.min(id_b),
                right: id_a.max(id_b),
                height,
                size,
            });

            // Lance-Williams update for Ward's criterion.
            for k in 0..n {
                if k == a || k == b {
                    continue;
                }
                let Some((_, size_k)) = slots[k] else {
                    continue;
                };
                let total = (size_a + size_b + size_k) as f64;
                let squared = ((size_a + size_k) as f64 * dist[a][k].powi(2)
                    + (size_b + size_k) as f64 * dist[b][k].powi(2)
                    - size_k as f64 * height.powi(2))
                    / total;
                let d = squared.max(0.0).sqrt();
                dist[a][k] = d;
                dist[k][a] = d;
            }

            slots[a] = Some((n + step, size));
            slots[b] = None;
        }

        Dendrogram { leaves: n, merges }
    }

    pub fn leaves(&self) -> usize {
        self.leaves
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Flat clusters whose members are joined by merges no higher than
    /// `threshold`.
    pub fn cut(&self, threshold: f64) -> ClusterAssignment {
        let n = self.leaves;
        let mut parent: Vec<usize> = (0..n).collect();
        // Any leaf of cluster `id`; leaves represent themselves.
        let mut representative: Vec<usize> = (0..n).collect();

        for merge in &self.merges {
            let left = representative[merge.left];
            let right = representative[merge.right];
            if merge.height <= threshold {
                let (root_left, root_right) = (find(&mut parent, left), find(&mut parent, right));
                if root_left != root_right {
                    parent[root_right.max(root_left)] = root_right.min(root_left);
                }
            }
            representative.push(left);
        }

        let mut labels = vec![0; n];
        let mut label_of_root: BTreeMap<usize, usize> = BTreeMap::new();
        for (leaf, label) in labels.iter_mut().enumerate() {
            let root = find(&mut parent, leaf);
            let next = label_of_root.len() + 1;
            *label = *label_of_root.entry(root).or_insert(next);
        }

        ClusterAssignment { labels }
    }
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

/// `1 - M`, clamped to `[0, 1]`.
pub fn distance_matrix(matrix: &SimilarityMatrix) -> Vec<Vec<f64>> {
    matrix
        .rows()
        .map(|row| row.iter().map(|s| (1.0 - s).clamp(0.0, 1.0)).collect())
        .collect()
}

/// Cluster label (starting at 1) of every page, by page index. Labels are
/// numbered in order of each cluster's first member.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ClusterAssignment {
    labels: Vec<usize>,
}

impl ClusterAssignment {
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn label_of(&self, index: usize) -> Option<usize> {
        self.labels.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn cluster_count(&self) -> usize {
        self.labels.iter().max().copied().unwrap_or(0)
    }

    /// Member indices of every cluster, keyed by label.
    pub fn clusters(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, label) in self.labels.iter().enumerate() {
            clusters.entry(*label).or_default().push(index);
        }
        clusters
    }
}

/// Partitions a corpus from its similarity matrix.
#[derive(Debug, Clone, Default)]
pub struct ClusterGrouper {
    config: ClusterConfig,
}

impl ClusterGrouper {
    pub fn new(config: ClusterConfig) -> Self {
        ClusterGrouper { config }
    }

    pub fn group(&self, matrix: &SimilarityMatrix) -> ClusterAssignment {
        let assignment = Dendrogram::ward(matrix).cut(self.config.distance_threshold);
        info!(
            "Formed {} clusters from {} pages at distance threshold {}",
            assignment.cluster_count(),
            assignment.len(),
            self.config.distance_threshold
        );
        assignment
    }
}
