//! Maximum-weight bipartite assignment (Hungarian algorithm with potentials).

/// Pairs rows with columns so that the sum of `scores[row][col]` over the
/// pairs is maximal. Exactly `min(rows, cols)` pairs are returned, ordered
/// by row. `scores` must be rectangular with finite entries.
pub fn maximize(scores: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let rows = scores.len();
    let cols = scores.first().map_or(0, Vec::len);
    if rows == 0 || cols == 0 {
        return Vec::new();
    }

    if rows <= cols {
        let cost: Vec<Vec<f64>> = scores
            .iter()
            .map(|row| row.iter().map(|s| -s).collect())
            .collect();
        let mut pairs = solve(&cost);
        pairs.sort_unstable();
        pairs
    } else {
        let cost: Vec<Vec<f64>> = (0..cols)
            .map(|c| (0..rows).map(|r| -scores[r][c]).collect())
            .collect();
        let mut pairs: Vec<(usize, usize)> = solve(&cost).into_iter().map(|(c, r)| (r, c)).collect();
        pairs.sort_unstable();
        pairs
    }
}

/// Minimum-cost assignment of every row of `cost` (rows <= cols).
fn solve(cost: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let n = cost.len();
    let m = cost[0].len();

    // 1-based potentials; index 0 is the virtual root column.
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut owner = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut j0 = 0;
        let mut min_slack = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let slack = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if slack < min_slack[j] {
                    min_slack[j] = slack;
                    way[j] = j0;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            j0 = j1;
            if owner[j0] == 0 {
                break;
            }
        }

        // Flip the augmenting path back to the root.
        while j0 != 0 {
            let prev = way[j0];
            owner[j0] = owner[prev];
            j0 = prev;
        }
    }

    (1..=m)
        .filter(|&j| owner[j] != 0)
        .map(|j| (owner[j] - 1, j - 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(scores: &[Vec<f64>], pairs: &[(usize, usize)]) -> f64 {
        pairs.iter().map(|&(r, c)| scores[r][c]).sum()
    }

    /// Exhaustive optimum over injective maps from the smaller side.
    fn brute_force(scores: &[Vec<f64>]) -> f64 {
        fn search(scores: &[Vec<f64>], row: usize, used: &mut Vec<bool>, transpose: bool) -> f64 {
            let (rows, cols) = if transpose {
                (scores[0].len(), scores.len())
            } else {
                (scores.len(), scores[0].len())
            };
            if row == rows {
                return 0.0;
            }
            let mut best = f64::NEG_INFINITY;
            for col in 0..cols {
                if used[col] {
                    continue;
                }
                used[col] = true;
                let value = if transpose { scores[col][row] } else { scores[row][col] };
                best = best.max(value + search(scores, row + 1, used, transpose));
                used[col] = false;
            }
            best
        }

        let transpose = scores.len() > scores[0].len();
        let cols = if transpose { scores.len() } else { scores[0].len() };
        search(scores, 0, &mut vec![false; cols], transpose)
    }

    fn pseudo_random_matrix(rows: usize, cols: usize, seed: u64) -> Vec<Vec<f64>> {
        let mut state = seed;
        (0..rows)
            .map(|_| {
                (0..cols)
                    .map(|_| {
                        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                        (state >> 11) as f64 / (1u64 << 53) as f64
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_empty_inputs() {
        assert!(maximize(&[]).is_empty());
        assert!(maximize(&[vec![], vec![]]).is_empty());
    }

    #[test]
    fn test_prefers_global_optimum_over_greedy() {
        // Greedy would take (0,0)=0.9 and be left with (1,1)=0.1.
        let scores = vec![vec![0.9, 0.8], vec![0.7, 0.1]];
        let pairs = maximize(&scores);
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
        assert!((total(&scores, &pairs) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_rectangular_shapes() {
        let wide = vec![vec![0.1, 0.9, 0.3], vec![0.8, 0.2, 0.4]];
        assert_eq!(maximize(&wide), vec![(0, 1), (1, 0)]);

        let tall = vec![vec![0.1, 0.9], vec![0.8, 0.2], vec![0.95, 0.3]];
        let pairs = maximize(&tall);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs, vec![(0, 1), (2, 0)]);
    }

    #[test]
    fn test_matches_brute_force() {
        let shapes = [(1, 1), (2, 3), (3, 3), (4, 2), (4, 5), (5, 5), (6, 3)];
        for (seed, &(rows, cols)) in shapes.iter().enumerate() {
            let scores = pseudo_random_matrix(rows, cols, seed as u64 + 7);
            let pairs = maximize(&scores);

            assert_eq!(pairs.len(), rows.min(cols));
            let mut seen_cols: Vec<usize> = pairs.iter().map(|&(_, c)| c).collect();
            seen_cols.sort_unstable();
            seen_cols.dedup();
            assert_eq!(seen_cols.len(), pairs.len(), "column assigned twice");

            let expected = brute_force(&scores);
            assert!(
                (total(&scores, &pairs) - expected).abs() < 1e-9,
                "shape {rows}x{cols}: got {}, expected {expected}",
                total(&scores, &pairs)
            );
        }
    }
}
