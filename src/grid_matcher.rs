use crate::assignment;
use crate::config::SimilarityConfig;
use crate::element_similarity::ElementSimilarityScorer;
use crate::page::Rect;

/// Closest candidate found by [`GridMatcher::best_match`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestMatch {
    pub index: usize,
    pub score: f64,
}

/// Compares sets of rectangles.
///
/// Whole grids are scored with an optimal one-to-one assignment, while
/// single elements are paired greedily with their nearest candidate.
#[derive(Debug, Clone, Default)]
pub struct GridMatcher {
    scorer: ElementSimilarityScorer,
}

impl GridMatcher {
    pub fn new(config: SimilarityConfig) -> Self {
        GridMatcher {
            scorer: ElementSimilarityScorer::new(config),
        }
    }

    pub fn scorer(&self) -> &ElementSimilarityScorer {
        &self.scorer
    }

    pub fn config(&self) -> &SimilarityConfig {
        self.scorer.config()
    }

    /// Sum of the optimally assigned pair scores divided by the size of the
    /// larger grid, so unmatched extras count as zero. Empty on either side
    /// yields 0.
    pub fn grid_similarity(&self, grid1: &[Rect], grid2: &[Rect]) -> f64 {
        if grid1.is_empty() || grid2.is_empty() {
            return 0.0;
        }

        let scores: Vec<Vec<f64>> = grid1
            .iter()
            .map(|a| grid2.iter().map(|b| self.scorer.score(a, b)).collect())
            .collect();

        let total: f64 = assignment::maximize(&scores)
            .into_iter()
            .map(|(row, col)| scores[row][col])
            .sum();

        total / grid1.len().max(grid2.len()) as f64
    }

    /// Linear scan for the candidate scoring highest against `target`. The
    /// first candidate wins ties.
    pub fn best_match(&self, target: &Rect, candidates: &[Rect]) -> Option<BestMatch> {
        self.best_match_by_key(target, candidates, |index| index)
    }

    /// Like [`best_match`](Self::best_match), but equal scores go to the
    /// candidate with the smallest `tie_key`. Ties on the key go to the
    /// earlier candidate.
    pub fn best_match_by_key<K, F>(
        &self,
        target: &Rect,
        candidates: &[Rect],
        mut tie_key: F,
    ) -> Option<BestMatch>
    where
        K: Ord,
        F: FnMut(usize) -> K,
    {
        let mut best: Option<(BestMatch, K)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let score = self.scorer.score(target, candidate);
            let replace = match &best {
                None => true,
                Some((current, key)) => {
                    score > current.score || (score == current.score && tie_key(index) < *key)
                }
            };
            if replace {
                best = Some((BestMatch { index, score }, tie_key(index)));
            }
        }
        best.map(|(found, _)| found)
    }
}
