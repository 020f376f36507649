use crate::config::SimilarityConfig;
use crate::page::PageRecord;
use crate::tree_compare::ElementTreeComparator;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("Matrix is not square: row {row} has {found} values, expected {expected}")]
    NotSquare {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Matrix data has {found} values, expected {expected}")]
    DataLength { expected: usize, found: usize },
    #[error("Matrix has {matrix} rows but {labels} labels were given")]
    LabelMismatch { matrix: usize, labels: usize },
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Dense N×N similarity matrix, stored row-major.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimilarityMatrix {
    size: usize,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    pub fn zeros(size: usize) -> Self {
        SimilarityMatrix {
            size,
            values: vec![0.0; size * size],
        }
    }

    pub fn from_raw(size: usize, values: Vec<f64>) -> Result<Self, MatrixError> {
        if values.len() != size * size {
            return Err(MatrixError::DataLength {
                expected: size * size,
                found: values.len(),
            });
        }
        Ok(SimilarityMatrix { size, values })
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, MatrixError> {
        let size = rows.len();
        let mut values = Vec::with_capacity(size * size);
        for (row, data) in rows.into_iter().enumerate() {
            if data.len() != size {
                return Err(MatrixError::NotSquare {
                    row,
                    expected: size,
                    found: data.len(),
                });
            }
            values.extend(data);
        }
        Ok(SimilarityMatrix { size, values })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.size + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.size..(row + 1) * self.size]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks() panics on 0, and an empty matrix has no rows anyway.
        self.values.chunks(self.size.max(1))
    }

    /// Row-major values.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn set_symmetric(&mut self, row: usize, col: usize, value: f64) {
        self.values[row * self.size + col] = value;
        self.values[col * self.size + row] = value;
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.size).all(|i| (i + 1..self.size).all(|j| self.get(i, j) == self.get(j, i)))
    }
}

/// Computes the page-to-page similarity matrix of a corpus.
///
/// Every unordered pair, the diagonal included, is compared once on a
/// dedicated rayon pool; results are mirrored afterwards so workers never
/// share a cell.
#[derive(Debug, Clone, Default)]
pub struct SimilarityMatrixBuilder {
    comparator: ElementTreeComparator,
    threads: usize,
}

impl SimilarityMatrixBuilder {
    /// `threads == 0` uses rayon's default pool size.
    pub fn new(config: SimilarityConfig, threads: usize) -> Self {
        SimilarityMatrixBuilder {
            comparator: ElementTreeComparator::new(config),
            threads,
        }
    }

    pub fn comparator(&self) -> &ElementTreeComparator {
        &self.comparator
    }

    pub fn build(&self, pages: &[PageRecord]) -> Result<SimilarityMatrix, MatrixError> {
        let n = pages.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (i..n).map(move |j| (i, j)))
            .collect();

        info!(
            "Computing {} pairwise comparisons for {} pages",
            pairs.len(),
            n
        );

        let pool = ThreadPoolBuilder::new().num_threads(self.threads).build()?;
        let scores: Vec<f64> = pool.install(|| {
            pairs
                .par_iter()
                .map(|&(i, j)| self.comparator.compare(&pages[i], &pages[j]))
                .collect()
        });

        let mut matrix = SimilarityMatrix::zeros(n);
        for (&(i, j), score) in pairs.iter().zip(scores) {
            matrix.set_symmetric(i, j, score);
        }

        debug!("Similarity matrix complete ({}x{})", n, n);
        Ok(matrix)
    }
}
