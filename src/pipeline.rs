use crate::clustering::{ClusterAssignment, ClusterGrouper};
use crate::config::{ConfigError, GrouperConfig};
use crate::corpus::{Corpus, CorpusError};
use crate::matrix::{MatrixError, SimilarityMatrix, SimilarityMatrixBuilder};
use crate::report::{self, ClusterSummary, ReportError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),
    #[error("Report error: {0}")]
    Report(#[from] ReportError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Grouping did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Grouping task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Where the similarity matrix comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixSource {
    /// A directory of extracted page files; the matrix is computed.
    Pages(PathBuf),
    /// A matrix saved by an earlier run, with its member name list.
    Saved { matrix: PathBuf, names: PathBuf },
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source: MatrixSource,
    /// Receives the matrix artifacts and `clusters.json`.
    pub results_dir: PathBuf,
    /// Directory holding the original documents named in the member list.
    pub documents_dir: Option<PathBuf>,
    /// Cluster directories are created here when `documents_dir` is set.
    pub output_dir: Option<PathBuf>,
    pub config: GrouperConfig,
    pub timeout: Option<Duration>,
}

impl PipelineOptions {
    pub fn new(source: MatrixSource, results_dir: impl Into<PathBuf>) -> Self {
        PipelineOptions {
            source,
            results_dir: results_dir.into(),
            documents_dir: None,
            output_dir: None,
            config: GrouperConfig::default(),
            timeout: None,
        }
    }

    /// Options for one subdirectory of a batch: the pages come from
    /// `pages_dir`, and every output location gains a `name` subdirectory.
    pub fn for_subdirectory(&self, name: &str, pages_dir: PathBuf) -> Self {
        PipelineOptions {
            source: MatrixSource::Pages(pages_dir),
            results_dir: self.results_dir.join(name),
            documents_dir: self.documents_dir.as_ref().map(|dir| dir.join(name)),
            output_dir: self.output_dir.as_ref().map(|dir| dir.join(name)),
            config: self.config.clone(),
            timeout: self.timeout,
        }
    }
}

/// Outcome of one subdirectory of a batch run.
#[derive(Debug)]
pub struct BatchRun {
    pub name: String,
    pub result: Result<PipelineSummary, PipelineError>,
}

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub member_names: Vec<String>,
    pub matrix: SimilarityMatrix,
    pub assignment: ClusterAssignment,
    pub clusters: ClusterSummary,
    pub files_copied: usize,
}

impl PipelineSummary {
    pub fn page_count(&self) -> usize {
        self.assignment.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.assignment.cluster_count()
    }
}

pub struct GroupingPipeline {
    options: PipelineOptions,
}

impl GroupingPipeline {
    pub fn new(options: PipelineOptions) -> Result<Self, PipelineError> {
        options.config.validate()?;
        Ok(GroupingPipeline { options })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs the pipeline once for every subdirectory of `root`, in name
    /// order. A failing subdirectory is logged and reported in its
    /// `BatchRun`; the remaining ones still run.
    pub async fn run_batch(
        root: &Path,
        template: &PipelineOptions,
    ) -> Result<Vec<BatchRun>, PipelineError> {
        template.config.validate()?;
        if !root.is_dir() {
            return Err(CorpusError::NotADirectory(root.to_path_buf()).into());
        }

        let io_error = |source| CorpusError::Io {
            path: root.to_path_buf(),
            source,
        };
        let mut subdirectories = Vec::new();
        for entry in std::fs::read_dir(root).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_dir() {
                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    subdirectories.push((name.to_string(), path.clone()));
                }
            }
        }
        subdirectories.sort();

        info!(
            "Batch run over {} directories in {}",
            subdirectories.len(),
            root.display()
        );

        let mut runs = Vec::with_capacity(subdirectories.len());
        for (name, path) in subdirectories {
            info!("Processing directory: {}", path.display());
            let options = template.for_subdirectory(&name, path);
            let result = match GroupingPipeline::new(options) {
                Ok(pipeline) => pipeline.run().await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                error!("Directory {} failed: {}", name, e);
            }
            runs.push(BatchRun { name, result });
        }
        Ok(runs)
    }

    /// Runs on the blocking pool. With a timeout set, the whole run is
    /// abandoned when it expires.
    pub async fn run(&self) -> Result<PipelineSummary, PipelineError> {
        let options = self.options.clone();
        let task = tokio::task::spawn_blocking(move || GroupingPipeline { options }.run_blocking());

        match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined?,
                Err(_) => Err(PipelineError::Timeout(limit)),
            },
            None => task.await?,
        }
    }

    pub fn run_blocking(&self) -> Result<PipelineSummary, PipelineError> {
        let options = &self.options;
        let (matrix, member_names) = match &options.source {
            MatrixSource::Pages(dir) => self.compute_matrix(dir)?,
            MatrixSource::Saved { matrix, names } => {
                info!("Loading saved matrix from {}", matrix.display());
                let loaded = report::read_npy(matrix)?;
                let member_names = report::read_names(names)?;
                if member_names.len() != loaded.len() {
                    return Err(MatrixError::LabelMismatch {
                        matrix: loaded.len(),
                        labels: member_names.len(),
                    }
                    .into());
                }
                (loaded, member_names)
            }
        };

        let grouper = ClusterGrouper::new(options.config.cluster.clone());
        let assignment = grouper.group(&matrix);

        std::fs::create_dir_all(&options.results_dir).map_err(|source| ReportError::Io {
            path: options.results_dir.clone(),
            source,
        })?;
        let clusters = ClusterSummary::new(
            &assignment,
            &member_names,
            options.config.cluster.distance_threshold,
        )?;
        clusters.save(&options.results_dir.join(report::CLUSTER_SUMMARY_FILE))?;

        let files_copied = match (&options.documents_dir, &options.output_dir) {
            (Some(documents), Some(output)) => {
                report::materialize_clusters(&assignment, &member_names, documents, output)?
            }
            _ => 0,
        };

        Ok(PipelineSummary {
            member_names,
            matrix,
            assignment,
            clusters,
            files_copied,
        })
    }

    fn compute_matrix(
        &self,
        dir: &std::path::Path,
    ) -> Result<(SimilarityMatrix, Vec<String>), PipelineError> {
        let options = &self.options;
        let corpus = Corpus::load_dir(dir)?;
        info!("Loaded {} pages from {}", corpus.len(), dir.display());

        let builder =
            SimilarityMatrixBuilder::new(options.config.similarity.clone(), options.config.threads);
        let matrix = builder.build(corpus.pages())?;

        let member_names = corpus.member_names();
        report::write_matrix_reports(&options.results_dir, &matrix, corpus.labels(), &member_names)?;
        Ok((matrix, member_names))
    }
}
