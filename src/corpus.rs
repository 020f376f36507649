use crate::page::PageRecord;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed page file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// The pages under comparison, in matrix order. Entry `i` of `labels`
/// names row and column `i` of every derived matrix.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    labels: Vec<String>,
    pages: Vec<PageRecord>,
}

impl Corpus {
    pub fn new() -> Self {
        Corpus::default()
    }

    pub fn push(&mut self, label: impl Into<String>, page: PageRecord) {
        self.labels.push(label.into());
        self.pages.push(page);
    }

    /// Loads every `*.json` page file in `dir`, sorted by file name. Any
    /// unreadable or malformed file aborts the load: skipping it would shift
    /// every later label against the matrix.
    pub fn load_dir(dir: &Path) -> Result<Self, CorpusError> {
        if !dir.is_dir() {
            return Err(CorpusError::NotADirectory(dir.to_path_buf()));
        }

        let entries = std::fs::read_dir(dir).map_err(|source| CorpusError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CorpusError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        info!("Loading {} page files from {}", paths.len(), dir.display());

        // Parse in parallel, then report the first failure in file order.
        let loaded: Vec<Result<PageRecord, CorpusError>> =
            paths.par_iter().map(|path| load_page(path)).collect();

        let mut corpus = Corpus::new();
        for (path, page) in paths.iter().zip(loaded) {
            let page = page?;
            debug!(
                "Loaded {} ({} grid elements, {} nodes)",
                path.display(),
                page.grid.len(),
                page.node_count()
            );
            corpus.push(page_label(path), page);
        }

        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn pages(&self) -> &[PageRecord] {
        &self.pages
    }

    /// Names of the source documents the pages were extracted from.
    pub fn member_names(&self) -> Vec<String> {
        self.labels.iter().map(|label| format!("{label}.html")).collect()
    }
}

pub fn load_page(path: &Path) -> Result<PageRecord, CorpusError> {
    let content = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    PageRecord::from_json_str(&content).map_err(|source| CorpusError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn page_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
