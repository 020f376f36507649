use crate::clustering::ClusterAssignment;
use crate::matrix::{MatrixError, SimilarityMatrix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const MATRIX_NPY_FILE: &str = "similarity_matrix.npy";
pub const MATRIX_TEXT_FILE: &str = "similarity_matrix.txt";
pub const MATRIX_LABELS_FILE: &str = "similarity_matrix_labels.txt";
pub const NAMES_FILE: &str = "website_names.txt";
pub const CLUSTER_SUMMARY_FILE: &str = "clusters.json";

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGNMENT: usize = 64;
const COLUMN_WIDTH: usize = 10;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid .npy file {path}: {reason}")]
    InvalidNpy { path: PathBuf, reason: String },
    #[error("Member name {0:?} is not a plain file name")]
    UnsafeName(String),
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ReportError + '_ {
    move |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Encodes the matrix as a NumPy `.npy` (format 1.0, little-endian f8,
/// C order).
pub fn encode_npy(matrix: &SimilarityMatrix) -> Vec<u8> {
    let n = matrix.len();
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({n}, {n}), }}"
    );
    // magic + version + u16 length + header + trailing newline
    let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (NPY_ALIGNMENT - unpadded % NPY_ALIGNMENT) % NPY_ALIGNMENT;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut bytes = Vec::with_capacity(unpadded + padding + n * n * 8);
    bytes.extend_from_slice(NPY_MAGIC);
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for value in matrix.as_slice() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub fn decode_npy(bytes: &[u8]) -> Result<SimilarityMatrix, String> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err("missing NUMPY magic".to_string());
    }
    let (header_start, header_len) = match bytes[6] {
        1 => (10, u16::from_le_bytes([bytes[8], bytes[9]]) as usize),
        2 | 3 if bytes.len() >= 12 => (
            12,
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
        ),
        version => return Err(format!("unsupported format version {version}")),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .ok_or_else(|| "truncated header".to_string())?;
    let header = std::str::from_utf8(header).map_err(|e| e.to_string())?;

    if !header.contains("'descr': '<f8'") {
        return Err("only little-endian float64 data is supported".to_string());
    }
    if header.contains("'fortran_order': True") {
        return Err("Fortran-ordered data is not supported".to_string());
    }
    let (rows, cols) = parse_shape(header)?;
    if rows != cols {
        return Err(format!("expected a square matrix, got shape ({rows}, {cols})"));
    }

    let expected = rows
        .checked_mul(cols)
        .and_then(|cells| cells.checked_mul(8))
        .ok_or_else(|| format!("shape ({rows}, {cols}) is too large"))?;
    let data = &bytes[data_start..];
    if data.len() != expected {
        return Err(format!(
            "expected {} data bytes, found {}",
            expected,
            data.len()
        ));
    }
    let values = data
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect();

    SimilarityMatrix::from_raw(rows, values).map_err(|e| e.to_string())
}

fn parse_shape(header: &str) -> Result<(usize, usize), String> {
    let start = header
        .find("'shape': (")
        .map(|i| i + "'shape': (".len())
        .ok_or_else(|| "header has no shape".to_string())?;
    let end = header[start..]
        .find(')')
        .map(|i| start + i)
        .ok_or_else(|| "unterminated shape".to_string())?;

    let dims: Vec<usize> = header[start..end]
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| dim.parse::<usize>().map_err(|e| format!("bad dimension {dim:?}: {e}")))
        .collect::<Result<_, _>>()?;

    match dims.as_slice() {
        [rows, cols] => Ok((*rows, *cols)),
        _ => Err(format!("expected a 2-d shape, got {} dimensions", dims.len())),
    }
}

pub fn write_npy(path: &Path, matrix: &SimilarityMatrix) -> Result<(), ReportError> {
    std::fs::write(path, encode_npy(matrix)).map_err(io_error(path))
}

pub fn read_npy(path: &Path) -> Result<SimilarityMatrix, ReportError> {
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    decode_npy(&bytes).map_err(|reason| ReportError::InvalidNpy {
        path: path.to_path_buf(),
        reason,
    })
}

/// Fixed-width dump with row and column indices.
pub fn format_matrix(matrix: &SimilarityMatrix, title: &str) -> String {
    let n = matrix.len();
    let width = COLUMN_WIDTH;
    let mut out = String::new();

    if !title.is_empty() {
        let _ = writeln!(out, "{title} ({n}x{n})");
        let rule = title.len() + 6 + n.to_string().len() * 2;
        let _ = writeln!(out, "{}", "=".repeat(rule));
        out.push('\n');
    }

    out.push_str("     ");
    for j in 0..n {
        let _ = write!(out, "{j:^width$}");
    }
    out.push('\n');

    let divider = "-".repeat(5 + n * COLUMN_WIDTH);
    let _ = writeln!(out, "{divider}");

    for (i, row) in matrix.rows().enumerate() {
        let _ = write!(out, "{i:4} ");
        for value in row {
            let _ = write!(out, "{value:^width$.4}");
        }
        out.push('\n');

        if n > 10 && (i + 1) % 5 == 0 && i != n - 1 {
            let _ = writeln!(out, "{divider}");
        }
    }

    out
}

pub fn format_labels(labels: &[String]) -> String {
    let mut out = String::from("Index\tLabel\n-----\t-----\n");
    for (index, label) in labels.iter().enumerate() {
        let _ = writeln!(out, "{index}\t{label}");
    }
    out
}

/// Writes the binary matrix, its text dump with the companion label index,
/// and the member name list into `dir`.
pub fn write_matrix_reports(
    dir: &Path,
    matrix: &SimilarityMatrix,
    labels: &[String],
    member_names: &[String],
) -> Result<(), ReportError> {
    if labels.len() != matrix.len() || member_names.len() != matrix.len() {
        return Err(MatrixError::LabelMismatch {
            matrix: matrix.len(),
            labels: labels.len().min(member_names.len()),
        }
        .into());
    }

    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    write_npy(&dir.join(MATRIX_NPY_FILE), matrix)?;

    let text_path = dir.join(MATRIX_TEXT_FILE);
    std::fs::write(&text_path, format_matrix(matrix, "Enhanced Similarity Matrix"))
        .map_err(io_error(&text_path))?;

    let labels_path = dir.join(MATRIX_LABELS_FILE);
    std::fs::write(&labels_path, format_labels(labels)).map_err(io_error(&labels_path))?;

    let names_path = dir.join(NAMES_FILE);
    std::fs::write(&names_path, member_names.join("\n")).map_err(io_error(&names_path))?;

    info!("Matrix reports written to {}", dir.display());
    Ok(())
}

pub fn read_names(path: &Path) -> Result<Vec<String>, ReportError> {
    let content = std::fs::read_to_string(path).map_err(io_error(path))?;
    Ok(content
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub id: usize,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub generated_at: DateTime<Utc>,
    pub threshold: f64,
    pub page_count: usize,
    pub clusters: Vec<ClusterEntry>,
}

impl ClusterSummary {
    pub fn new(
        assignment: &ClusterAssignment,
        member_names: &[String],
        distance_threshold: f64,
    ) -> Result<Self, ReportError> {
        check_names(assignment, member_names)?;
        let clusters = assignment
            .clusters()
            .into_iter()
            .map(|(id, members)| ClusterEntry {
                id,
                members: members.into_iter().map(|i| member_names[i].clone()).collect(),
            })
            .collect();

        Ok(ClusterSummary {
            generated_at: Utc::now(),
            threshold: distance_threshold,
            page_count: assignment.len(),
            clusters,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let json_output = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json_output).map_err(io_error(path))?;
        info!("Cluster summary saved to: {}", path.display());
        Ok(())
    }
}

fn check_names(assignment: &ClusterAssignment, member_names: &[String]) -> Result<(), ReportError> {
    if assignment.len() != member_names.len() {
        return Err(MatrixError::LabelMismatch {
            matrix: assignment.len(),
            labels: member_names.len(),
        }
        .into());
    }
    Ok(())
}

/// Accepts only names made of one normal path component, so joining them
/// onto a directory stays inside it.
fn check_plain_name(name: &str) -> Result<(), ReportError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ReportError::UnsafeName(name.to_string())),
    }
}

/// Copies every member file from `source_dir` into
/// `output_dir/cluster_<id>/`. Sources are never moved; missing sources are
/// skipped with a warning. Returns the number of files copied.
pub fn materialize_clusters(
    assignment: &ClusterAssignment,
    member_names: &[String],
    source_dir: &Path,
    output_dir: &Path,
) -> Result<usize, ReportError> {
    check_names(assignment, member_names)?;
    for name in member_names {
        check_plain_name(name)?;
    }
    std::fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;

    let mut copied = 0;
    for (id, members) in assignment.clusters() {
        let cluster_dir = output_dir.join(format!("cluster_{id}"));
        std::fs::create_dir_all(&cluster_dir).map_err(io_error(&cluster_dir))?;

        for index in members {
            let name = &member_names[index];
            let source = source_dir.join(name);
            if !source.is_file() {
                warn!("Source file {} not found, skipping", source.display());
                continue;
            }
            let destination = cluster_dir.join(name);
            std::fs::copy(&source, &destination).map_err(io_error(&destination))?;
            copied += 1;
        }
    }

    info!(
        "Grouped {} files into {} directories inside {}",
        copied,
        assignment.cluster_count(),
        output_dir.display()
    );
    Ok(copied)
}
