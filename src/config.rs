use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables of the element, grid and tree similarity metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Position tolerance as a fraction of the largest compared dimension.
    pub position_threshold_factor: f64,
    /// Position tolerance floor in pixels.
    pub min_position_threshold: f64,
    pub size_threshold_factor: f64,
    pub min_size_threshold: f64,
    /// Early-exit gate for whole pages and acceptance bar for element
    /// correspondences.
    pub similarity_threshold: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        SimilarityConfig {
            position_threshold_factor: 0.05,
            min_position_threshold: 5.0,
            size_threshold_factor: 0.1,
            min_size_threshold: 10.0,
            similarity_threshold: 0.45,
            viewport_width: 1280.0,
            viewport_height: 800.0,
        }
    }
}

impl SimilarityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = [
            ("position_threshold_factor", self.position_threshold_factor),
            ("min_position_threshold", self.min_position_threshold),
            ("size_threshold_factor", self.size_threshold_factor),
            ("min_size_threshold", self.min_size_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }

        // Both tolerances are divisors once the floors and factors are applied.
        if self.min_position_threshold == 0.0 || self.min_size_threshold == 0.0 {
            return Err(ConfigError::Invalid(
                "position and size threshold floors must be greater than zero".to_string(),
            ));
        }

        if !(self.viewport_width > 0.0 && self.viewport_height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "viewport must be positive, got {}x{}",
                self.viewport_width, self.viewport_height
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Dendrogram cut height.
    pub distance_threshold: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            distance_threshold: 0.5,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "distance_threshold must be a non-negative number, got {}",
                self.distance_threshold
            )));
        }
        Ok(())
    }
}

/// Everything that can be set from a JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrouperConfig {
    pub similarity: SimilarityConfig,
    pub cluster: ClusterConfig,
    /// Worker threads for the matrix build; 0 lets rayon decide.
    pub threads: usize,
}

impl GrouperConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GrouperConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.similarity.validate()?;
        self.cluster.validate()
    }
}
