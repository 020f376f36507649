use crate::config::{ConfigError, GrouperConfig};
use crate::pipeline::{MatrixSource, PipelineOptions};
use crate::report::NAMES_FILE;
use clap::{value_parser, Arg, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub input: Option<PathBuf>,
    pub matrix: Option<PathBuf>,
    pub batch: Option<PathBuf>,
    pub names: Option<PathBuf>,
    pub results: PathBuf,
    pub source: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub similarity_threshold: Option<f64>,
    pub threads: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub verbose: bool,
}

impl CliArgs {
    pub fn parse() -> Result<Self, String> {
        Self::from_matches(&Self::command().get_matches())
    }

    pub fn parse_from<I, T>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command()
            .try_get_matches_from(args)
            .map_err(|e| e.to_string())?;
        Self::from_matches(&matches)
    }

    fn command() -> Command {
        Command::new("layout-grouper")
            .version("0.3.1")
            .about("Groups rendered web pages by structural layout similarity")
            .arg(
                Arg::new("input")
                    .long("input")
                    .value_name("DIR")
                    .help("Directory of extracted page layout files (*.json)")
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("matrix")
                    .long("matrix")
                    .value_name("FILE")
                    .help("Re-group from a saved similarity_matrix.npy instead of computing one")
                    .value_parser(value_parser!(PathBuf))
                    .conflicts_with("input"),
            )
            .arg(
                Arg::new("batch")
                    .long("batch")
                    .value_name("DIR")
                    .help("Group every subdirectory of DIR separately; results and output get one subdirectory each")
                    .value_parser(value_parser!(PathBuf))
                    .conflicts_with_all(["input", "matrix"]),
            )
            .arg(
                Arg::new("names")
                    .long("names")
                    .value_name("FILE")
                    .help("Member name list for --matrix (defaults to website_names.txt next to the matrix)")
                    .value_parser(value_parser!(PathBuf))
                    .requires("matrix"),
            )
            .arg(
                Arg::new("results")
                    .long("results")
                    .value_name("DIR")
                    .help("Directory for the matrix artifacts and cluster summary")
                    .value_parser(value_parser!(PathBuf))
                    .default_value("results"),
            )
            .arg(
                Arg::new("source")
                    .long("source")
                    .value_name("DIR")
                    .help("Directory holding the original HTML documents to copy into clusters")
                    .value_parser(value_parser!(PathBuf))
                    .requires("output"),
            )
            .arg(
                Arg::new("output")
                    .long("output")
                    .value_name("DIR")
                    .help("Directory that receives one cluster_<id> folder per group")
                    .value_parser(value_parser!(PathBuf))
                    .requires("source"),
            )
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_name("FILE")
                    .help("JSON configuration file; explicit flags take precedence")
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("threshold")
                    .long("threshold")
                    .value_name("DISTANCE")
                    .help("Dendrogram cut height (default 0.5)")
                    .value_parser(value_parser!(f64)),
            )
            .arg(
                Arg::new("similarity-threshold")
                    .long("similarity-threshold")
                    .value_name("SCORE")
                    .help("Grid similarity below which element trees are not compared (default 0.45)")
                    .value_parser(value_parser!(f64)),
            )
            .arg(
                Arg::new("threads")
                    .long("threads")
                    .value_name("N")
                    .help("Worker threads for the matrix build (0 = one per core)")
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                Arg::new("timeout-secs")
                    .long("timeout-secs")
                    .value_name("SECONDS")
                    .help("Abandon the run if it takes longer than this")
                    .value_parser(value_parser!(u64)),
            )
            .arg(
                Arg::new("verbose")
                    .long("verbose")
                    .help("Enable debug logging")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self, String> {
        let args = CliArgs {
            input: matches.get_one::<PathBuf>("input").cloned(),
            matrix: matches.get_one::<PathBuf>("matrix").cloned(),
            batch: matches.get_one::<PathBuf>("batch").cloned(),
            names: matches.get_one::<PathBuf>("names").cloned(),
            results: matches
                .get_one::<PathBuf>("results")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("results")),
            source: matches.get_one::<PathBuf>("source").cloned(),
            output: matches.get_one::<PathBuf>("output").cloned(),
            config: matches.get_one::<PathBuf>("config").cloned(),
            threshold: matches.get_one::<f64>("threshold").copied(),
            similarity_threshold: matches.get_one::<f64>("similarity-threshold").copied(),
            threads: matches.get_one::<usize>("threads").copied(),
            timeout_secs: matches.get_one::<u64>("timeout-secs").copied(),
            verbose: matches.get_flag("verbose"),
        };
        args.validate()?;
        Ok(args)
    }

    fn validate(&self) -> Result<(), String> {
        if self.input.is_none() && self.matrix.is_none() && self.batch.is_none() {
            return Err("One of --input, --matrix or --batch must be given".to_string());
        }
        if self.timeout_secs == Some(0) {
            return Err("--timeout-secs must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Loads the config file, if any, and overlays the explicit flags.
    pub fn grouper_config(&self) -> Result<GrouperConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => GrouperConfig::from_file(path)?,
            None => GrouperConfig::default(),
        };

        if let Some(threshold) = self.threshold {
            config.cluster.distance_threshold = threshold;
        }
        if let Some(threshold) = self.similarity_threshold {
            config.similarity.similarity_threshold = threshold;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn matrix_source(&self) -> MatrixSource {
        match (&self.matrix, &self.input) {
            (Some(matrix), _) => {
                let names = self.names.clone().unwrap_or_else(|| {
                    matrix
                        .parent()
                        .map(|dir| dir.join(NAMES_FILE))
                        .unwrap_or_else(|| PathBuf::from(NAMES_FILE))
                });
                MatrixSource::Saved {
                    matrix: matrix.clone(),
                    names,
                }
            }
            (None, Some(input)) => MatrixSource::Pages(input.clone()),
            // batch runs replace the source per subdirectory
            (None, None) => MatrixSource::Pages(self.batch.clone().unwrap_or_else(|| PathBuf::from("."))),
        }
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions, ConfigError> {
        let mut options = PipelineOptions::new(self.matrix_source(), self.results.clone());
        options.config = self.grouper_config()?;
        options.documents_dir = self.source.clone();
        options.output_dir = self.output.clone();
        options.timeout = self.timeout_secs.map(Duration::from_secs);
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_mode() {
        let args = CliArgs::parse_from(["layout-grouper", "--input", "pages", "--verbose"]).unwrap();

        assert_eq!(args.input, Some(PathBuf::from("pages")));
        assert_eq!(args.results, PathBuf::from("results"));
        assert!(args.verbose);
        assert_eq!(args.matrix_source(), MatrixSource::Pages(PathBuf::from("pages")));
    }

    #[test]
    fn test_parse_matrix_mode_defaults_names() {
        let args = CliArgs::parse_from(["layout-grouper", "--matrix", "out/similarity_matrix.npy"]).unwrap();

        assert_eq!(
            args.matrix_source(),
            MatrixSource::Saved {
                matrix: PathBuf::from("out/similarity_matrix.npy"),
                names: PathBuf::from("out/website_names.txt"),
            }
        );
    }

    #[test]
    fn test_requires_a_matrix_source() {
        let result = CliArgs::parse_from(["layout-grouper"]);
        assert!(result.unwrap_err().contains("--input, --matrix or --batch"));
    }

    #[test]
    fn test_input_conflicts_with_matrix() {
        let result = CliArgs::parse_from(["layout-grouper", "--input", "pages", "--matrix", "m.npy"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_batch_mode() {
        let args = CliArgs::parse_from([
            "layout-grouper", "--batch", "clones", "--source", "clones", "--output", "grouped_html",
        ])
        .unwrap();

        assert_eq!(args.batch, Some(PathBuf::from("clones")));
        let options = args.pipeline_options().unwrap();
        let per_site = options.for_subdirectory("site_a", PathBuf::from("clones/site_a"));
        assert_eq!(per_site.source, MatrixSource::Pages(PathBuf::from("clones/site_a")));
        assert_eq!(per_site.results_dir, PathBuf::from("results/site_a"));
        assert_eq!(per_site.output_dir, Some(PathBuf::from("grouped_html/site_a")));

        assert!(CliArgs::parse_from(["layout-grouper", "--batch", "clones", "--input", "pages"]).is_err());
    }

    #[test]
    fn test_source_requires_output() {
        let result = CliArgs::parse_from(["layout-grouper", "--input", "pages", "--source", "html"]);
        assert!(result.is_err());

        let args = CliArgs::parse_from([
            "layout-grouper", "--input", "pages", "--source", "html", "--output", "grouped",
        ])
        .unwrap();
        let options = args.pipeline_options().unwrap();
        assert_eq!(options.documents_dir, Some(PathBuf::from("html")));
        assert_eq!(options.output_dir, Some(PathBuf::from("grouped")));
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = CliArgs::parse_from([
            "layout-grouper",
            "--input",
            "pages",
            "--threshold",
            "0.8",
            "--similarity-threshold",
            "0.3",
            "--threads",
            "2",
            "--timeout-secs",
            "30",
        ])
        .unwrap();

        let options = args.pipeline_options().unwrap();
        assert_eq!(options.config.cluster.distance_threshold, 0.8);
        assert_eq!(options.config.similarity.similarity_threshold, 0.3);
        assert_eq!(options.config.threads, 2);
        assert_eq!(options.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("grouper.json");
        std::fs::write(&path, r#"{"cluster": {"distance_threshold": 0.9}, "threads": 3}"#).unwrap();

        let args = CliArgs::parse_from([
            OsString::from("layout-grouper"),
            OsString::from("--input"),
            OsString::from("pages"),
            OsString::from("--config"),
            path.into_os_string(),
            OsString::from("--threshold"),
            OsString::from("0.2"),
        ])
        .unwrap();

        let config = args.grouper_config().unwrap();
        assert_eq!(config.cluster.distance_threshold, 0.2);
        assert_eq!(config.threads, 3);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let args = CliArgs::parse_from(["layout-grouper", "--input", "pages", "--similarity-threshold", "2"]).unwrap();
        assert!(args.grouper_config().is_err());

        assert!(CliArgs::parse_from(["layout-grouper", "--input", "pages", "--timeout-secs", "0"]).is_err());
        assert!(CliArgs::parse_from(["layout-grouper", "--input", "pages", "--threads", "many"]).is_err());
    }
}
