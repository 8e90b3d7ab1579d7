use crate::design_storm::IntensityScaling;
use crate::error::{AppError, Result};
use crate::output::OutputFormat;
use crate::parser::DEFAULT_FAILURE_THRESHOLD;
use crate::pipeline::PipelineOptions;
use crate::stats::{Distribution, MIN_ANNUAL_MAXIMA};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub directory: String,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
}

fn default_patterns() -> Vec<String> {
    vec![
        "dados_{station}_*.csv".to_string(),
        "{station}*.csv".to_string(),
    ]
}

fn default_failure_threshold() -> f64 {
    DEFAULT_FAILURE_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_distribution")]
    pub distribution: String,
    #[serde(
        default = "default_min_annual_maxima",
        deserialize_with = "deserialize_count"
    )]
    pub min_annual_maxima: usize,
    #[serde(default = "default_intensity_scaling")]
    pub intensity_scaling: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            distribution: default_distribution(),
            min_annual_maxima: default_min_annual_maxima(),
            intensity_scaling: default_intensity_scaling(),
        }
    }
}

fn default_intensity_scaling() -> String {
    "tabulated".to_string()
}

fn default_distribution() -> String {
    "genextreme".to_string()
}

fn default_min_annual_maxima() -> usize {
    MIN_ANNUAL_MAXIMA
}

/// Custom deserializer that handles a count as both number and string
///
/// Accepts:
/// - `min_annual_maxima: 5` (number)
/// - `min_annual_maxima: "5"` (string that parses to number)
/// - `min_annual_maxima: ${MIN_MAXIMA}` (env var substituted to either)
fn deserialize_count<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CountValue {
        Number(usize),
        String(String),
    }

    match CountValue::deserialize(deserializer)? {
        CountValue::Number(n) => Ok(n),
        CountValue::String(s) => s
            .parse::<usize>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid count: '{}'", s))),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,
    #[serde(default = "default_output_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            format: default_output_format(),
        }
    }
}

fn default_output_directory() -> String {
    "output".to_string()
}

fn default_output_format() -> String {
    "csv".to_string()
}

impl DataConfig {
    /// Finds the export for a station code using the configured glob patterns.
    /// The first pattern with a match wins; within a pattern, the
    /// lexicographically first path is used.
    pub fn find_station_file(&self, station: &str) -> Result<PathBuf> {
        let base = Path::new(&self.directory);

        for pattern in &self.patterns {
            let full = base.join(pattern.replace("{station}", station));
            let full = full.to_string_lossy();
            let paths = glob::glob(&full)
                .map_err(|e| AppError::Config(format!("Invalid pattern '{}': {}", pattern, e)))?;

            let mut matches: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
            matches.sort();
            if let Some(first) = matches.into_iter().next() {
                tracing::debug!("Station {} resolved to {}", station, first.display());
                return Ok(first);
            }
        }

        Err(AppError::MissingData(format!(
            "No data file for station '{}' in {}",
            station, self.directory
        )))
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        // Substitute environment variables
        let expanded = expand_env_vars(&content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions> {
        Ok(PipelineOptions {
            distribution: self.analysis.distribution.parse::<Distribution>()?,
            min_annual_maxima: self.analysis.min_annual_maxima,
            failure_threshold: self.data.failure_threshold,
            intensity_scaling: self.analysis.intensity_scaling.parse::<IntensityScaling>()?,
        })
    }

    pub fn output_format(&self) -> Result<OutputFormat> {
        self.output.format.parse()
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Unexpanded environment variables
    /// - Non-empty directories and patterns
    /// - Failure threshold within [0, 1]
    /// - A usable minimum sample size
    /// - Known distribution, intensity scaling and output format
    fn validate(&self) -> Result<()> {
        let fields_to_check = [
            ("data.directory", &self.data.directory),
            ("output.directory", &self.output.directory),
            ("analysis.distribution", &self.analysis.distribution),
            ("analysis.intensity_scaling", &self.analysis.intensity_scaling),
        ];

        for (field_name, value) in &fields_to_check {
            if value.contains("${") {
                return Err(AppError::Config(format!(
                    "{} contains an unexpanded environment variable. \
                     Please set it or create a .env file.",
                    field_name
                )));
            }
        }

        if self.data.directory.is_empty() {
            return Err(AppError::Config(
                "Data directory cannot be empty".to_string(),
            ));
        }

        if self.data.patterns.is_empty() {
            return Err(AppError::Config(
                "At least one station file pattern is required".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.data.failure_threshold) {
            return Err(AppError::Config(format!(
                "failure_threshold {} must be between 0 and 1",
                self.data.failure_threshold
            )));
        }

        if self.analysis.min_annual_maxima < MIN_ANNUAL_MAXIMA {
            return Err(AppError::Config(format!(
                "min_annual_maxima must be at least {}, got {}",
                MIN_ANNUAL_MAXIMA, self.analysis.min_annual_maxima
            )));
        }

        self.analysis
            .distribution
            .parse::<Distribution>()
            .map_err(|e| AppError::Config(e.to_string()))?;

        self.analysis.intensity_scaling.parse::<IntensityScaling>()?;

        self.output_format()?;

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| AppError::Config(format!("Invalid substitution pattern: {}", e)))?;

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, yaml: &str) -> PathBuf {
        let path = dir.join("config.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn test_defaults_applied() {
        let yaml = r#"
data:
  directory: ./data
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.analysis.distribution, "genextreme");
        assert_eq!(config.analysis.min_annual_maxima, 3);
        assert_eq!(config.output.format, "csv");
        assert_eq!(config.data.patterns.len(), 2);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.pipeline_options().unwrap().intensity_scaling,
            IntensityScaling::Tabulated
        );
    }

    #[test]
    fn test_intensity_scaling_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "data:\n  directory: ./data\nanalysis:\n  intensity_scaling: per_hour\n",
        );
        let config = Config::load(path).unwrap();
        assert_eq!(
            config.pipeline_options().unwrap().intensity_scaling,
            IntensityScaling::PerHour
        );

        let path = write_config(
            dir.path(),
            "data:\n  directory: ./data\nanalysis:\n  intensity_scaling: minutes\n",
        );
        assert!(matches!(Config::load(path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_count_deserialize_from_string() {
        let yaml = r#"
distribution: gumbel_r
min_annual_maxima: "12"
"#;
        let analysis: AnalysisConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(analysis.min_annual_maxima, 12);
    }

    #[test]
    fn test_count_deserialize_invalid_string() {
        let yaml = r#"
min_annual_maxima: "many"
"#;
        let result: std::result::Result<AnalysisConfig, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_unsupported_distribution_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "data:\n  directory: ./data\nanalysis:\n  distribution: weibull_min\n",
        );
        let result = Config::load(path);
        match result {
            Err(AppError::Config(msg)) => assert!(msg.contains("weibull_min")),
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[test]
    fn test_min_annual_maxima_floor() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "data:\n  directory: ./data\nanalysis:\n  min_annual_maxima: 2\n",
        );
        assert!(matches!(Config::load(path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_missing_env_var_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "data:\n  directory: ${RAINFALL_IDF_TEST_UNSET_DIR}\n",
        );
        match Config::load(path) {
            Err(AppError::Config(msg)) => assert!(msg.contains("RAINFALL_IDF_TEST_UNSET_DIR")),
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[test]
    fn test_find_station_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dados_A001_D_2000-01-01_2020-12-31.csv"), "").unwrap();
        std::fs::write(dir.path().join("dados_A002_D_2000-01-01_2020-12-31.csv"), "").unwrap();

        let data = DataConfig {
            directory: dir.path().to_string_lossy().to_string(),
            patterns: default_patterns(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        };

        let found = data.find_station_file("A002").unwrap();
        assert!(found.ends_with("dados_A002_D_2000-01-01_2020-12-31.csv"));
        assert!(matches!(
            data.find_station_file("B999"),
            Err(AppError::MissingData(_))
        ));
    }
}
