use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::chart::default_labels;
use crate::domain::{FIRST_SURVEY_YEAR, FileType, SurveyYear};
use crate::error::ScfError;
use crate::publish::ChartStudioCredentials;

pub const DEFAULT_CONFIG_FILE: &str = "scf-wg.json";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_OUTPUT_DIR: &str = "negative_wealth";
pub const DEFAULT_SCRAPE_UNTIL: u16 = 2019;
pub const DEFAULT_OVERTIME_START: u16 = 1992;
pub const DEFAULT_OVERTIME_UNTIL: u16 = 2020;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CHART_FILENAME: &str = "neg_wealth_gap";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub start: Option<u16>,
    #[serde(default)]
    pub until: Option<u16>,
    #[serde(default)]
    pub filetypes: Option<Vec<FileType>>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub chart: Option<ChartConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ChartConfig {
    #[serde(default)]
    pub html_path: Option<String>,
    #[serde(default)]
    pub open_browser: Option<bool>,
    #[serde(default)]
    pub chart_studio: Option<ChartStudioConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ChartStudioConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub start: SurveyYear,
    pub until: SurveyYear,
    pub filetypes: Vec<FileType>,
    pub timeout: Duration,
    pub labels: BTreeMap<String, String>,
    pub chart: ResolvedChartConfig,
}

#[derive(Debug, Clone)]
pub struct ResolvedChartConfig {
    pub html_path: Utf8PathBuf,
    pub open_browser: bool,
    pub credentials: Option<ChartStudioCredentials>,
    pub filename: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; without one, `scf-wg.json` in the working
    /// directory is used when present and defaults otherwise.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ScfError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(ScfError::MissingConfig(config_path));
            }
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ScfError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ScfError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ScfError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let output_dir =
            Utf8PathBuf::from(config.output_dir.unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()));

        let start = SurveyYear::new(config.start.unwrap_or(FIRST_SURVEY_YEAR))?;
        let until = SurveyYear::new(config.until.unwrap_or(DEFAULT_SCRAPE_UNTIL))?;
        if until < start {
            return Err(ScfError::InvalidRange {
                start: start.value(),
                until: until.value(),
            });
        }

        let filetypes = match config.filetypes {
            Some(filetypes) if !filetypes.is_empty() => filetypes,
            _ => vec![FileType::Summary],
        };

        let mut labels = default_labels();
        labels.extend(config.labels.unwrap_or_default());

        let chart = config.chart.unwrap_or_default();
        let studio = chart.chart_studio.unwrap_or_default();
        let credentials = match (studio.username, studio.api_key) {
            (Some(username), Some(api_key)) => Some(ChartStudioCredentials { username, api_key }),
            _ => None,
        };
        let chart = ResolvedChartConfig {
            html_path: chart
                .html_path
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| output_dir.join(format!("{DEFAULT_CHART_FILENAME}.html"))),
            open_browser: chart.open_browser.unwrap_or(false),
            credentials,
            filename: studio
                .filename
                .unwrap_or_else(|| DEFAULT_CHART_FILENAME.to_string()),
        };

        Ok(ResolvedConfig {
            schema_version,
            data_dir: Utf8PathBuf::from(
                config.data_dir.unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            output_dir,
            start,
            until,
            filetypes,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            labels,
            chart,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.data_dir, Utf8PathBuf::from("data"));
        assert_eq!(resolved.start.value(), 1989);
        assert_eq!(resolved.until.value(), 2019);
        assert_eq!(resolved.filetypes, vec![FileType::Summary]);
        assert_eq!(resolved.timeout, Duration::from_secs(300));
        assert_eq!(
            resolved.chart.html_path,
            Utf8PathBuf::from("negative_wealth/neg_wealth_gap.html")
        );
        assert!(resolved.chart.credentials.is_none());
    }

    #[test]
    fn labels_extend_defaults() {
        let config = Config {
            labels: Some(BTreeMap::from([("Hispanic".to_string(), "Latino".to_string())])),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.labels["Hispanic"], "Latino");
        assert_eq!(resolved.labels["black/African-American"], "Black");
    }

    #[test]
    fn rejects_inverted_range() {
        let config = Config {
            start: Some(2019),
            until: Some(1992),
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::resolve_config(config),
            Err(ScfError::InvalidRange { .. })
        ));
    }
}
