use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::chart::Chart;
use crate::error::ScfError;
use crate::fs_util;

pub const CHART_STUDIO_URL: &str = "https://api.plot.ly/v2/plots";
const CLIENT_PLATFORM: &str = "rust";
const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishOutcome {
    Html { path: PathBuf, opened: bool },
    ChartStudio { url: String },
}

pub trait ChartPublisher {
    fn publish(&self, chart: &Chart) -> Result<PublishOutcome, ScfError>;
}

pub struct HtmlPublisher {
    pub path: PathBuf,
    pub open_browser: bool,
}

impl HtmlPublisher {
    pub fn new(path: impl Into<PathBuf>, open_browser: bool) -> Self {
        Self {
            path: path.into(),
            open_browser,
        }
    }
}

impl ChartPublisher for HtmlPublisher {
    fn publish(&self, chart: &Chart) -> Result<PublishOutcome, ScfError> {
        let page = render_html(chart)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_util::ensure_dir(parent)?;
        }
        fs::write(&self.path, page).map_err(|err| {
            ScfError::Filesystem(format!("write {}: {err}", self.path.display()))
        })?;
        info!(path = %self.path.display(), "chart written");

        let opened = self.open_browser && open_in_browser(&self.path).is_ok();
        Ok(PublishOutcome::Html {
            path: self.path.clone(),
            opened,
        })
    }
}

pub fn render_html(chart: &Chart) -> Result<String, ScfError> {
    let figure = serde_json::to_string(chart)
        .map_err(|err| ScfError::Filesystem(format!("serialize chart: {err}")))?
        .replace("</", "<\\/");
    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="{PLOTLY_CDN}"></script>
</head>
<body>
<div id="chart" style="width:900px;height:600px;"></div>
<script>
const figure = {figure};
Plotly.newPlot("chart", figure.data, figure.layout);
</script>
</body>
</html>
"#,
        title = escape_html(chart.title().unwrap_or("chart")),
    ))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn open_in_browser(path: &Path) -> Result<(), ScfError> {
    let target = path.as_os_str();
    let status = if cfg!(target_os = "macos") {
        Command::new("open").arg(target).status()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", ""]).arg(target).status()
    } else {
        Command::new("xdg-open").arg(target).status()
    };
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => {
            warn!(%status, "browser launcher failed");
            Err(ScfError::Browser(status.to_string()))
        }
        Err(err) => {
            warn!(error = %err, "browser launcher unavailable");
            Err(ScfError::Browser(err.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChartStudioCredentials {
    pub username: String,
    pub api_key: String,
}

pub struct ChartStudioPublisher {
    client: Client,
    endpoint: String,
    credentials: ChartStudioCredentials,
    filename: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPlot {
    file: PlotFile,
}

#[derive(Debug, Deserialize)]
struct PlotFile {
    web_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrors {
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl ChartStudioPublisher {
    pub fn new(
        credentials: Option<ChartStudioCredentials>,
        filename: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ScfError> {
        let credentials = credentials
            .filter(|c| !c.username.is_empty() && !c.api_key.is_empty())
            .ok_or(ScfError::MissingCredentials)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ScfError::ChartStudioHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: CHART_STUDIO_URL.to_string(),
            credentials,
            filename: filename.into(),
        })
    }

    fn payload(&self, chart: &Chart) -> Value {
        json!({
            "filename": self.filename,
            "world_readable": true,
            "figure": { "data": chart.data, "layout": chart.layout },
        })
    }
}

impl ChartPublisher for ChartStudioPublisher {
    fn publish(&self, chart: &Chart) -> Result<PublishOutcome, ScfError> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.credentials.username, Some(&self.credentials.api_key))
            .header("Plotly-Client-Platform", CLIENT_PLATFORM)
            .json(&self.payload(chart))
            .send()
            .map_err(|err| ScfError::ChartStudioHttp(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let fallback = status
                .canonical_reason()
                .unwrap_or("Chart Studio request failed")
                .to_string();
            let body: ApiErrors = response.json().unwrap_or_default();
            let message = body
                .errors
                .into_iter()
                .map(|error| error.message)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(status = status.as_u16(), %message, "Chart Studio rejected upload");
            return Err(ScfError::ChartStudioStatus {
                status: status.as_u16(),
                message: if message.is_empty() { fallback } else { message },
            });
        }
        let created: CreatedPlot = response
            .json()
            .map_err(|err| ScfError::ChartStudioHttp(err.to_string()))?;
        info!(url = %created.file.web_url, "chart uploaded");
        Ok(PublishOutcome::ChartStudio {
            url: created.file.web_url,
        })
    }
}
