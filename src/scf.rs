use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};

use crate::domain::{FileType, SURVEY_CADENCE, SurveyYear};
use crate::error::ScfError;

pub const SCF_FILES_URL: &str = "https://www.federalreserve.gov/econres/files";

/// Remote archive for a survey year.
///
/// Summary extracts carry a `p` prefix; off-cadence years carry a `p` panel
/// suffix.
pub fn archive_url(year: SurveyYear, file_type: FileType) -> String {
    let panel = if year.value() % SURVEY_CADENCE != 0 {
        "p"
    } else {
        ""
    };
    format!(
        "{SCF_FILES_URL}/scf{}{}{}s.zip",
        file_type.url_flag(),
        year,
        panel
    )
}

pub trait ScfClient: Send + Sync {
    fn download(&self, url: &str, destination: &Path) -> Result<(), ScfError>;
}

#[derive(Clone)]
pub struct ScfHttpClient {
    client: Client,
}

impl ScfHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, ScfError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("scf-wealth-gap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ScfError::ScfHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| ScfError::ScfHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ScfError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .status()
            .canonical_reason()
            .unwrap_or("SCF request failed")
            .to_string();
        Err(ScfError::ScfStatus { status, message })
    }
}

impl ScfClient for ScfHttpClient {
    fn download(&self, url: &str, destination: &Path) -> Result<(), ScfError> {
        info!(url, "downloading");
        let start = std::time::Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ScfError::ScfHttp(err.to_string()))?;
        let mut response = Self::handle_status(response)?;
        let mut file =
            File::create(destination).map_err(|err| ScfError::Filesystem(err.to_string()))?;
        let bytes = std::io::copy(&mut response, &mut file)
            .map_err(|err| ScfError::ScfHttp(err.to_string()))?;
        debug!(
            url,
            bytes,
            latency_ms = start.elapsed().as_millis() as u64,
            "download complete"
        );
        Ok(())
    }
}
