use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ScfError {
    #[error("invalid survey year: {0}")]
    InvalidYear(String),

    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    #[error("invalid year range: {start}..{until}")]
    InvalidRange { start: u16, until: u16 },

    #[error("missing config file {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("SCF request failed: {0}")]
    ScfHttp(String),

    #[error("SCF archive returned status {status}: {message}")]
    ScfStatus { status: u16, message: String },

    #[error("archive contains no files: {0}")]
    EmptyArchive(PathBuf),

    #[error("data file not found: {0}")]
    #[diagnostic(help("run `scf-wg fetch-year <year>` to download it first"))]
    DataFileNotFound(PathBuf),

    #[error("unsupported Stata release: {0}")]
    UnsupportedDtaRelease(String),

    #[error("malformed Stata file: {0}")]
    DtaParse(String),

    #[error("column not found: {0}")]
    MissingColumn(String),

    #[error("column {column} is not {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },

    #[error("dataframe error: {0}")]
    Frame(String),

    #[error("no years to aggregate")]
    NoYears,

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("malformed overtime table: {0}")]
    OvertimeParse(String),

    #[error("Chart Studio credentials are not configured")]
    #[diagnostic(help("add chart.chart_studio.username and api_key to scf-wg.json"))]
    MissingCredentials,

    #[error("Chart Studio request failed: {0}")]
    ChartStudioHttp(String),

    #[error("Chart Studio returned status {status}: {message}")]
    ChartStudioStatus { status: u16, message: String },

    #[error("failed to open browser: {0}")]
    Browser(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
