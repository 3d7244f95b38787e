use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::info;

use crate::aggregate::{self, GroupStats, GroupSummary, Transforms};
use crate::chart::{self, ChartOptions};
use crate::domain::{FileType, Statistic, SurveyYear};
use crate::dta;
use crate::error::ScfError;
use crate::fs_util;
use crate::loader::{self, NET_WORTH, RACE};
use crate::overtime::{self, OvertimeOptions, OvertimeTable};
use crate::publish::{ChartPublisher, PublishOutcome};
use crate::report::{ReportEvent, ReportSink};
use crate::scf::{self, ScfClient};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct FetchedYear {
    pub year: SurveyYear,
    pub file_type: FileType,
    pub url: String,
    pub archive: PathBuf,
    pub files: Vec<PathBuf>,
}

impl FetchedYear {
    pub fn first_file(&self) -> Option<&Path> {
        self.files.first().map(PathBuf::as_path)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub years: BTreeMap<u16, BTreeMap<FileType, PathBuf>>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub variable: String,
    pub grouper: String,
    pub statistic: Statistic,
    pub transforms: Transforms,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            variable: NET_WORTH.to_string(),
            grouper: RACE.to_string(),
            statistic: Statistic::NonPositiveShare,
            transforms: Transforms::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub year: SurveyYear,
    pub variable: String,
    pub grouper: String,
    pub statistic: Statistic,
    pub groups: Vec<GroupStats>,
    pub overall_average: Option<f64>,
    pub values: GroupSummary,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OvertimeResult {
    pub path: PathBuf,
    pub table: OvertimeTable,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotResult {
    pub outcomes: Vec<PublishOutcome>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

fn phase(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

#[derive(Clone)]
pub struct App<C: ScfClient> {
    store: Store,
    client: C,
}

impl<C: ScfClient> App<C> {
    pub fn new(store: Store, client: C) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn download_archive(
        &self,
        url: &str,
        archive: &Utf8Path,
        target_dir: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<PathBuf>, ScfError> {
        fs_util::ensure_dir(target_dir.as_std_path())?;
        let staging_dir = archive.parent().unwrap_or(target_dir);
        fs_util::ensure_dir(staging_dir.as_std_path())?;
        let temp = tempfile::Builder::new()
            .prefix("scf-wg-download")
            .suffix(".zip")
            .tempfile_in(staging_dir.as_std_path())
            .map_err(|err| ScfError::Filesystem(err.to_string()))?;

        phase(sink, format!("phase=Fetch; GET {url}"));
        let start = Instant::now();
        self.client.download(url, temp.path())?;
        sink.event(ProgressEvent {
            message: "scf.response".to_string(),
            elapsed: Some(start.elapsed()),
        });

        temp.persist(archive.as_std_path())
            .map_err(|err| ScfError::Filesystem(err.to_string()))?;

        phase(sink, format!("phase=Extract; {archive}"));
        let files = fs_util::extract_zip(archive.as_std_path(), target_dir.as_std_path())?;
        info!(%archive, files = files.len(), "extracted");
        Ok(files)
    }

    pub fn fetch_year(
        &self,
        year: SurveyYear,
        file_type: FileType,
        sink: &dyn ProgressSink,
    ) -> Result<FetchedYear, ScfError> {
        phase(sink, format!("phase=Resolve; {year} {file_type}"));
        let year_dir = self.store.ensure_year_dir(year)?;
        let archive = self.store.archive_path(year, file_type);
        let url = scf::archive_url(year, file_type);
        let files = self.download_archive(&url, &archive, &year_dir, sink)?;
        Ok(FetchedYear {
            year,
            file_type,
            url,
            archive: archive.into_std_path_buf(),
            files,
        })
    }

    pub fn fetch_year_table(
        &self,
        year: SurveyYear,
        file_type: FileType,
        sink: &dyn ProgressSink,
    ) -> Result<DataFrame, ScfError> {
        let fetched = self.fetch_year(year, file_type, sink)?;
        let path = fetched
            .first_file()
            .ok_or_else(|| ScfError::EmptyArchive(fetched.archive.clone()))?;
        phase(sink, format!("phase=Load; {}", path.display()));
        dta::read_dta(path)
    }

    pub fn scrape(
        &self,
        start: SurveyYear,
        until: SurveyYear,
        file_types: &[FileType],
        sink: &dyn ProgressSink,
    ) -> Result<ScrapeResult, ScfError> {
        let years = SurveyYear::range(start, until)?;
        let total = years.len();
        let mut result = BTreeMap::new();
        for (index, year) in years.into_iter().enumerate() {
            phase(sink, format!("phase=Fetch; year {} of {total}", index + 1));
            let mut by_type = BTreeMap::new();
            for file_type in file_types {
                let fetched = self.fetch_year(year, *file_type, sink)?;
                let first = fetched
                    .first_file()
                    .ok_or_else(|| ScfError::EmptyArchive(fetched.archive.clone()))?;
                by_type.insert(*file_type, first.to_path_buf());
            }
            result.insert(year.value(), by_type);
        }
        Ok(ScrapeResult {
            years: result,
            generated_at: Utc::now(),
        })
    }

    pub fn summary(
        &self,
        year: SurveyYear,
        options: &SummaryOptions,
        report: &dyn ReportSink,
        sink: &dyn ProgressSink,
    ) -> Result<SummaryResult, ScfError> {
        phase(sink, format!("phase=Load; {year}"));
        let table = loader::load_year(&self.store, year, FileType::Summary)?;
        let table = options
            .transforms
            .apply(table, &options.variable, &options.grouper)?;

        phase(sink, format!("phase=Aggregate; {} by {}", options.variable, options.grouper));
        let groups = aggregate::group_stats(&table, &options.variable, &options.grouper)?;
        report.report(ReportEvent::Year(year));
        aggregate::report_groups(&groups, report);

        Ok(SummaryResult {
            year,
            variable: options.variable.clone(),
            grouper: options.grouper.clone(),
            statistic: options.statistic,
            values: groups.summary(options.statistic),
            overall_average: groups.overall_average,
            groups: groups.groups,
            generated_at: Utc::now(),
        })
    }

    pub fn overtime(
        &self,
        years: &[SurveyYear],
        options: &OvertimeOptions,
        output_dir: &Utf8Path,
        report: &dyn ReportSink,
        sink: &dyn ProgressSink,
    ) -> Result<OvertimeResult, ScfError> {
        let total = years.len();
        let table = overtime::calc_overtime(&self.store, years, options, report, |year, index| {
            phase(sink, format!("phase=Aggregate; {year} ({} of {total})", index + 1));
        })?;

        let path = overtime::output_path(output_dir.as_std_path(), &options.transforms);
        phase(sink, format!("phase=Write; {}", path.display()));
        table.write_csv(&path)?;
        info!(path = %path.display(), years = table.years().len(), "overtime table written");
        Ok(OvertimeResult {
            path,
            table,
            generated_at: Utc::now(),
        })
    }

    pub fn plot(
        &self,
        table: &OvertimeTable,
        options: &ChartOptions,
        publishers: &[&dyn ChartPublisher],
        sink: &dyn ProgressSink,
    ) -> Result<PlotResult, ScfError> {
        if table.is_empty() {
            return Err(ScfError::NoYears);
        }
        phase(sink, "phase=Plot; building chart");
        let chart = chart::build_chart(table, options);
        let mut outcomes = Vec::with_capacity(publishers.len());
        for publisher in publishers {
            outcomes.push(publisher.publish(&chart)?);
        }
        Ok(PlotResult {
            outcomes,
            generated_at: Utc::now(),
        })
    }
}
