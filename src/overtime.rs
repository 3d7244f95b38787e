use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::aggregate::{self, GroupSummary, Transforms};
use crate::domain::{FileType, Statistic, SurveyYear};
use crate::error::ScfError;
use crate::fs_util;
use crate::loader::{self, NET_WORTH, RACE};
use crate::report::{ReportEvent, ReportSink};
use crate::store::Store;

pub const YEAR_HEADER: &str = "year";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OvertimeTable {
    years: Vec<u16>,
    categories: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
}

impl OvertimeTable {
    pub fn new() -> Self {
        Self {
            years: Vec::new(),
            categories: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn insert(&mut self, year: u16, summary: &GroupSummary) {
        for category in summary.categories() {
            if !self.categories.iter().any(|known| known == category) {
                self.categories.push(category.to_string());
                for row in &mut self.values {
                    row.push(None);
                }
            }
        }
        let row = self
            .categories
            .iter()
            .map(|category| summary.get(category))
            .collect();
        match self.years.iter().position(|known| *known == year) {
            Some(index) => self.values[index] = row,
            None => {
                self.years.push(year);
                self.values.push(row);
            }
        }
    }

    pub fn years(&self) -> &[u16] {
        &self.years
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn get(&self, year: u16, category: &str) -> Option<f64> {
        let row = self.years.iter().position(|known| *known == year)?;
        let col = self.categories.iter().position(|known| known == category)?;
        self.values[row][col]
    }

    pub fn series(&self, category: &str) -> Vec<Option<f64>> {
        match self.categories.iter().position(|known| known == category) {
            Some(col) => self.values.iter().map(|row| row[col]).collect(),
            None => vec![None; self.years.len()],
        }
    }

    pub fn to_csv_string(&self) -> Result<String, ScfError> {
        let mut writer = csv::Writer::from_writer(vec![]);
        let mut header = vec![YEAR_HEADER.to_string()];
        header.extend(self.categories.iter().cloned());
        writer
            .write_record(&header)
            .map_err(|err| ScfError::Csv(err.to_string()))?;
        for (year, row) in self.years.iter().zip(&self.values) {
            let mut record = vec![year.to_string()];
            record.extend(row.iter().map(|value| match value {
                Some(value) => value.to_string(),
                None => String::new(),
            }));
            writer
                .write_record(&record)
                .map_err(|err| ScfError::Csv(err.to_string()))?;
        }
        let data = writer
            .into_inner()
            .map_err(|err| ScfError::Csv(err.to_string()))?;
        String::from_utf8(data).map_err(|err| ScfError::Csv(err.to_string()))
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), ScfError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs_util::ensure_dir(parent)?;
        }
        let text = self.to_csv_string()?;
        fs::write(path, text)
            .map_err(|err| ScfError::Filesystem(format!("write {}: {err}", path.display())))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ScfError> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|err| ScfError::Csv(err.to_string()))?
            .clone();
        let mut columns = headers.iter();
        if columns.next() != Some(YEAR_HEADER) {
            return Err(ScfError::OvertimeParse(format!(
                "first column must be {YEAR_HEADER}"
            )));
        }
        let categories: Vec<String> = columns.map(|name| name.to_string()).collect();

        let mut table = Self {
            years: Vec::new(),
            categories,
            values: Vec::new(),
        };
        for record in reader.records() {
            let record = record.map_err(|err| ScfError::Csv(err.to_string()))?;
            let mut fields = record.iter();
            let year = fields
                .next()
                .and_then(|value| value.trim().parse::<u16>().ok())
                .ok_or_else(|| ScfError::OvertimeParse(format!("bad year in {record:?}")))?;
            let row = fields
                .map(|value| {
                    let value = value.trim();
                    if value.is_empty() {
                        Ok(None)
                    } else {
                        value.parse::<f64>().map(Some).map_err(|_| {
                            ScfError::OvertimeParse(format!("bad value {value} for {year}"))
                        })
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            table.years.push(year);
            table.values.push(row);
        }
        Ok(table)
    }

    pub fn read_csv(path: &Path) -> Result<Self, ScfError> {
        let file = fs::File::open(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ScfError::DataFileNotFound(path.to_path_buf())
            } else {
                ScfError::Filesystem(format!("open {}: {err}", path.display()))
            }
        })?;
        Self::from_reader(file)
    }
}

impl Default for OvertimeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct OvertimeOptions {
    pub variable: String,
    pub grouper: String,
    pub statistic: Statistic,
    pub transforms: Transforms,
}

impl Default for OvertimeOptions {
    fn default() -> Self {
        Self {
            variable: NET_WORTH.to_string(),
            grouper: RACE.to_string(),
            statistic: Statistic::NonPositiveShare,
            transforms: Transforms::default(),
        }
    }
}

pub fn calc_overtime(
    store: &Store,
    years: &[SurveyYear],
    options: &OvertimeOptions,
    sink: &dyn ReportSink,
    mut on_year: impl FnMut(SurveyYear, usize),
) -> Result<OvertimeTable, ScfError> {
    if years.is_empty() {
        return Err(ScfError::NoYears);
    }
    let mut table = OvertimeTable::new();
    for (index, year) in years.iter().enumerate() {
        on_year(*year, index);
        let data = loader::load_year(store, *year, FileType::Summary)?;
        let data = options
            .transforms
            .apply(data, &options.variable, &options.grouper)?;
        sink.report(ReportEvent::Year(*year));
        let summary = aggregate::display_group_avgs(
            &data,
            &options.variable,
            &options.grouper,
            options.statistic,
            sink,
        )?;
        info!(%year, groups = summary.len(), "aggregated");
        table.insert(year.value(), &summary);
    }
    Ok(table)
}

pub fn output_path(output_dir: &Path, transforms: &Transforms) -> PathBuf {
    output_dir.join(format!("{}.csv", transforms.file_stem()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::GroupEntry;

    fn summary(entries: &[(&str, f64)]) -> GroupSummary {
        GroupSummary {
            entries: entries
                .iter()
                .map(|(category, value)| GroupEntry {
                    category: category.to_string(),
                    value: *value,
                })
                .collect(),
        }
    }

    fn sample() -> OvertimeTable {
        let mut table = OvertimeTable::new();
        table.insert(1992, &summary(&[("white", 12.5), ("Black", 31.0)]));
        table.insert(1995, &summary(&[("Black", 29.4), ("Hispanic", 30.1)]));
        table
    }

    #[test]
    fn late_categories_backfill_with_missing() {
        let table = sample();
        assert_eq!(table.categories(), &["white", "Black", "Hispanic"]);
        assert_eq!(table.get(1992, "Hispanic"), None);
        assert_eq!(table.series("white"), vec![Some(12.5), None]);
    }

    #[test]
    fn csv_roundtrip() {
        let table = sample();
        let text = table.to_csv_string().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "year,white,Black,Hispanic");
        assert_eq!(lines[1], "1992,12.5,31,");
        let back = OvertimeTable::from_reader(text.as_bytes()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn rejects_missing_year_header() {
        let err = OvertimeTable::from_reader("race,1992\nwhite,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ScfError::OvertimeParse(_)));
    }

    #[test]
    fn output_names() {
        let dir = Path::new("negative_wealth");
        assert_eq!(
            output_path(dir, &Transforms::new(true, true)),
            dir.join("pct_neg_wealth_vehics_removed_blackhisp_grouped.csv")
        );
    }
}
