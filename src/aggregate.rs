use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{BLACK_HISPANIC_LABEL, Race, Statistic};
use crate::error::ScfError;
use crate::frame::{frame_error, numeric, text};
use crate::loader::{VEHICLES, WEIGHT};
use crate::report::{ReportEvent, ReportSink};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub category: String,
    pub rows: usize,
    pub total_weight: f64,
    pub weighted_average: f64,
    pub non_positive_weight: f64,
    pub non_positive_share: f64,
}

impl GroupStats {
    pub fn statistic(&self, statistic: Statistic) -> f64 {
        match statistic {
            Statistic::NonPositiveShare => self.non_positive_share,
            Statistic::WeightedAverage => self.weighted_average,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub variable: String,
    pub grouper: String,
    pub groups: Vec<GroupStats>,
    pub overall_average: Option<f64>,
}

impl GroupReport {
    pub fn summary(&self, statistic: Statistic) -> GroupSummary {
        GroupSummary {
            entries: self
                .groups
                .iter()
                .map(|group| GroupEntry {
                    category: group.category.clone(),
                    value: group.statistic(statistic),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEntry {
    pub category: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupSummary {
    pub entries: Vec<GroupEntry>,
}

impl GroupSummary {
    pub fn get(&self, category: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| entry.category == category)
            .map(|entry| entry.value)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.category.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const CATEGORY: &str = "category";
const ROWS: &str = "rows";
const TOTAL_WEIGHT: &str = "total_weight";
const WEIGHTED_SUM: &str = "weighted_sum";
const NON_POSITIVE_WEIGHT: &str = "non_positive_weight";

/// Weighted statistics of `variable` for every non-null value of `grouper`,
/// ordered by descending row count and then by label.
///
/// A row with a weight counts toward its group's total weight even when its
/// value is missing. Groups with no weight are dropped.
pub fn group_stats(
    df: &DataFrame,
    variable: &str,
    grouper: &str,
) -> Result<GroupReport, ScfError> {
    let value = col(variable);
    let weight = col(WEIGHT);

    let grouped = df
        .clone()
        .lazy()
        .filter(col(grouper).is_not_null())
        .group_by([col(grouper).cast(DataType::String).alias(CATEGORY)])
        .agg([
            len().cast(DataType::UInt64).alias(ROWS),
            weight.clone().sum().alias(TOTAL_WEIGHT),
            (weight.clone() * value.clone()).sum().alias(WEIGHTED_SUM),
            weight
                .clone()
                .filter(value.clone().lt_eq(lit(0.0)))
                .sum()
                .alias(NON_POSITIVE_WEIGHT),
        ])
        .sort(
            [ROWS, CATEGORY],
            SortMultipleOptions::default()
                .with_order_descending_multi([true, false])
                .with_maintain_order(true),
        )
        .collect()
        .map_err(frame_error)?;

    let categories = text(&grouped, CATEGORY)?;
    let rows = grouped
        .column(ROWS)
        .and_then(|column| column.u64().cloned())
        .map_err(frame_error)?;
    let totals = numeric(&grouped, TOTAL_WEIGHT)?;
    let sums = numeric(&grouped, WEIGHTED_SUM)?;
    let non_positive = numeric(&grouped, NON_POSITIVE_WEIGHT)?;

    let mut stats = Vec::with_capacity(grouped.height());
    for (index, category) in categories.into_iter().enumerate() {
        let Some(category) = category else {
            continue;
        };
        let total_weight = totals[index].unwrap_or(0.0);
        if total_weight <= 0.0 {
            warn!(%category, "group has no weight, skipped");
            continue;
        }
        let non_positive_weight = non_positive[index].unwrap_or(0.0);
        stats.push(GroupStats {
            category,
            rows: rows.get(index).unwrap_or(0) as usize,
            total_weight,
            weighted_average: sums[index].unwrap_or(0.0) / total_weight,
            non_positive_weight,
            non_positive_share: round_one(100.0 * non_positive_weight / total_weight),
        });
    }

    let overall = df
        .clone()
        .lazy()
        .select([
            (weight.clone() * value).sum().alias(WEIGHTED_SUM),
            weight.sum().alias(TOTAL_WEIGHT),
        ])
        .collect()
        .map_err(frame_error)?;
    let overall_average = match (
        numeric(&overall, WEIGHTED_SUM)?.first().copied().flatten(),
        numeric(&overall, TOTAL_WEIGHT)?.first().copied().flatten(),
    ) {
        (Some(sum), Some(total)) if total > 0.0 => Some(sum / total),
        _ => None,
    };

    debug!(variable, grouper, groups = stats.len(), "grouped");
    Ok(GroupReport {
        variable: variable.to_string(),
        grouper: grouper.to_string(),
        groups: stats,
        overall_average,
    })
}

pub fn display_group_avgs(
    df: &DataFrame,
    variable: &str,
    grouper: &str,
    statistic: Statistic,
    sink: &dyn ReportSink,
) -> Result<GroupSummary, ScfError> {
    let report = group_stats(df, variable, grouper)?;
    report_groups(&report, sink);
    Ok(report.summary(statistic))
}

pub fn report_groups(report: &GroupReport, sink: &dyn ReportSink) {
    let variable = report.variable.as_str();
    for stats in &report.groups {
        sink.report(ReportEvent::Group { variable, stats });
    }
    if let Some(average) = report.overall_average {
        sink.report(ReportEvent::Total { variable, average });
    }
}

fn round_one(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMerge {
    pub labels: Vec<String>,
    pub into: String,
}

impl LabelMerge {
    pub fn black_hispanic() -> Self {
        Self {
            labels: vec![Race::Hispanic.label().to_string(), Race::Black.label().to_string()],
            into: BLACK_HISPANIC_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transforms {
    pub subtract: Option<String>,
    pub merge: Option<LabelMerge>,
}

impl Transforms {
    pub fn new(subtract_vehicles: bool, group_black_hispanic: bool) -> Self {
        Self {
            subtract: subtract_vehicles.then(|| VEHICLES.to_string()),
            merge: group_black_hispanic.then(LabelMerge::black_hispanic),
        }
    }

    pub fn apply(
        &self,
        df: DataFrame,
        variable: &str,
        grouper: &str,
    ) -> Result<DataFrame, ScfError> {
        let mut frame = df.lazy();
        if let Some(column) = &self.subtract {
            frame = frame.with_columns([
                col(variable).alias(preserved_column(variable, column)),
                (col(variable) - col(column.as_str())).alias(variable),
            ]);
        }
        if let Some(merge) = &self.merge {
            let matches = merge
                .labels
                .iter()
                .map(|label| col(grouper).eq(lit(label.as_str())))
                .reduce(|left, right| left.or(right));
            if let Some(matches) = matches {
                frame = frame.with_column(
                    when(matches)
                        .then(lit(merge.into.as_str()))
                        .otherwise(col(grouper))
                        .alias(grouper),
                );
            }
        }
        frame.collect().map_err(frame_error)
    }

    pub fn file_stem(&self) -> String {
        let mut stem = String::from("pct_neg_wealth");
        match self.subtract.as_deref() {
            Some(VEHICLES) => stem.push_str("_vehics_removed"),
            Some(other) => stem.push_str(&format!("_{}_removed", slug(other))),
            None => {}
        }
        match &self.merge {
            Some(merge) if *merge == LabelMerge::black_hispanic() => {
                stem.push_str("_blackhisp_grouped")
            }
            Some(merge) => stem.push_str(&format!("_{}_grouped", slug(&merge.into))),
            None => {}
        }
        stem
    }
}

pub fn preserved_column(variable: &str, removed: &str) -> String {
    format!("{variable}_with_{removed}")
}

fn slug(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::loader::{NET_WORTH, RACE};
    use crate::report::NullReport;

    fn frame(rows: &[(&str, f64, f64)]) -> DataFrame {
        let races: Vec<&str> = rows.iter().map(|(race, _, _)| *race).collect();
        let weights: Vec<f64> = rows.iter().map(|(_, w, _)| *w).collect();
        let values: Vec<f64> = rows.iter().map(|(_, _, v)| *v).collect();
        DataFrame::new(vec![
            Column::new(RACE.into(), races),
            Column::new(WEIGHT.into(), weights),
            Column::new(NET_WORTH.into(), values),
        ])
        .unwrap()
    }

    fn with_column(df: DataFrame, column: Column) -> DataFrame {
        let mut df = df;
        df.with_column(column).unwrap();
        df
    }

    #[test]
    fn equal_weight_groups_average_to_mean_of_means() {
        let df = frame(&[("a", 1.0, 10.0), ("a", 1.0, 30.0), ("b", 1.0, 100.0), ("b", 1.0, 0.0)]);
        let report = group_stats(&df, NET_WORTH, RACE).unwrap();
        let a = report.summary(Statistic::WeightedAverage).get("a").unwrap();
        let b = report.summary(Statistic::WeightedAverage).get("b").unwrap();
        assert_eq!(a, 20.0);
        assert_eq!(b, 50.0);
        assert_eq!(report.overall_average, Some((a + b) / 2.0));
    }

    #[test]
    fn half_weight_non_positive_is_fifty_percent() {
        let df = frame(&[("a", 3.0, -5.0), ("a", 1.0, 0.0), ("a", 4.0, 12.0)]);
        let summary = display_group_avgs(&df, NET_WORTH, RACE, Statistic::default(), &NullReport)
            .unwrap();
        assert_eq!(summary.get("a"), Some(50.0));
    }

    #[test]
    fn share_rounds_to_one_decimal() {
        let df = frame(&[("a", 1.0, -1.0), ("a", 2.0, 1.0)]);
        let summary = group_stats(&df, NET_WORTH, RACE)
            .unwrap()
            .summary(Statistic::NonPositiveShare);
        assert_eq!(summary.get("a"), Some(33.3));
    }

    #[test]
    fn rounding_ties_go_to_even() {
        assert_eq!(round_one(0.25), 0.2);
        assert_eq!(round_one(0.75), 0.8);
        assert_eq!(round_one(62.5), 62.5);
    }

    #[test]
    fn missing_value_still_counts_toward_group_weight() {
        let df = with_column(
            frame(&[("a", 1.0, 0.0), ("a", 1.0, 0.0), ("a", 2.0, 0.0)]),
            Column::new(NET_WORTH.into(), &[Some(-1.0), Some(3.0), None]),
        );
        let report = group_stats(&df, NET_WORTH, RACE).unwrap();
        let group = &report.groups[0];
        assert_eq!(group.total_weight, 4.0);
        assert_eq!(group.non_positive_share, 25.0);
        assert_eq!(group.weighted_average, 0.5);
    }

    #[test]
    fn missing_categories_are_excluded() {
        let df = with_column(
            frame(&[("a", 1.0, 1.0), ("b", 1.0, 1.0)]),
            Column::new(RACE.into(), &[Some("a"), None]),
        );
        let report = group_stats(&df, NET_WORTH, RACE).unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.overall_average, Some(1.0));
    }

    #[test]
    fn groups_ordered_by_row_count() {
        let df = frame(&[("b", 1.0, 1.0), ("a", 1.0, 1.0), ("a", 1.0, 1.0), ("c", 1.0, 1.0)]);
        let report = group_stats(&df, NET_WORTH, RACE).unwrap();
        let order: Vec<_> = report.groups.iter().map(|g| g.category.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(report.groups[0].rows, 2);
    }

    #[test]
    fn unknown_variable_is_missing_column() {
        let df = frame(&[("a", 1.0, 1.0)]);
        let err = group_stats(&df, "income", RACE).unwrap_err();
        assert_matches!(err, ScfError::MissingColumn(_));
    }

    #[test]
    fn subtract_keeps_original_column() {
        let df = with_column(
            frame(&[("a", 1.0, 100.0), ("a", 1.0, 10.0)]),
            Column::new(VEHICLES.into(), &[20.0, 15.0]),
        );
        let df = Transforms::new(true, false).apply(df, NET_WORTH, RACE).unwrap();
        assert_eq!(numeric(&df, NET_WORTH).unwrap(), vec![Some(80.0), Some(-5.0)]);
        assert_eq!(
            numeric(&df, "networth_with_vehic").unwrap(),
            vec![Some(100.0), Some(10.0)]
        );
    }

    #[test]
    fn merge_equals_union() {
        let rows = [
            (Race::Hispanic.label(), 2.0, -1.0),
            (Race::Black.label(), 1.0, 5.0),
            (Race::Black.label(), 3.0, 0.0),
            (Race::WhiteNonHispanic.label(), 4.0, 9.0),
        ];
        let merged = Transforms::new(false, true)
            .apply(frame(&rows), NET_WORTH, RACE)
            .unwrap();
        let merged = group_stats(&merged, NET_WORTH, RACE).unwrap();

        let union: Vec<_> = rows
            .iter()
            .filter(|(race, _, _)| *race != Race::WhiteNonHispanic.label())
            .map(|(_, w, v)| (BLACK_HISPANIC_LABEL, *w, *v))
            .collect();
        let direct = group_stats(&frame(&union), NET_WORTH, RACE).unwrap();

        let combined = merged
            .groups
            .iter()
            .find(|g| g.category == BLACK_HISPANIC_LABEL)
            .unwrap();
        assert_eq!(combined, &direct.groups[0]);
        assert_eq!(merged.groups.len(), 2);
    }

    #[test]
    fn transforms_compose() {
        let df = with_column(
            frame(&[(Race::Hispanic.label(), 1.0, 10.0), (Race::Black.label(), 1.0, 10.0)]),
            Column::new(VEHICLES.into(), &[10.0, 5.0]),
        );
        let df = Transforms::new(true, true).apply(df, NET_WORTH, RACE).unwrap();
        let summary = group_stats(&df, NET_WORTH, RACE)
            .unwrap()
            .summary(Statistic::NonPositiveShare);
        assert_eq!(summary.get(BLACK_HISPANIC_LABEL), Some(50.0));
    }

    #[test]
    fn file_stems() {
        assert_eq!(Transforms::default().file_stem(), "pct_neg_wealth");
        assert_eq!(
            Transforms::new(true, false).file_stem(),
            "pct_neg_wealth_vehics_removed"
        );
        assert_eq!(
            Transforms::new(false, true).file_stem(),
            "pct_neg_wealth_blackhisp_grouped"
        );
        assert_eq!(
            Transforms::new(true, true).file_stem(),
            "pct_neg_wealth_vehics_removed_blackhisp_grouped"
        );
    }
}
