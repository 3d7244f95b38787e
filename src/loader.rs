use polars::prelude::*;
use tracing::{debug, warn};

use crate::domain::{FileType, IMPLICATES, Race, SurveyYear};
use crate::dta;
use crate::error::ScfError;
use crate::frame::{frame_error, has_column};
use crate::store::Store;

pub const HOUSEHOLD_ID: &str = "household_id";
pub const IMPUTED_HH_ID: &str = "imputed_hh_id";
pub const IMPLICATE: &str = "implicate";
pub const RACE: &str = "race";
pub const RACE_CODE: &str = "race_code";
pub const WEIGHT: &str = "wgt";
pub const HH_WEIGHT: &str = "hh_wgt";
pub const NET_WORTH: &str = "networth";
pub const VEHICLES: &str = "vehic";

const RENAMES: [(&str, &str); 2] = [("yy1", HOUSEHOLD_ID), ("y1", IMPUTED_HH_ID)];

pub fn load_year(
    store: &Store,
    year: SurveyYear,
    file_type: FileType,
) -> Result<DataFrame, ScfError> {
    let path = store.data_file_path(year);
    if !path.as_std_path().exists() {
        return Err(ScfError::DataFileNotFound(path.into_std_path_buf()));
    }
    let df = dta::read_dta(path.as_std_path())?;
    debug!(%year, rows = df.height(), columns = df.width(), "loaded");
    match file_type {
        FileType::Raw => Ok(df),
        FileType::Summary => prepare_summary(df),
    }
}

pub fn prepare_summary(mut df: DataFrame) -> Result<DataFrame, ScfError> {
    for (from, to) in RENAMES {
        if has_column(&df, from) {
            df.rename(from, to.into()).map_err(frame_error)?;
        }
    }
    // polars 0.46 `rename` leaves a stale cached schema behind.
    df.clear_schema();

    let df = df
        .lazy()
        .with_columns([
            col(RACE).alias(RACE_CODE),
            race_labels(col(RACE)).alias(RACE),
            (col(IMPUTED_HH_ID) - col(HOUSEHOLD_ID) * lit(10.0)).alias(IMPLICATE),
            (col(WEIGHT) * lit(f64::from(IMPLICATES))).alias(HH_WEIGHT),
        ])
        .collect()
        .map_err(frame_error)?;

    let missing_labels = df.column(RACE).map_err(frame_error)?.null_count();
    let missing_codes = df.column(RACE_CODE).map_err(frame_error)?.null_count();
    if missing_labels > missing_codes {
        warn!(
            rows = missing_labels - missing_codes,
            "race codes outside the codebook left unmapped"
        );
    }
    Ok(df)
}

pub fn race_labels(codes: Expr) -> Expr {
    let codes = codes.cast(DataType::Float64);
    Race::ALL
        .iter()
        .rev()
        .fold(lit(NULL).cast(DataType::String), |otherwise, race| {
            when(codes.clone().eq(lit(race.code() as f64)))
                .then(lit(race.label()))
                .otherwise(otherwise)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{numeric, text};

    fn raw_summary() -> DataFrame {
        let imputed: Vec<f64> = (10001..=10005).map(f64::from).collect();
        DataFrame::new(vec![
            Column::new("yy1".into(), &[1000.0; 5]),
            Column::new("y1".into(), imputed),
            Column::new(
                "wgt".into(),
                &[Some(2.0), Some(2.0), None, Some(2.0), Some(2.0)],
            ),
            Column::new(
                "race".into(),
                &[Some(1.0), Some(2.0), Some(6.0), None, Some(5.0)],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn implicates_are_one_to_five() {
        let df = prepare_summary(raw_summary()).unwrap();
        assert_eq!(
            numeric(&df, IMPLICATE).unwrap(),
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)]
        );
    }

    #[test]
    fn renames_identifier_columns() {
        let df = prepare_summary(raw_summary()).unwrap();
        assert!(has_column(&df, HOUSEHOLD_ID));
        assert!(has_column(&df, IMPUTED_HH_ID));
        assert!(!has_column(&df, "yy1"));
        assert!(!has_column(&df, "y1"));
    }

    #[test]
    fn adjusted_weight_is_five_times_weight() {
        let df = prepare_summary(raw_summary()).unwrap();
        assert_eq!(
            numeric(&df, HH_WEIGHT).unwrap(),
            vec![Some(10.0), Some(10.0), None, Some(10.0), Some(10.0)]
        );
    }

    #[test]
    fn unmapped_race_code_stays_distinguishable() {
        let df = prepare_summary(raw_summary()).unwrap();
        let race = text(&df, RACE).unwrap();
        assert_eq!(race[0].as_deref(), Some("white non-Hispanic"));
        assert_eq!(race[1].as_deref(), Some("black/African-American"));
        assert_eq!(race[2], None);
        assert_eq!(race[3], None);
        assert_eq!(race[4].as_deref(), Some("other"));
        assert_eq!(numeric(&df, RACE_CODE).unwrap()[2], Some(6.0));
    }

    #[test]
    fn labels_cover_codebook() {
        let df = DataFrame::new(vec![Column::new(
            "code".into(),
            &[3.0, 4.0, 2.5, 0.0],
        )])
        .unwrap()
        .lazy()
        .select([race_labels(col("code")).alias("label")])
        .collect()
        .unwrap();
        assert_eq!(
            text(&df, "label").unwrap(),
            vec![
                Some("Hispanic".to_string()),
                Some("Asian".to_string()),
                None,
                None
            ]
        );
    }
}
