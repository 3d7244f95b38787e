use polars::prelude::*;

use crate::error::ScfError;

pub fn frame_error(err: PolarsError) -> ScfError {
    match err {
        PolarsError::ColumnNotFound(name) => ScfError::MissingColumn(name.to_string()),
        other => ScfError::Frame(other.to_string()),
    }
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn numeric(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, ScfError> {
    let column = df.column(name).map_err(frame_error)?;
    let values = column.f64().map_err(|_| ScfError::ColumnType {
        column: name.to_string(),
        expected: "numeric",
    })?;
    Ok(values.into_iter().collect())
}

pub fn text(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, ScfError> {
    let column = df.column(name).map_err(frame_error)?;
    let values = column.str().map_err(|_| ScfError::ColumnType {
        column: name.to_string(),
        expected: "text",
    })?;
    Ok(values
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sample() -> DataFrame {
        DataFrame::new(vec![
            Column::new("wgt".into(), &[Some(10.0), None]),
            Column::new("race".into(), &[Some("a"), None]),
        ])
        .unwrap()
    }

    #[test]
    fn typed_access() {
        let df = sample();
        assert_eq!(numeric(&df, "wgt").unwrap(), vec![Some(10.0), None]);
        assert_eq!(text(&df, "race").unwrap(), vec![Some("a".to_string()), None]);
    }

    #[test]
    fn typed_access_errors() {
        let df = sample();
        assert_matches!(text(&df, "wgt"), Err(ScfError::ColumnType { .. }));
        assert_matches!(numeric(&df, "nope"), Err(ScfError::MissingColumn(_)));
        assert!(!has_column(&df, "nope"));
    }
}
