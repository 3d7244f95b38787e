use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use scf_wealth_gap::config::ConfigLoader;
use scf_wealth_gap::domain::FileType;
use scf_wealth_gap::error::ScfError;
use scf_wealth_gap::publish::ChartStudioCredentials;

#[test]
fn resolves_file_with_chart_studio_credentials() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("scf-wg.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "data_dir": "scf",
            "output_dir": "out",
            "start": 2010,
            "until": 2016,
            "filetypes": ["summary", "raw"],
            "timeout_secs": 30,
            "labels": { "Hispanic": "Latino" },
            "chart": {
                "open_browser": true,
                "chart_studio": { "username": "analyst", "api_key": "k3y" }
            }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.data_dir, Utf8PathBuf::from("scf"));
    assert_eq!(resolved.start.value(), 2010);
    assert_eq!(resolved.until.value(), 2016);
    assert_eq!(resolved.filetypes, vec![FileType::Summary, FileType::Raw]);
    assert_eq!(resolved.timeout.as_secs(), 30);
    assert_eq!(resolved.labels["Hispanic"], "Latino");
    assert_eq!(resolved.chart.html_path, Utf8PathBuf::from("out/neg_wealth_gap.html"));
    assert!(resolved.chart.open_browser);
    assert_eq!(
        resolved.chart.credentials,
        Some(ChartStudioCredentials {
            username: "analyst".to_string(),
            api_key: "k3y".to_string(),
        })
    );
    assert_eq!(resolved.chart.filename, "neg_wealth_gap");
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, ScfError::MissingConfig(_));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("scf-wg.json");
    fs::write(&path, "{ \"start\": \"soon\" }").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, ScfError::ConfigParse(_));
}

#[test]
fn year_before_first_wave_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("scf-wg.json");
    fs::write(&path, "{ \"start\": 1980 }").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, ScfError::InvalidYear(_));
}
