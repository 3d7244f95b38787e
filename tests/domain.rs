use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use scf_wealth_gap::domain::{FileType, SurveyYear};
use scf_wealth_gap::error::ScfError;
use scf_wealth_gap::scf::archive_url;
use scf_wealth_gap::store::Store;

fn year(value: u16) -> SurveyYear {
    SurveyYear::new(value).unwrap()
}

#[test]
fn urls_follow_naming_template() {
    let cases = [
        (1989, FileType::Summary, "scfp1989s.zip"),
        (1989, FileType::Raw, "scf1989s.zip"),
        (2009, FileType::Summary, "scfp2009ps.zip"),
        (2009, FileType::Raw, "scf2009ps.zip"),
        (2019, FileType::Summary, "scfp2019s.zip"),
    ];
    for (value, file_type, name) in cases {
        assert_eq!(
            archive_url(year(value), file_type),
            format!("https://www.federalreserve.gov/econres/files/{name}"),
            "{value} {file_type}"
        );
    }
}

#[test]
fn local_paths_follow_naming_template() {
    let store = Store::new("data").unwrap();
    assert_eq!(
        store.archive_path(year(1992), FileType::Raw),
        Utf8PathBuf::from("data/1992/SCF1992_data_public_raw.zip")
    );
    assert_eq!(
        store.data_file_path(year(1992)),
        Utf8PathBuf::from("data/1992/rscfp1992.dta")
    );
}

#[test]
fn scrape_range_reaches_past_until() {
    let years: Vec<u16> = SurveyYear::range(year(1989), year(2019))
        .unwrap()
        .into_iter()
        .map(SurveyYear::value)
        .collect();
    assert_eq!(years.first(), Some(&1989));
    assert_eq!(years.last(), Some(&2019));
    assert_eq!(years.len(), 11);

    let past: Vec<u16> = SurveyYear::range(year(2016), year(2017))
        .unwrap()
        .into_iter()
        .map(SurveyYear::value)
        .collect();
    assert_eq!(past, vec![2016, 2019]);
}

#[test]
fn scrape_range_near_u16_max_is_rejected() {
    let until: SurveyYear = "65535".parse().unwrap();
    let err = SurveyYear::range(year(1989), until).unwrap_err();
    assert_matches!(
        err,
        ScfError::InvalidRange {
            start: 1989,
            until: 65535
        }
    );

    let edge = year(65532);
    let years = SurveyYear::range(edge, edge).unwrap();
    assert_eq!(years, vec![edge]);
}

#[test]
fn overtime_range_excludes_until() {
    let years: Vec<u16> = SurveyYear::range_exclusive(year(1992), year(2020))
        .into_iter()
        .map(SurveyYear::value)
        .collect();
    assert_eq!(years, vec![1992, 1995, 1998, 2001, 2004, 2007, 2010, 2013, 2016, 2019]);
}
