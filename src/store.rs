use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::domain::{FileType, SurveyYear};
use crate::error::ScfError;
use crate::fs_util;

pub const USER_CACHE_DIR: &str = "~cache";

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Result<Self, ScfError> {
        let root = root.into();
        if root.as_str() != USER_CACHE_DIR {
            return Ok(Self { root });
        }
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.cache_dir().join("scf-wealth-gap")).ok()
            })
            .ok_or_else(|| {
                ScfError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn year_dir(&self, year: SurveyYear) -> Utf8PathBuf {
        self.root.join(year.to_string())
    }

    pub fn ensure_year_dir(&self, year: SurveyYear) -> Result<Utf8PathBuf, ScfError> {
        let dir = self.year_dir(year);
        fs_util::ensure_dir(dir.as_std_path())?;
        Ok(dir)
    }

    pub fn archive_path(&self, year: SurveyYear, file_type: FileType) -> Utf8PathBuf {
        self.year_dir(year)
            .join(format!("SCF{year}_data_public_{file_type}.zip"))
    }

    pub fn data_file_path(&self, year: SurveyYear) -> Utf8PathBuf {
        self.year_dir(year).join(format!("rscfp{year}.dta"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new("data").unwrap();
        let year = SurveyYear::new(2019).unwrap();
        assert_eq!(store.year_dir(year), Utf8PathBuf::from("data/2019"));
        assert_eq!(
            store.archive_path(year, FileType::Summary),
            Utf8PathBuf::from("data/2019/SCF2019_data_public_summary.zip")
        );
        assert_eq!(
            store.archive_path(year, FileType::Raw),
            Utf8PathBuf::from("data/2019/SCF2019_data_public_raw.zip")
        );
        assert_eq!(
            store.data_file_path(year),
            Utf8PathBuf::from("data/2019/rscfp2019.dta")
        );
    }
}
