use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ScfError;

pub const FIRST_SURVEY_YEAR: u16 = 1989;

pub const SURVEY_CADENCE: u16 = 3;

pub const IMPLICATES: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct SurveyYear(u16);

impl SurveyYear {
    pub fn new(year: u16) -> Result<Self, ScfError> {
        if year < FIRST_SURVEY_YEAR {
            return Err(ScfError::InvalidYear(year.to_string()));
        }
        Ok(Self(year))
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Years `start, start + 3, ...` up to and including `until + 2`.
    pub fn range(start: SurveyYear, until: SurveyYear) -> Result<Vec<SurveyYear>, ScfError> {
        let invalid = || ScfError::InvalidRange {
            start: start.0,
            until: until.0,
        };
        if until < start {
            return Err(invalid());
        }
        let end = until.0.checked_add(SURVEY_CADENCE).ok_or_else(invalid)?;
        Ok((start.0..end)
            .step_by(SURVEY_CADENCE as usize)
            .map(SurveyYear)
            .collect())
    }

    /// Years `start, start + 3, ...` strictly below `until`.
    pub fn range_exclusive(start: SurveyYear, until: SurveyYear) -> Vec<SurveyYear> {
        (start.0..until.0)
            .step_by(SURVEY_CADENCE as usize)
            .map(SurveyYear)
            .collect()
    }
}

impl TryFrom<u16> for SurveyYear {
    type Error = ScfError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SurveyYear> for u16 {
    fn from(value: SurveyYear) -> Self {
        value.0
    }
}

impl fmt::Display for SurveyYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SurveyYear {
    type Err = ScfError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let year = value
            .trim()
            .parse::<u16>()
            .map_err(|_| ScfError::InvalidYear(value.to_string()))?;
        Self::new(year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Summary,
    Raw,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Summary => "summary",
            FileType::Raw => "raw",
        }
    }

    pub fn url_flag(self) -> &'static str {
        match self {
            FileType::Summary => "p",
            FileType::Raw => "",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileType {
    type Err = ScfError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "summary" => Ok(FileType::Summary),
            "raw" => Ok(FileType::Raw),
            _ => Err(ScfError::InvalidFileType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Race {
    WhiteNonHispanic,
    Black,
    Hispanic,
    Asian,
    Other,
}

impl Race {
    pub const ALL: [Race; 5] = [
        Race::WhiteNonHispanic,
        Race::Black,
        Race::Hispanic,
        Race::Asian,
        Race::Other,
    ];

    pub fn from_code(code: i64) -> Option<Race> {
        match code {
            1 => Some(Race::WhiteNonHispanic),
            2 => Some(Race::Black),
            3 => Some(Race::Hispanic),
            4 => Some(Race::Asian),
            5 => Some(Race::Other),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Race::WhiteNonHispanic => 1,
            Race::Black => 2,
            Race::Hispanic => 3,
            Race::Asian => 4,
            Race::Other => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Race::WhiteNonHispanic => "white non-Hispanic",
            Race::Black => "black/African-American",
            Race::Hispanic => "Hispanic",
            Race::Asian => "Asian",
            Race::Other => "other",
        }
    }
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

pub const BLACK_HISPANIC_LABEL: &str = "black & hispanic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    #[default]
    NonPositiveShare,
    WeightedAverage,
}
