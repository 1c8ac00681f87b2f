use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use chrono::{Datelike, Days, NaiveDate};

use crate::error::RefgetError;

pub trait Window: fmt::Display + Clone {
    fn next(&self) -> Result<Self, RefgetError>;

    fn relative_dir(&self) -> Utf8PathBuf;

    fn search_query(&self) -> Result<String, RefgetError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateWindow(NaiveDate);

impl Window for DateWindow {
    fn next(&self) -> Result<Self, RefgetError> {
        self.0
            .checked_add_days(Days::new(1))
            .map(Self)
            .ok_or_else(|| RefgetError::InvalidWindow(format!("no day after {self}")))
    }

    fn relative_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{:04}", self.0.year()))
            .join(format!("{:02}", self.0.month()))
            .join(format!("{:02}", self.0.day()))
    }

    fn search_query(&self) -> Result<String, RefgetError> {
        let next = self.next()?;
        Ok(format!("last_updated>={self} AND last_updated<{next}"))
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DateWindow {
    type Err = RefgetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| RefgetError::InvalidWindow(value.to_string()))
    }
}
