use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RefgetError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub identifier: String,
    pub resource_url: String,
}

impl MetadataRecord {
    pub fn new(identifier: impl Into<String>, resource_url: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            resource_url: resource_url.into(),
        }
    }

    pub fn url_basename(&self) -> &str {
        self.resource_url
            .rsplit('/')
            .next()
            .unwrap_or(self.resource_url.as_str())
    }

    pub fn unit_id(&self) -> Result<UnitId, RefgetError> {
        self.url_basename().parse()
    }

    pub fn to_list_row(&self) -> String {
        format!("{}\t{}\n", self.identifier, self.resource_url)
    }

    pub fn from_list_row(line: &str) -> Result<Self, RefgetError> {
        let (identifier, url) = line
            .trim_end_matches(['\r', '\n'])
            .split_once('\t')
            .ok_or_else(|| RefgetError::MalformedRecord(line.to_string()))?;
        if identifier.is_empty() || url.is_empty() {
            return Err(RefgetError::MalformedRecord(line.to_string()));
        }
        Ok(Self::new(identifier, url))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(String);

impl UnitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn shard(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(2)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UnitId {
    type Err = RefgetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let stem = value.trim().split('.').next().unwrap_or_default();
        let is_valid = !stem.is_empty()
            && stem
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !is_valid {
            return Err(RefgetError::MalformedRecord(format!(
                "cannot derive a processing id from {value}"
            )));
        }
        Ok(Self(stem.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn unit_id_from_url() {
        let record = MetadataRecord::new("GCA_900000000.1", "ftp://host/wgs/SPQ/SPQE01.dat.gz");
        assert_eq!(record.url_basename(), "SPQE01.dat.gz");
        let id = record.unit_id().unwrap();
        assert_eq!(id.as_str(), "SPQE01");
        assert_eq!(id.shard(), "SP");
    }

    #[test]
    fn list_row_requires_two_columns() {
        let err = MetadataRecord::from_list_row("SPQE01\n").unwrap_err();
        assert_matches!(err, RefgetError::MalformedRecord(_));

        let record = MetadataRecord::from_list_row("SPQE01\tftp://host/SPQE01.dat.gz\n").unwrap();
        assert_eq!(record.identifier, "SPQE01");
        assert_eq!(record.resource_url, "ftp://host/SPQE01.dat.gz");
    }
}
