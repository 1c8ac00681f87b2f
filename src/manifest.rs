use std::collections::{HashMap, HashSet};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::RefgetError;
use crate::fs_util;
use crate::layout::UnitLayout;

pub const MANIFEST_TITLE: &str = "# Refget loader manifest";
pub const CONFIG_PREFIX: &str = "# config file:";
pub const ADDITIONAL_MARKER: &str = "# additional uploads";
pub const SEQUENCE_HEADER: [&str; 6] = [
    "completed",
    "seq",
    "metadata",
    "primary_id",
    "trunc512_id",
    "md5_id",
];
pub const ADDITIONAL_HEADER: [&str; 2] = ["source", "destination"];

const JOIN_COLUMN: &str = "trunc512";
const PRIMARY_COLUMN: &str = "ga4gh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub completed: bool,
    pub sequence_path: String,
    pub metadata_path: String,
    pub primary_checksum: String,
    pub secondary_checksums: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdditionalUpload {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub config_path: Utf8PathBuf,
    pub entries: Vec<ManifestEntry>,
    pub additional: Vec<AdditionalUpload>,
}

impl Manifest {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(MANIFEST_TITLE);
        out.push('\n');
        out.push_str(&format!("{CONFIG_PREFIX} {}\n", self.config_path));
        out.push_str(&SEQUENCE_HEADER.join("\t"));
        out.push('\n');
        for entry in &self.entries {
            let mut columns = vec![
                if entry.completed { "1" } else { "0" }.to_string(),
                entry.sequence_path.clone(),
                entry.metadata_path.clone(),
                entry.primary_checksum.clone(),
            ];
            columns.extend(entry.secondary_checksums.iter().cloned());
            out.push_str(&columns.join("\t"));
            out.push('\n');
        }
        out.push_str(ADDITIONAL_MARKER);
        out.push('\n');
        out.push_str(&ADDITIONAL_HEADER.join("\t"));
        out.push('\n');
        for upload in &self.additional {
            out.push_str(&format!("{}\t{}\n", upload.source, upload.destination));
        }
        out
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), RefgetError> {
        fs_util::write_atomic(path, self.render().as_bytes())
    }

    pub fn read(path: &Utf8Path) -> Result<Self, RefgetError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| RefgetError::Filesystem(format!("read manifest {path}: {err}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, RefgetError> {
        let mut lines = content.lines();

        match lines.next() {
            Some(title) if title.starts_with('#') => {}
            _ => {
                return Err(RefgetError::InvalidManifest(
                    "missing title comment".to_string(),
                ));
            }
        }
        let config_path = lines
            .next()
            .and_then(|line| line.strip_prefix(CONFIG_PREFIX))
            .map(|path| Utf8PathBuf::from(path.trim()))
            .ok_or_else(|| RefgetError::InvalidManifest("missing config file line".to_string()))?;
        if lines.next().is_none() {
            return Err(RefgetError::InvalidManifest(
                "missing sequence header".to_string(),
            ));
        }

        let mut entries = Vec::new();
        let mut additional = Vec::new();
        let mut in_additional = false;
        let mut skip_header = false;
        for line in lines {
            if line.starts_with(ADDITIONAL_MARKER) {
                in_additional = true;
                skip_header = true;
                continue;
            }
            if skip_header {
                skip_header = false;
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            if in_additional {
                additional.push(parse_additional(line)?);
            } else {
                entries.push(parse_entry(line)?);
            }
        }

        Ok(Self {
            config_path,
            entries,
            additional,
        })
    }
}

fn parse_entry(line: &str) -> Result<ManifestEntry, RefgetError> {
    let columns = line.trim_end().split('\t').collect::<Vec<_>>();
    if columns.len() < 4 {
        return Err(RefgetError::InvalidManifest(format!(
            "sequence row has {} columns: {line}",
            columns.len()
        )));
    }
    Ok(ManifestEntry {
        completed: is_completed(columns[0]),
        sequence_path: columns[1].to_string(),
        metadata_path: columns[2].to_string(),
        primary_checksum: columns[3].to_string(),
        secondary_checksums: columns[4..]
            .iter()
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string())
            .collect(),
    })
}

fn parse_additional(line: &str) -> Result<AdditionalUpload, RefgetError> {
    let (source, destination) = line
        .trim_end()
        .split_once('\t')
        .ok_or_else(|| RefgetError::InvalidManifest(format!("additional row: {line}")))?;
    Ok(AdditionalUpload {
        source: source.to_string(),
        destination: destination.to_string(),
    })
}

fn is_completed(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

type Row = HashMap<String, String>;

/// Rows of a converter table keyed by `key_column`, in file order. A later
/// row with the same key replaces the earlier one in place.
pub fn load_table(path: &Utf8Path, key_column: &str) -> Result<Vec<(String, Row)>, RefgetError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| RefgetError::IncompleteConversion(format!("cannot read {path}: {err}")))?;
    let mut lines = content.lines();
    let columns = lines
        .next()
        .map(|header| header.trim_end().split(',').map(str::to_string).collect::<Vec<_>>())
        .ok_or_else(|| RefgetError::IncompleteConversion(format!("{path} is empty")))?;

    let mut rows: Vec<(String, Row)> = Vec::new();
    let mut positions = HashMap::new();
    for line in lines.filter(|line| !line.trim().is_empty()) {
        let row = columns
            .iter()
            .cloned()
            .zip(line.trim_end().split(',').map(str::to_string))
            .collect::<Row>();
        let key = row.get(key_column).cloned().ok_or_else(|| {
            RefgetError::IncompleteConversion(format!("{path}: row without {key_column}"))
        })?;
        match positions.get(&key) {
            Some(&index) => rows[index] = (key, row),
            None => {
                positions.insert(key.clone(), rows.len());
                rows.push((key, row));
            }
        }
    }
    Ok(rows)
}

pub struct ManifestBuilder<'a> {
    unit: &'a UnitLayout,
    config_path: &'a Utf8Path,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(unit: &'a UnitLayout, config_path: &'a Utf8Path) -> Self {
        Self { unit, config_path }
    }

    pub fn build(&self) -> Result<Manifest, RefgetError> {
        let full_path = self.unit.full_table();
        let full = load_table(&full_path, JOIN_COLUMN)?
            .into_iter()
            .collect::<HashMap<_, _>>();
        let loader = load_table(&self.unit.loader_table(), JOIN_COLUMN)?;

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for (key, row) in &loader {
            let completed = column(row, "completed", key)?;
            if !is_completed(completed) {
                return Err(RefgetError::IncompleteConversion(format!(
                    "{key} has completed={completed}"
                )));
            }
            let partner = full.get(key).ok_or_else(|| {
                RefgetError::IncompleteConversion(format!("{key} missing from full table"))
            })?;
            let primary = column(partner, PRIMARY_COLUMN, key)?;
            if !seen.insert(primary.to_string()) {
                continue;
            }
            entries.push(ManifestEntry {
                completed: true,
                sequence_path: column(row, "seq_path", key)?.to_string(),
                metadata_path: column(row, "json_path", key)?.to_string(),
                primary_checksum: primary.to_string(),
                secondary_checksums: vec![
                    column(row, "trunc512", key)?.to_string(),
                    column(row, "md5", key)?.to_string(),
                ],
            });
        }

        Ok(Manifest {
            config_path: self.config_path.to_path_buf(),
            entries,
            additional: vec![AdditionalUpload {
                source: full_path.to_string(),
                destination: format!("metadata/csv/{}.full.csv", self.unit.id()),
            }],
        })
    }
}

fn column<'r>(row: &'r Row, name: &str, key: &str) -> Result<&'r str, RefgetError> {
    row.get(name)
        .map(String::as_str)
        .ok_or_else(|| RefgetError::IncompleteConversion(format!("{key} has no {name} column")))
}
