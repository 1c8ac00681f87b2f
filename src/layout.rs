use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::UnitId;
use crate::error::RefgetError;
use crate::window::Window;

pub const LIST_FILE: &str = "accessions_list.txt";
pub const WINDOW_LOG_FILE: &str = "logfile.txt";
pub const STATUS_FILE: &str = "status.json";

#[derive(Debug, Clone)]
pub struct Layout {
    processing_root: Utf8PathBuf,
}

impl Layout {
    pub fn new(processing_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            processing_root: processing_root.into(),
        }
    }

    pub fn window_dir<W: Window>(&self, window: &W) -> Utf8PathBuf {
        self.processing_root.join(window.relative_dir())
    }
}

pub fn list_file(window_dir: &Utf8Path) -> Utf8PathBuf {
    window_dir.join(LIST_FILE)
}

pub fn window_log_file(window_dir: &Utf8Path) -> Utf8PathBuf {
    window_dir.join(WINDOW_LOG_FILE)
}

/// Working directory of one processing unit.
///
/// ```text
/// <unit>/status.json
/// <unit>/cmd/<job_id>.sh
/// <unit>/log/<job_id>.log.out
/// <unit>/logs/<id>.loader.csv, <id>.full.csv, <id>.manifest.csv
/// ```
#[derive(Debug, Clone)]
pub struct UnitLayout {
    dir: Utf8PathBuf,
    id: UnitId,
}

impl UnitLayout {
    pub fn in_window(window_dir: &Utf8Path, id: &UnitId) -> Self {
        Self {
            dir: window_dir.join("files").join(id.shard()).join(id.as_str()),
            id: id.clone(),
        }
    }

    pub fn at(dir: impl Into<Utf8PathBuf>, id: UnitId) -> Self {
        Self {
            dir: dir.into(),
            id,
        }
    }

    pub fn from_manifest(manifest: &Utf8Path) -> Result<Self, RefgetError> {
        let invalid = || RefgetError::InvalidManifest(format!("unexpected manifest path {manifest}"));
        let file_name = manifest.file_name().ok_or_else(invalid)?;
        let id = file_name
            .strip_suffix(".manifest.csv")
            .ok_or_else(invalid)?
            .parse::<UnitId>()?;
        let dir = manifest
            .parent()
            .and_then(Utf8Path::parent)
            .ok_or_else(invalid)?;
        Ok(Self::at(dir, id))
    }

    pub fn id(&self) -> &UnitId {
        &self.id
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn cmd_dir(&self) -> Utf8PathBuf {
        self.dir.join("cmd")
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.dir.join("log")
    }

    pub fn output_dir(&self) -> Utf8PathBuf {
        self.dir.join("logs")
    }

    pub fn status_path(&self) -> Utf8PathBuf {
        self.dir.join(STATUS_FILE)
    }

    pub fn input_link(&self, basename: &str) -> Utf8PathBuf {
        self.dir.join(basename)
    }

    pub fn command_path(&self, job_id: &str) -> Utf8PathBuf {
        self.cmd_dir().join(format!("{job_id}.sh"))
    }

    pub fn loader_table(&self) -> Utf8PathBuf {
        self.output_dir().join(format!("{}.loader.csv", self.id))
    }

    pub fn full_table(&self) -> Utf8PathBuf {
        self.output_dir().join(format!("{}.full.csv", self.id))
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.output_dir().join(format!("{}.manifest.csv", self.id))
    }
}
