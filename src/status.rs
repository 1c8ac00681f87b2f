use std::collections::BTreeMap;
use std::fmt;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::error::RefgetError;
use crate::fs_util;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    NotStarted,
    Running,
    Success,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Status::NotStarted => "NotStarted",
            Status::Running => "Running",
            Status::Success => "Success",
            Status::Failed => "Failed",
        };
        write!(f, "{value}")
    }
}

/// On-disk shape. Fields are declared in key order so the JSON is sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDocument {
    pub data: BTreeMap<String, String>,
    pub last_modified: String,
    pub message: String,
    pub object_id: String,
    pub status: Status,
}

impl Default for StatusDocument {
    fn default() -> Self {
        Self {
            data: BTreeMap::new(),
            last_modified: timestamp(),
            message: String::new(),
            object_id: "NULL".to_string(),
            status: Status::NotStarted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobsetStatus {
    path: Utf8PathBuf,
    document: StatusDocument,
    on_disk: Option<String>,
}

impl JobsetStatus {
    pub fn load(path: impl Into<Utf8PathBuf>) -> Result<Self, RefgetError> {
        let path = path.into();
        let on_disk = read_if_exists(&path)?;
        let document = match &on_disk {
            Some(content) => serde_json::from_str(content)
                .map_err(|err| RefgetError::StatusParse(format!("{path}: {err}")))?,
            None => StatusDocument::default(),
        };
        Ok(Self {
            path,
            document,
            on_disk,
        })
    }

    pub fn fresh(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: StatusDocument::default(),
            on_disk: None,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn document(&self) -> &StatusDocument {
        &self.document
    }

    pub fn status(&self) -> Status {
        self.document.status
    }

    pub fn message(&self) -> &str {
        &self.document.message
    }

    pub fn data(&self, key: &str) -> Option<&str> {
        self.document.data.get(key).map(String::as_str)
    }

    pub fn set_object_id(&mut self, object_id: impl Into<String>) {
        self.document.object_id = object_id.into();
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.document.message = message.into();
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.document.data.insert(key.into(), value.into());
    }

    pub fn set_status_not_started(&mut self) {
        self.document.status = Status::NotStarted;
    }

    pub fn set_status_running(&mut self) {
        self.document.status = Status::Running;
    }

    pub fn set_status_success(&mut self) {
        self.document.status = Status::Success;
    }

    pub fn set_status_failure(&mut self) {
        self.document.status = Status::Failed;
    }

    pub fn is_success(&self) -> bool {
        self.document.status == Status::Success
    }

    pub fn is_failure(&self) -> bool {
        self.document.status == Status::Failed
    }

    pub fn is_settled(&self) -> bool {
        self.is_success() || self.is_failure()
    }

    pub fn write(&mut self) -> Result<(), RefgetError> {
        self.document.last_modified = timestamp();
        let rendered = self.render()?;
        fs_util::write_atomic(&self.path, rendered.as_bytes())?;
        self.on_disk = Some(rendered);
        Ok(())
    }

    /// Like [`write`](Self::write), but refuses to overwrite a document that
    /// another process changed after this one was loaded.
    pub fn write_checked(&mut self) -> Result<(), RefgetError> {
        let current = read_if_exists(&self.path)?;
        if current != self.on_disk {
            return Err(RefgetError::StatusConflict(self.path.to_string()));
        }
        self.write()
    }

    pub fn render(&self) -> Result<String, RefgetError> {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.document
            .serialize(&mut serializer)
            .map_err(|err| RefgetError::StatusParse(err.to_string()))?;
        buffer.push(b'\n');
        String::from_utf8(buffer).map_err(|err| RefgetError::StatusParse(err.to_string()))
    }
}

impl fmt::Display for JobsetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => Err(fmt::Error),
        }
    }
}

pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn read_if_exists(path: &Utf8Path) -> Result<Option<String>, RefgetError> {
    if !path.as_std_path().exists() {
        return Ok(None);
    }
    fs::read_to_string(path.as_std_path())
        .map(Some)
        .map_err(|err| RefgetError::Filesystem(format!("read {path}: {err}")))
}
