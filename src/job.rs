use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::RefgetError;
use crate::fs_util;

/// A deferred command: the file holding it, a unique id, and optionally the
/// id of a job that must end before this one starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    command_path: Utf8PathBuf,
    id: String,
    wait_for_id: Option<String>,
}

impl Job {
    pub fn new(
        command_path: impl Into<Utf8PathBuf>,
        id: impl Into<String>,
        wait_for_id: Option<String>,
    ) -> Self {
        Self {
            command_path: command_path.into(),
            id: id.into(),
            wait_for_id,
        }
    }

    /// Writes `command` to `command_path` and returns the job that runs it.
    pub fn persist(
        command: &str,
        command_path: impl Into<Utf8PathBuf>,
        id: impl Into<String>,
        wait_for_id: Option<String>,
    ) -> Result<Self, RefgetError> {
        let job = Self::new(command_path, id, wait_for_id);
        fs_util::write_atomic(&job.command_path, format!("{command}\n").as_bytes())?;
        Ok(job)
    }

    pub fn command_path(&self) -> &Utf8Path {
        &self.command_path
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn wait_for_id(&self) -> Option<&str> {
        self.wait_for_id.as_deref()
    }

    pub fn command(&self) -> Result<String, RefgetError> {
        fs::read_to_string(self.command_path.as_std_path())
            .map(|content| content.trim().to_string())
            .map_err(|err| {
                RefgetError::Filesystem(format!("read command {}: {err}", self.command_path))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_command_reads_back_trimmed() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let job = Job::persist(
            "  ls -1 ena/ ",
            root.join("cmd/list.ena.sh"),
            "list.ena",
            None,
        )
        .unwrap();
        assert_eq!(job.id(), "list.ena");
        assert_eq!(job.wait_for_id(), None);
        assert_eq!(job.command().unwrap(), "ls -1 ena/");
    }

    #[test]
    fn missing_command_file_is_an_error() {
        let job = Job::new("/nonexistent/cmd.sh", "x", Some("y".to_string()));
        assert_eq!(job.wait_for_id(), Some("y"));
        assert!(job.command().is_err());
    }
}
