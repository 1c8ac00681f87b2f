use camino::Utf8Path;
use tracing::{debug, error, info, warn};

use crate::config::ResolvedConfig;
use crate::domain::{MetadataRecord, UnitId};
use crate::error::RefgetError;
use crate::fs_util;
use crate::job::Job;
use crate::layout::UnitLayout;
use crate::status::JobsetStatus;

pub const LOADER_COMMAND: &str = "refget-loader";

pub const DATA_URL: &str = "url";
pub const DATA_PROCESS_ID: &str = "processid";

pub struct UnitProcessor<'a> {
    config: &'a ResolvedConfig,
    loader_command: String,
}

impl<'a> UnitProcessor<'a> {
    pub fn new(config: &'a ResolvedConfig) -> Self {
        Self {
            config,
            loader_command: LOADER_COMMAND.to_string(),
        }
    }

    pub fn with_loader_command(mut self, loader_command: impl Into<String>) -> Self {
        self.loader_command = loader_command.into();
        self
    }

    /// Returns the unit's jobs, or none if it already succeeded or could not
    /// be prepared. Preparation failures are recorded in the unit's status
    /// file and never propagate.
    pub fn process(&self, window_dir: &Utf8Path, record: &MetadataRecord) -> Vec<Job> {
        let id = match record.unit_id() {
            Ok(id) => id,
            Err(err) => {
                warn!(accession = %record.identifier, error = %err, "skipping record");
                return Vec::new();
            }
        };
        let unit = UnitLayout::in_window(window_dir, &id);

        let mut status = match JobsetStatus::load(unit.status_path()) {
            Ok(status) => status,
            Err(err) => {
                warn!(accession = %record.identifier, error = %err, "unreadable status, starting over");
                JobsetStatus::fresh(unit.status_path())
            }
        };

        if status.is_success() {
            debug!(accession = %record.identifier, "already processed, skipping");
            return Vec::new();
        }

        info!(accession = %record.identifier, previous = %status.status(), "flatfile process attempt");
        status.set_status_running();
        status.set_object_id(record.identifier.as_str());
        status.set_data(DATA_URL, record.resource_url.as_str());
        status.set_data(DATA_PROCESS_ID, id.as_str());
        status.set_message("");

        let jobs = match self.prepare(&unit, &id, record) {
            Ok(jobs) => jobs,
            Err(err) => {
                error!(accession = %record.identifier, error = %err, "flatfile process attempt failed");
                status.set_status_failure();
                status.set_message(err.to_string());
                Vec::new()
            }
        };

        match status.write() {
            Ok(()) => jobs,
            Err(err) => {
                error!(accession = %record.identifier, error = %err, "could not persist status");
                Vec::new()
            }
        }
    }

    fn prepare(
        &self,
        unit: &UnitLayout,
        id: &UnitId,
        record: &MetadataRecord,
    ) -> Result<Vec<Job>, RefgetError> {
        let input = self.config.source.local_input_path(&record.resource_url);
        if !input.as_std_path().exists() {
            return Err(RefgetError::MissingInput(input.to_string()));
        }

        for dir in [unit.dir().to_path_buf(), unit.cmd_dir(), unit.log_dir()] {
            fs_util::ensure_dir(&dir)?;
        }
        let link = unit.input_link(record.url_basename());
        fs_util::refresh_symlink(&input, &link)?;

        let process_id = format!("process.{id}");
        let manifest_id = format!("manifest.{id}");
        let upload_id = format!("upload.{id}");

        let process = Job::persist(
            &format!(
                "{} --store-path {} --file-path {} --process-id {}",
                self.config.source.converter_script,
                unit.dir(),
                link,
                id
            ),
            unit.command_path(&process_id),
            process_id.clone(),
            None,
        )?;
        let manifest = Job::persist(
            &format!(
                "{} manifest {} {} {}",
                self.loader_command,
                unit.dir(),
                id,
                self.config.config_path
            ),
            unit.command_path(&manifest_id),
            manifest_id.clone(),
            Some(process_id),
        )?;
        let upload = Job::persist(
            &format!(
                "{} upload {} {}",
                self.loader_command,
                self.config.destination.type_name(),
                unit.manifest_path()
            ),
            unit.command_path(&upload_id),
            upload_id,
            Some(manifest_id),
        )?;

        Ok(vec![process, manifest, upload])
    }
}
