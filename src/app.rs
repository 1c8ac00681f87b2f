use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{ConfigLoader, DestinationConfig, ResolvedConfig};
use crate::domain::UnitId;
use crate::environment::{ExecutionReport, build_environment};
use crate::error::RefgetError;
use crate::job::Job;
use crate::layout::{STATUS_FILE, UnitLayout};
use crate::manifest::{Manifest, ManifestBuilder};
use crate::scanner::SearchClient;
use crate::source::{SourceProcessor, WindowSummary};
use crate::status::{JobsetStatus, Status};
use crate::unit::{LOADER_COMMAND, UnitProcessor};
use crate::upload::{AwsCliTransport, ChecksumUploader, UploadRecord, UploadTransport};

pub const DATA_MANIFEST: &str = "manifest";

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub config_path: String,
    pub dry_run: bool,
    pub windows: Vec<WindowSummary>,
    pub jobs: Vec<Job>,
    pub execution: Option<ExecutionReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestAction {
    Written,
    AlreadyPresent,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestResult {
    pub unit: String,
    pub action: ManifestAction,
    pub manifest_path: String,
    pub status: Status,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub manifest_path: String,
    pub skipped: bool,
    pub status: Status,
    pub uploads: Vec<UploadRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub path: String,
    pub object_id: String,
    pub status: Status,
    pub last_modified: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub units: Vec<StatusEntry>,
}

#[derive(Debug, Clone)]
pub struct App {
    loader_command: String,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            loader_command: LOADER_COMMAND.to_string(),
        }
    }

    pub fn with_loader_command(mut self, loader_command: impl Into<String>) -> Self {
        self.loader_command = loader_command.into();
        self
    }

    pub fn load<C: SearchClient>(
        &self,
        config: &ResolvedConfig,
        client: C,
        options: LoadOptions,
    ) -> Result<LoadResult, RefgetError> {
        let units = UnitProcessor::new(config).with_loader_command(self.loader_command.as_str());
        let run = SourceProcessor::new(config, client)
            .with_unit_processor(units)
            .prepare_jobs()?;
        info!(windows = run.windows.len(), jobs = run.jobs.len(), "jobs prepared");

        let execution = if options.dry_run {
            None
        } else {
            let mut environment = build_environment(&config.environment);
            environment.set_jobs(run.jobs.clone());
            let report = environment.execute_jobs();
            if !report.is_clean() {
                warn!(failed = report.failed.len(), "some jobs failed to dispatch");
            }
            Some(report)
        };

        Ok(LoadResult {
            config_path: config.config_path.to_string(),
            dry_run: options.dry_run,
            windows: run.windows,
            jobs: run.jobs,
            execution,
        })
    }

    pub fn manifest(
        &self,
        processing_dir: &Utf8Path,
        file_id: &str,
        config_file: &Utf8Path,
    ) -> Result<ManifestResult, RefgetError> {
        let id = file_id.parse::<UnitId>()?;
        let unit = UnitLayout::at(processing_dir, id);
        let manifest_path = unit.manifest_path();
        let mut status = JobsetStatus::load(unit.status_path())?;

        let result = |action, status: &JobsetStatus, message: Option<String>| ManifestResult {
            unit: unit.id().to_string(),
            action,
            manifest_path: manifest_path.to_string(),
            status: status.status(),
            message,
        };

        if status.is_settled() {
            info!(unit = %unit.id(), status = %status.status(), "unit already settled, skipping manifest");
            return Ok(result(ManifestAction::Skipped, &status, None));
        }
        if manifest_path.as_std_path().exists() {
            info!(unit = %unit.id(), "manifest already exists");
            return Ok(result(ManifestAction::AlreadyPresent, &status, None));
        }

        let config_path = absolute(config_file);
        let built = ManifestBuilder::new(&unit, &config_path)
            .build()
            .and_then(|manifest| manifest.write(&manifest_path));
        let (action, message) = match built {
            Ok(()) => {
                info!(unit = %unit.id(), path = %manifest_path, "manifest written");
                status.set_data(DATA_MANIFEST, manifest_path.as_str());
                (ManifestAction::Written, None)
            }
            Err(err) => {
                error!(unit = %unit.id(), error = %err, "manifest generation failed");
                status.set_status_failure();
                status.set_message(err.to_string());
                (ManifestAction::Failed, Some(err.to_string()))
            }
        };
        status.write_checked()?;
        Ok(result(action, &status, message))
    }

    pub fn upload(
        &self,
        destination_type: &str,
        manifest_path: &Utf8Path,
    ) -> Result<UploadResult, RefgetError> {
        let manifest = Manifest::read(manifest_path)?;
        let config = ConfigLoader::resolve(Some(manifest.config_path.as_str()))?;
        if config.destination.type_name() != destination_type {
            return Err(RefgetError::UnsupportedDestination(format!(
                "{destination_type} (manifest config declares {})",
                config.destination.type_name()
            )));
        }
        let transport = match &config.destination {
            DestinationConfig::AwsS3(destination) => AwsCliTransport::new(destination),
        };
        self.upload_with(manifest_path, &manifest, transport)
    }

    pub fn upload_with<T: UploadTransport>(
        &self,
        manifest_path: &Utf8Path,
        manifest: &Manifest,
        transport: T,
    ) -> Result<UploadResult, RefgetError> {
        let unit = UnitLayout::from_manifest(manifest_path)?;
        let mut status = JobsetStatus::load(unit.status_path())?;
        let report = ChecksumUploader::new(transport).upload(manifest, &mut status)?;
        Ok(UploadResult {
            manifest_path: manifest_path.to_string(),
            skipped: report.skipped,
            status: report.status,
            uploads: report.uploads,
        })
    }

    pub fn status(&self, processing_dir: &Utf8Path) -> Result<StatusResult, RefgetError> {
        let mut units = Vec::new();
        for path in find_status_files(processing_dir)? {
            match JobsetStatus::load(path.clone()) {
                Ok(status) => {
                    let document = status.document();
                    units.push(StatusEntry {
                        path: path.to_string(),
                        object_id: document.object_id.clone(),
                        status: document.status,
                        last_modified: document.last_modified.clone(),
                        message: document.message.clone(),
                    });
                }
                Err(err) => warn!(path = %path, error = %err, "unreadable status file"),
            }
        }
        Ok(StatusResult { units })
    }
}

fn absolute(path: &Utf8Path) -> Utf8PathBuf {
    fs::canonicalize(path.as_std_path())
        .ok()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| path.to_path_buf())
}

fn find_status_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, RefgetError> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| RefgetError::Filesystem(format!("read {dir}: {err}")))?;
        for entry in entries.flatten() {
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() && path.file_name() == Some(STATUS_FILE) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
