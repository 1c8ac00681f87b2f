use std::collections::BTreeSet;
use std::process::Command;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::UploadDestinationConfig;
use crate::error::RefgetError;
use crate::manifest::Manifest;
use crate::status::{JobsetStatus, Status};

pub const UPLOAD_FAILURE_MESSAGE: &str =
    "one or more non-zero status codes encountered during upload of manifest sequences";

const SPAWN_FAILURE_CODE: i32 = -1;

pub fn sequence_key(checksum: &str) -> String {
    format!("sequence/{checksum}")
}

pub fn metadata_key(checksum: &str) -> String {
    format!("metadata/json/{checksum}.json")
}

/// Object store access. Each call returns the exit code of one put.
pub trait UploadTransport {
    fn put_object(&self, key: &str, body: &Utf8Path) -> Result<i32, RefgetError>;

    fn put_redirect(&self, key: &str, location: &str) -> Result<i32, RefgetError>;
}

#[derive(Debug, Clone)]
pub struct AwsCliTransport {
    program: String,
    bucket: String,
    profile: Option<String>,
}

impl AwsCliTransport {
    pub fn new(config: &UploadDestinationConfig) -> Self {
        Self {
            program: "aws".to_string(),
            bucket: config.bucket_name.clone(),
            profile: config.profile.clone(),
        }
    }

    pub fn put_args(&self, key: &str) -> Vec<String> {
        let mut args = [
            "s3api",
            "put-object",
            "--bucket",
            self.bucket.as_str(),
            "--key",
            key,
            "--acl",
            "public-read",
        ]
        .map(str::to_string)
        .to_vec();
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    fn run(&self, args: &[String]) -> Result<i32, RefgetError> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|err| RefgetError::Subprocess(format!("{}: {err}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(stderr = %stderr.trim(), "put-object failed");
        }
        Ok(output.status.code().unwrap_or(SPAWN_FAILURE_CODE))
    }
}

impl UploadTransport for AwsCliTransport {
    fn put_object(&self, key: &str, body: &Utf8Path) -> Result<i32, RefgetError> {
        let mut args = self.put_args(key);
        args.push("--body".to_string());
        args.push(body.to_string());
        self.run(&args)
    }

    fn put_redirect(&self, key: &str, location: &str) -> Result<i32, RefgetError> {
        let mut args = self.put_args(key);
        args.push("--website-redirect-location".to_string());
        args.push(location.to_string());
        self.run(&args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRecord {
    pub key: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub skipped: bool,
    pub status: Status,
    pub uploads: Vec<UploadRecord>,
}

impl UploadReport {
    pub fn failed_keys(&self) -> Vec<&str> {
        self.uploads
            .iter()
            .filter(|record| record.exit_code != 0)
            .map(|record| record.key.as_str())
            .collect()
    }
}

pub struct ChecksumUploader<T: UploadTransport> {
    transport: T,
}

impl<T: UploadTransport> ChecksumUploader<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Does nothing if the unit already settled. Otherwise uploads the whole
    /// manifest and writes a single verdict into `status`.
    pub fn upload(
        &self,
        manifest: &Manifest,
        status: &mut JobsetStatus,
    ) -> Result<UploadReport, RefgetError> {
        if status.is_settled() {
            info!(status = %status.status(), "unit already settled, skipping upload");
            return Ok(UploadReport {
                skipped: true,
                status: status.status(),
                uploads: Vec::new(),
            });
        }

        let mut uploads = Vec::new();
        for entry in &manifest.entries {
            let primary = entry.primary_checksum.as_str();
            let sequence = sequence_key(primary);
            let metadata = metadata_key(primary);
            uploads.push(self.object(&sequence, Utf8Path::new(&entry.sequence_path)));
            uploads.push(self.object(&metadata, Utf8Path::new(&entry.metadata_path)));

            for secondary in &entry.secondary_checksums {
                uploads.push(self.redirect(&sequence_key(secondary), &format!("/{sequence}")));
                uploads.push(self.redirect(&metadata_key(secondary), &format!("/{metadata}")));
            }
        }
        for extra in &manifest.additional {
            uploads.push(self.object(&extra.destination, Utf8Path::new(&extra.source)));
        }

        let codes = uploads
            .iter()
            .map(|record| record.exit_code)
            .collect::<BTreeSet<_>>();
        let mut report = UploadReport {
            skipped: false,
            status: Status::Success,
            uploads,
        };
        if codes.len() == 1 && codes.contains(&0) {
            status.set_status_success();
            status.set_message("");
        } else {
            let failed = report.failed_keys().join(", ");
            error!(failed = %failed, "manifest upload incomplete");
            status.set_status_failure();
            status.set_message(if failed.is_empty() {
                UPLOAD_FAILURE_MESSAGE.to_string()
            } else {
                format!("{UPLOAD_FAILURE_MESSAGE}: {failed}")
            });
            report.status = Status::Failed;
        }
        status.write_checked()?;
        Ok(report)
    }

    fn object(&self, key: &str, body: &Utf8Path) -> UploadRecord {
        debug!(key, body = %body, "uploading object");
        record(key, self.transport.put_object(key, body))
    }

    fn redirect(&self, key: &str, location: &str) -> UploadRecord {
        debug!(key, location, "uploading redirect");
        record(key, self.transport.put_redirect(key, location))
    }
}

fn record(key: &str, result: Result<i32, RefgetError>) -> UploadRecord {
    let exit_code = result.unwrap_or_else(|err| {
        error!(key, error = %err, "upload command could not run");
        SPAWN_FAILURE_CODE
    });
    UploadRecord {
        key: key.to_string(),
        exit_code,
    }
}
