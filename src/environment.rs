use std::collections::HashSet;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EnvironmentConfig;
use crate::error::RefgetError;
use crate::fs_util;
use crate::job::Job;

pub const SUBMISSION_EXTENSION: &str = "bsub";
const GRID_LOG_DIR: &str = "log";

#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub executed: Vec<String>,
    pub failed: Vec<JobFailure>,
}

impl ExecutionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub trait Environment {
    fn set_jobs(&mut self, jobs: Vec<Job>);

    fn jobs(&self) -> &[Job];

    fn execute_job(&self, job: &Job) -> Result<(), RefgetError>;

    /// Runs every job in list order. A failing job is recorded and the rest
    /// still run.
    fn execute_jobs(&self) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let mut seen = HashSet::new();
        for job in self.jobs() {
            if let Some(wait) = job.wait_for_id()
                && !seen.contains(wait)
            {
                warn!(job = job.id(), wait_for = wait, "dependency not submitted before this job");
            }
            seen.insert(job.id().to_string());

            match self.execute_job(job) {
                Ok(()) => report.executed.push(job.id().to_string()),
                Err(err) => {
                    warn!(job = job.id(), error = %err, "job execution failed");
                    report.failed.push(JobFailure {
                        id: job.id().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }
}

pub fn build_environment(config: &EnvironmentConfig) -> Box<dyn Environment> {
    match config {
        EnvironmentConfig::Local => Box::new(LocalEnvironment::default()),
        EnvironmentConfig::Ebi { submit_command } => {
            Box::new(GridEnvironment::new(submit_command.clone()))
        }
    }
}

#[derive(Debug, Default)]
pub struct LocalEnvironment {
    jobs: Vec<Job>,
}

impl Environment for LocalEnvironment {
    fn set_jobs(&mut self, jobs: Vec<Job>) {
        self.jobs = jobs;
    }

    fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    fn execute_job(&self, job: &Job) -> Result<(), RefgetError> {
        let command = job.command()?;
        info!(job = job.id(), "running job locally");
        run_shell(&["-c", command.as_str()], job.id())
    }
}

#[derive(Debug)]
pub struct GridEnvironment {
    jobs: Vec<Job>,
    submit_command: String,
}

impl GridEnvironment {
    pub fn new(submit_command: impl Into<String>) -> Self {
        Self {
            jobs: Vec::new(),
            submit_command: submit_command.into(),
        }
    }

    pub fn submission_path(job: &Job) -> Result<Utf8PathBuf, RefgetError> {
        Ok(command_dir(job)?.join(format!("{}.{SUBMISSION_EXTENSION}", job.id())))
    }

    pub fn log_dir(job: &Job) -> Result<Utf8PathBuf, RefgetError> {
        let cmd_dir = command_dir(job)?;
        let parent = cmd_dir.parent().unwrap_or(cmd_dir);
        Ok(parent.join(GRID_LOG_DIR))
    }

    pub fn submission_line(&self, job: &Job) -> Result<String, RefgetError> {
        let log_dir = Self::log_dir(job)?;
        let hold = job
            .wait_for_id()
            .map(|wait| format!("-w 'ended({wait})' "))
            .unwrap_or_default();
        Ok(format!(
            "{} -o {log_dir}/{id}.log.out -e {log_dir}/{id}.log.err -J {id} {hold}\"{cmd}\"",
            self.submit_command,
            id = job.id(),
            cmd = job.command_path(),
        ))
    }

    pub fn prepare_submission(&self, job: &Job) -> Result<Utf8PathBuf, RefgetError> {
        fs_util::ensure_dir(&Self::log_dir(job)?)?;
        let path = Self::submission_path(job)?;
        fs_util::write_atomic(&path, format!("{}\n", self.submission_line(job)?).as_bytes())?;
        fs_util::make_executable(&path)?;
        fs_util::make_executable(job.command_path())?;
        Ok(path)
    }
}

impl Environment for GridEnvironment {
    fn set_jobs(&mut self, jobs: Vec<Job>) {
        self.jobs = jobs;
    }

    fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    fn execute_job(&self, job: &Job) -> Result<(), RefgetError> {
        let submission = self.prepare_submission(job)?;
        info!(job = job.id(), submission = %submission, "submitting job");
        run_shell(&[submission.as_str()], job.id())
    }
}

fn command_dir(job: &Job) -> Result<&Utf8Path, RefgetError> {
    job.command_path().parent().ok_or_else(|| {
        RefgetError::Filesystem(format!("command file has no directory: {}", job.command_path()))
    })
}

fn run_shell(args: &[&str], job_id: &str) -> Result<(), RefgetError> {
    let output = Command::new("sh")
        .args(args)
        .output()
        .map_err(|err| RefgetError::Subprocess(format!("{job_id}: {err}")))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("{job_id} exited with {}", output.status)
    } else {
        format!("{job_id}: {stderr}")
    };
    Err(RefgetError::Subprocess(message))
}
