use std::collections::HashSet;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ResolvedConfig;
use crate::error::RefgetError;
use crate::fs_util;
use crate::job::Job;
use crate::layout::{Layout, list_file};
use crate::logging::WindowLog;
use crate::scanner::{AssemblyScanner, SearchClient, read_list};
use crate::unit::UnitProcessor;
use crate::window::Window;

#[derive(Debug, Clone, Serialize)]
pub struct WindowSummary {
    pub window: String,
    pub records: usize,
    pub jobs: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceRun {
    pub jobs: Vec<Job>,
    pub windows: Vec<WindowSummary>,
}

pub struct SourceProcessor<'a, C: SearchClient> {
    config: &'a ResolvedConfig,
    scanner: AssemblyScanner<C>,
    layout: Layout,
    units: UnitProcessor<'a>,
}

impl<'a, C: SearchClient> SourceProcessor<'a, C> {
    pub fn new(config: &'a ResolvedConfig, client: C) -> Self {
        Self {
            config,
            scanner: AssemblyScanner::new(client),
            layout: Layout::new(config.source.processing_dir.clone()),
            units: UnitProcessor::new(config),
        }
    }

    pub fn with_scanner(mut self, scanner: AssemblyScanner<C>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_unit_processor(mut self, units: UnitProcessor<'a>) -> Self {
        self.units = units;
        self
    }

    pub fn prepare_jobs(&self) -> Result<SourceRun, RefgetError> {
        self.prepare_windows(self.config.source.start, self.config.source.number_of_days)
    }

    pub fn prepare_windows<W: Window>(&self, start: W, count: u32) -> Result<SourceRun, RefgetError> {
        let mut run = SourceRun::default();
        let mut scheduled = HashSet::new();
        let mut window = start;

        for index in 0..count {
            if index > 0 {
                window = window.next()?;
            }
            let window_dir = self.layout.window_dir(&window);
            fs_util::ensure_dir(&window_dir)?;

            let log = WindowLog::open(&window_dir, &window)?;
            let summary = match self.prepare_window(&window, &window_dir, &log, &mut scheduled) {
                Ok((records, jobs)) => {
                    let summary = WindowSummary {
                        window: window.to_string(),
                        records,
                        jobs: jobs.len(),
                        error: None,
                    };
                    run.jobs.extend(jobs);
                    summary
                }
                Err(err) => {
                    log.span()
                        .in_scope(|| error!(error = %err, "window processing aborted"));
                    WindowSummary {
                        window: window.to_string(),
                        records: 0,
                        jobs: 0,
                        error: Some(err.to_string()),
                    }
                }
            };
            drop(log);
            run.windows.push(summary);
        }

        Ok(run)
    }

    fn prepare_window<W: Window>(
        &self,
        window: &W,
        window_dir: &Utf8Path,
        log: &WindowLog,
        scheduled: &mut HashSet<String>,
    ) -> Result<(usize, Vec<Job>), RefgetError> {
        let _entered = log.span().enter();

        let list_path = list_file(window_dir);
        if list_path.as_std_path().exists() {
            info!("accessions list already exists, skipping search");
        } else {
            info!("generating accessions list from search scan");
            self.scanner.generate_list(window, &list_path)?;
        }

        let records = read_list(&list_path)?;
        let mut jobs = Vec::new();
        for record in &records {
            let id = match record.unit_id() {
                Ok(id) => id,
                Err(err) => {
                    warn!(accession = %record.identifier, error = %err, "skipping record");
                    continue;
                }
            };
            if scheduled.contains(id.as_str()) {
                warn!(accession = %record.identifier, unit = %id, "unit already scheduled in this run, skipping");
                continue;
            }
            let unit_jobs = self.units.process(window_dir, record);
            if !unit_jobs.is_empty() {
                scheduled.insert(id.as_str().to_string());
            }
            jobs.extend(unit_jobs);
        }
        info!(records = records.len(), jobs = jobs.len(), "window prepared");
        Ok((records.len(), jobs))
    }
}
