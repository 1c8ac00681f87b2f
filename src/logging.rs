use std::fmt::Display;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::dispatcher::DefaultGuard;
use tracing::level_filters::LevelFilter;
use tracing::{Span, info, info_span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::error::RefgetError;
use crate::fs_util;
use crate::layout::{WINDOW_LOG_FILE, window_log_file};

/// Thread-scoped subscriber writing to stderr and `<window>/logfile.txt`.
/// Dropping it restores the previous subscriber and flushes the file.
pub struct WindowLog {
    span: Span,
    _scope: DefaultGuard,
    _flush: WorkerGuard,
    path: Utf8PathBuf,
}

impl WindowLog {
    pub fn open(window_dir: &Utf8Path, window: &impl Display) -> Result<Self, RefgetError> {
        fs_util::ensure_dir(window_dir)?;
        let path = window_log_file(window_dir);

        let appender = tracing_appender::rolling::never(window_dir.as_std_path(), WINDOW_LOG_FILE);
        let (writer, flush) = tracing_appender::non_blocking(appender);

        let stderr_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(stderr_filter());
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
            .with_filter(LevelFilter::DEBUG);
        let subscriber = Registry::default().with(stderr_layer).with(file_layer);
        let scope = tracing::subscriber::set_default(subscriber);

        let span = info_span!("window", %window);
        span.in_scope(|| info!("logs for records updated on {window}"));

        Ok(Self {
            span,
            _scope: scope,
            _flush: flush,
            path,
        })
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

pub fn stderr_filter() -> EnvFilter {
    EnvFilter::from_default_env()
}
