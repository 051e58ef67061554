//! Watermark store — the highest ticket id already alerted on.
//!
//! Reads walk the configured sources in order and take the first non-zero
//! value; writes go to every sink. Both directions are best-effort: a broken
//! backend is logged and skipped, never fatal.
//!
//! Backends:
//! - [`EnvOverride`]: externally supplied value (e.g. a CI repository variable), read-only
//! - [`LocalFile`]: single-line decimal file, read and written
//! - [`PipelineOutput`]: appends `next_id=<value>` to a CI step-output file, write-only

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use cwalert_common::config::WatermarkConfig;
use cwalert_common::error::{AppError, AppResult};

/// Key emitted to the pipeline output channel.
pub const PIPELINE_OUTPUT_KEY: &str = "next_id";

/// A place the watermark can be read from.
pub trait WatermarkSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the backend holds no value.
    fn load(&self) -> AppResult<Option<u64>>;
}

/// A place the watermark is persisted to.
pub trait WatermarkSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn store(&self, value: u64) -> AppResult<()>;
}

fn parse_watermark(raw: &str, origin: &str) -> AppResult<Option<u64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| AppError::Persistence(format!("{origin} holds non-numeric value {trimmed:?}")))
}

/// Watermark supplied from outside the process.
pub struct EnvOverride {
    raw: String,
}

impl EnvOverride {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

impl WatermarkSource for EnvOverride {
    fn name(&self) -> &'static str {
        "override"
    }

    fn load(&self) -> AppResult<Option<u64>> {
        parse_watermark(&self.raw, "override")
    }
}

/// Local file holding the decimal watermark.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WatermarkSource for LocalFile {
    fn name(&self) -> &'static str {
        "local_file"
    }

    fn load(&self) -> AppResult<Option<u64>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => parse_watermark(&content, &self.path.display().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl WatermarkSink for LocalFile {
    fn name(&self) -> &'static str {
        "local_file"
    }

    fn store(&self, value: u64) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, value.to_string())?;
        Ok(())
    }
}

/// CI step-output file (`GITHUB_OUTPUT`), appended as `key=value` lines.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    path: PathBuf,
}

impl PipelineOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WatermarkSink for PipelineOutput {
    fn name(&self) -> &'static str {
        "pipeline_output"
    }

    fn store(&self, value: u64) -> AppResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{PIPELINE_OUTPUT_KEY}={value}")?;
        Ok(())
    }
}

/// Ordered read sources plus write sinks.
#[derive(Default)]
pub struct WatermarkStore {
    sources: Vec<Box<dyn WatermarkSource>>,
    sinks: Vec<Box<dyn WatermarkSink>>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard layout: override, then local file for reads; pipeline output
    /// (when available) and local file for writes.
    pub fn from_config(config: &WatermarkConfig) -> Self {
        let file = LocalFile::new(config.file.clone());
        let mut store = Self::new();

        if let Some(raw) = &config.override_value {
            store = store.with_source(EnvOverride::new(raw.clone()));
        }
        store = store.with_source(file.clone());

        if let Some(path) = &config.pipeline_output {
            store = store.with_sink(PipelineOutput::new(path.clone()));
        }
        store.with_sink(file)
    }

    pub fn with_source(mut self, source: impl WatermarkSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn with_sink(mut self, sink: impl WatermarkSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Current watermark; `0` when no source holds a usable non-zero value.
    pub fn read(&self) -> u64 {
        for source in &self.sources {
            match source.load() {
                Ok(Some(value)) if value > 0 => {
                    tracing::debug!(source = source.name(), value, "Watermark loaded");
                    return value;
                }
                Ok(_) => {
                    tracing::debug!(source = source.name(), "No watermark in source, falling back");
                }
                Err(e) => {
                    tracing::warn!(
                        source = source.name(),
                        error = %e,
                        "Unreadable watermark, falling back"
                    );
                }
            }
        }
        0
    }

    /// Persist `value` to every sink.
    ///
    /// Returns the number of sinks that accepted the write.
    pub fn write(&self, value: u64) -> usize {
        let mut accepted = 0;
        for sink in &self.sinks {
            match sink.store(value) {
                Ok(()) => {
                    accepted += 1;
                    tracing::info!(sink = sink.name(), value, "Watermark persisted");
                }
                Err(e) => {
                    tracing::error!(
                        sink = sink.name(),
                        value,
                        error = %e,
                        "Could not persist watermark"
                    );
                }
            }
        }
        accepted
    }
}
