//! Engine configuration
//!
//! One [`EngineConfig`] is built in `main` from the command line and passed
//! by reference to every entry point.

use crate::core::error::{EngineError, Result};
use std::path::PathBuf;

/// Default upper bound on elements handled by one unit of work
pub const DEFAULT_MAX_PAYLOAD: usize = 10_000_000;

/// Default ceiling on memory-mapped chromosomes per load
pub const DEFAULT_MAX_MAPPED_CHROMOSOMES: usize = 100;

/// Default number of records between progress messages
pub const DEFAULT_REPORT_INTERVAL: usize = 1_000_000;

/// Runtime settings shared by every operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Worker threads
    pub threads: usize,
    /// Maximum elements per chunk task
    pub max_payload: usize,
    /// Ceiling on chromosomes loaded through memory maps
    pub max_mapped_chromosomes: usize,
    /// Parent directory for scratch maps (system temp dir when `None`)
    pub scratch_dir: Option<PathBuf>,
    /// Gzip array files on save
    pub compress: bool,
    /// Records between ingest progress messages
    pub report_interval: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_payload: DEFAULT_MAX_PAYLOAD,
            max_mapped_chromosomes: DEFAULT_MAX_MAPPED_CHROMOSOMES,
            scratch_dir: None,
            compress: true,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn with_max_mapped_chromosomes(mut self, max: usize) -> Self {
        self.max_mapped_chromosomes = max;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_report_interval(mut self, interval: usize) -> Self {
        self.report_interval = interval;
        self
    }

    /// Reject settings no operation can work with
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(EngineError::InvalidParameter("threads must be at least 1".into()));
        }
        if self.max_payload < 2 {
            return Err(EngineError::InvalidParameter(format!(
                "max_payload must be at least 2, got {}",
                self.max_payload
            )));
        }
        if self.report_interval == 0 {
            return Err(EngineError::InvalidParameter("report_interval must be positive".into()));
        }
        if let Some(dir) = &self.scratch_dir {
            if !dir.is_dir() {
                return Err(EngineError::InvalidParameter(format!(
                    "scratch directory {} does not exist",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.threads >= 1);
        assert_eq!(config.max_payload, 10_000_000);
        assert!(config.compress);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_threads() {
        let config = EngineConfig::default().with_threads(0);
        assert!(matches!(config.validate(), Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn test_rejects_missing_scratch_dir() {
        let config = EngineConfig::default().with_scratch_dir("/definitely/not/here");
        assert!(config.validate().is_err());
    }
}
