//! Run configuration
//!
//! All knobs are fixed when a run starts. Defaults suit a multi-core
//! machine exploring a mid-sized model; the environment can override the
//! page layout without recompiling:
//!
//! ```text
//! TLA_EXPLORE_IN_MEMORY_PAGES=64    pages kept resident before spilling
//! TLA_EXPLORE_PAGE_SIZE=512         fixed states per page
//! TLA_EXPLORE_WORKERS=8             worker threads
//! ```

use crate::page_queue::PageSizing;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_IN_MEMORY_PAGES: &str = "TLA_EXPLORE_IN_MEMORY_PAGES";
pub const ENV_PAGE_SIZE: &str = "TLA_EXPLORE_PAGE_SIZE";
pub const ENV_WORKERS: &str = "TLA_EXPLORE_WORKERS";

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("page size must be at least 1")]
    ZeroPageSize,
    #[error("{0} workers requested (expected <= {})", u16::MAX)]
    TooManyWorkers(usize),
    #[error("spec name must not be empty")]
    EmptySpecName,
    #[error("{var}={value:?} is not a valid number")]
    InvalidEnv { var: &'static str, value: String },
}

/// Parameters of one exploration run
#[derive(Debug, Clone)]
pub struct ExploreConfig {
    /// Worker threads (0 = one per available core)
    pub workers: usize,
    /// States per page
    pub page_sizing: PageSizing,
    /// Pages with an id up to this bound stay in memory; later ones go to disk
    pub in_memory_pages: u64,
    /// Base directory; every run spills pages and writes trace logs in a
    /// fresh subdirectory of it
    pub disk_dir: PathBuf,
    /// File stem of the per-worker trace logs
    pub spec_name: String,
    /// States a worker keeps privately before handing successors to the queue
    pub local_backlog: usize,
    /// Polls a waiting worker makes before donating its held page
    pub donation_retries: u32,
    /// Sleep between polls for a page that is not on disk yet
    pub poll_interval: Duration,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        ExploreConfig {
            workers: 0,
            page_sizing: PageSizing::Stepped,
            in_memory_pages: 1000,
            disk_dir: std::env::temp_dir().join("tla-explore"),
            spec_name: "spec".to_string(),
            local_backlog: 1024,
            donation_retries: 10,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl ExploreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `TLA_EXPLORE_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(pages) = parse_var(&lookup, ENV_IN_MEMORY_PAGES)? {
            self.in_memory_pages = pages;
        }
        if let Some(size) = parse_var(&lookup, ENV_PAGE_SIZE)? {
            self.page_sizing = PageSizing::Fixed(size as usize);
        }
        if let Some(workers) = parse_var(&lookup, ENV_WORKERS)? {
            self.workers = workers as usize;
        }
        Ok(self)
    }

    /// Number of worker threads this run will use.
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism().map_or(4, |p| p.get())
        } else {
            self.workers
        }
    }

    /// Check the configuration before any thread or file is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_sizing == PageSizing::Fixed(0) {
            return Err(ConfigError::ZeroPageSize);
        }
        let workers = self.resolved_workers();
        if workers > u16::MAX as usize {
            return Err(ConfigError::TooManyWorkers(workers));
        }
        if self.spec_name.trim().is_empty() {
            return Err(ConfigError::EmptySpecName);
        }
        Ok(())
    }
}

fn parse_var(
    lookup: &impl Fn(&'static str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_validate() {
        let config = ExploreConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.resolved_workers() >= 1);
        assert_eq!(config.donation_retries, 10);
    }

    #[test]
    fn test_overrides() {
        let config = ExploreConfig::default()
            .with_overrides(lookup(&[
                (ENV_IN_MEMORY_PAGES, "3"),
                (ENV_PAGE_SIZE, " 128 "),
                (ENV_WORKERS, "2"),
            ]))
            .unwrap();
        assert_eq!(config.in_memory_pages, 3);
        assert_eq!(config.page_sizing, PageSizing::Fixed(128));
        assert_eq!(config.resolved_workers(), 2);
    }

    #[test]
    fn test_invalid_override() {
        let err = ExploreConfig::default()
            .with_overrides(lookup(&[(ENV_PAGE_SIZE, "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                var: ENV_PAGE_SIZE,
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ExploreConfig {
            page_sizing: PageSizing::Fixed(0),
            ..ExploreConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPageSize));

        let config = ExploreConfig {
            workers: 70_000,
            ..ExploreConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::TooManyWorkers(70_000)));

        let config = ExploreConfig {
            spec_name: "  ".to_string(),
            ..ExploreConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptySpecName));
    }
}
