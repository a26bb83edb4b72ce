//! Scan configuration.
//!
//! [`ScanConfig`] is the per-job option set. Every field has a default, so a
//! host can pass `ScanConfig::default()` and override only what it needs.
//!
//! The CLI resolves a config from layered sources via `figment`:
//! built-in defaults, then a TOML file, then `DUPE_ENGINE_*` environment
//! variables. Command-line flags are applied on top by the caller.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::engine::PlatformHints;
use crate::error::EngineError;
use crate::scanner::{PartialStrategy, DEFAULT_PARTIAL_WINDOW};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "DUPE_ENGINE_";

/// Options for a single scan job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,
    /// Include dot-prefixed (and on Windows, attribute-hidden) entries.
    pub include_hidden: bool,
    /// Files smaller than this are ignored.
    pub min_file_size: u64,
    /// Hashing threads. `None` uses the platform hint, then available parallelism.
    pub worker_pool_size: Option<usize>,
    /// Bytes read per partial digest sample.
    pub partial_hash_window_bytes: usize,
    /// Which regions of a file feed the partial digest.
    pub partial_strategy: PartialStrategy,
    /// Report directories whose entire contents are duplicated.
    pub detect_folders: bool,
    /// Only group files that also share a file name.
    pub filter_by_filename: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: true,
            min_file_size: 0,
            worker_pool_size: None,
            partial_hash_window_bytes: DEFAULT_PARTIAL_WINDOW,
            partial_strategy: PartialStrategy::Prefix,
            detect_folders: true,
            filter_by_filename: false,
        }
    }
}

impl ScanConfig {
    /// Build the layered figment: defaults, optional TOML file, environment.
    ///
    /// When `path` is `None` the platform config file is used if it exists.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = path.map(Path::to_path_buf).or_else(default_config_path);
        if let Some(file) = file {
            log::debug!("Loading configuration from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Resolve the configuration from all layers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if a layer cannot be parsed or the
    /// merged result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let config: Self = Self::figment(path)
            .extract()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no job can run with.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.worker_pool_size == Some(0) {
            return Err(EngineError::Config(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.partial_hash_window_bytes == 0 {
            return Err(EngineError::Config(
                "partial_hash_window_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of hashing threads for a job on this platform.
    #[must_use]
    pub fn resolved_workers(&self, hints: &PlatformHints) -> usize {
        self.worker_pool_size
            .or(hints.worker_threads)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(std::num::NonZeroUsize::get)
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Render as TOML, suitable for a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// The platform-specific config file location, if one exists on disk.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("org", "dupe-engine", "dupe-engine")?;
    let path = dirs.config_dir().join("config.toml");
    path.exists().then_some(path)
}
