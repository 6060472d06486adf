//! Dispatcher configuration.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::spec::ForkMode;

/// Tunables for a [`crate::WorkDispatcher`].
///
/// ```toml
/// max-parallel-workers = 8
/// default-fork-mode = "always"
/// max-idle-daemons-per-profile = 2
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct DispatchConfig {
	/// Upper bound on units obtaining or executing on a worker at once.
	pub max_parallel_workers: usize,
	/// Fork mode used when a submission leaves it unset.
	pub default_fork_mode: ForkMode,
	/// Idle worker daemons retained per profile for reuse.
	pub max_idle_daemons_per_profile: usize,
}

impl Default for DispatchConfig {
	fn default() -> Self {
		Self {
			max_parallel_workers: std::thread::available_parallelism().map_or(4, usize::from),
			default_fork_mode: ForkMode::Auto,
			max_idle_daemons_per_profile: 4,
		}
	}
}

impl DispatchConfig {
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&input)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.max_parallel_workers == 0 {
			return Err(ConfigError::Invalid {
				field: "max-parallel-workers",
				reason: "must be at least 1".to_string(),
			});
		}
		Ok(())
	}
}
