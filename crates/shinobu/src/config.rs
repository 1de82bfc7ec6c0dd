use std::path::Path;

use serde::Deserialize;

use crate::backoff::BackoffConfig;
use crate::error::ConfigError;
use crate::registry::SupervisorConfig;
use crate::types::Definition;

/// Host configuration file: backoff tuning plus the commands to supervise.
///
/// ```toml
/// [backoff]
/// max_delay = "1m"
///
/// [[supervise]]
/// command = ["php-fpm", "--nodaemonize"]
/// replicas = 2
/// restart_policy = "on_failure"
/// env = { WORKER_NUMBER = "{{ replica_index + 1 }}" }
/// redirect_stdout = { type = "file", file = "fpm.log" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
	#[serde(default)]
	pub backoff: BackoffConfig,
	#[serde(default)]
	pub supervise: Vec<Definition>,
}

impl HostConfig {
	pub fn supervisor_config(&self) -> SupervisorConfig {
		SupervisorConfig {
			backoff: self.backoff,
		}
	}

	/// Runs the loader-side checks on every definition. Errors carry the
	/// definition's position in `supervise`.
	pub fn validate(&self) -> Vec<(usize, ConfigError)> {
		self.supervise
			.iter()
			.enumerate()
			.filter_map(|(i, def)| def.validate().err().map(|e| (i, e)))
			.collect()
	}
}

/// Reads `path` as JSON when it ends in `.json`, TOML otherwise.
pub fn load(path: &Path) -> Result<HostConfig, ConfigError> {
	let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
	parse(&content, is_json).map_err(|message| ConfigError::Parse {
		path: path.to_path_buf(),
		message,
	})
}

fn parse(content: &str, is_json: bool) -> Result<HostConfig, String> {
	if is_json {
		serde_json::from_str(content).map_err(|e| e.to_string())
	} else {
		toml::from_str(content).map_err(|e| e.to_string())
	}
}
