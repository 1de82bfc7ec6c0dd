use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::duration::DurationError;

/// Errors raised while turning a [`Definition`](crate::Definition) into
/// ready-to-spawn options. Always fatal to the affected definition and
/// reported before any process is started.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("command must contain at least the program to run")]
	EmptyCommand,
	#[error("cannot parse termination grace period '{value}': {source}")]
	InvalidDuration {
		value: String,
		#[source]
		source: DurationError,
	},
	#[error("invalid stop signal '{0}'")]
	InvalidSignal(String),
	#[error("{stream} redirection of type 'file' requires a path")]
	EmptyOutputPath { stream: &'static str },
	#[error("replica {replica}: {source}")]
	Template {
		replica: u32,
		#[source]
		source: TemplateError,
	},
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to parse {}: {message}", path.display())]
	Parse { path: PathBuf, message: String },
}

/// A placeholder in one templated field could not be rendered.
#[derive(Debug, Error)]
#[error("cannot render {field}: {source}")]
pub struct TemplateError {
	pub field: String,
	#[source]
	pub source: minijinja::Error,
}

/// A redirection file could not be opened for append.
#[derive(Debug, Error)]
#[error("cannot open {}: {source}", path.display())]
pub struct OutputError {
	pub path: PathBuf,
	#[source]
	pub source: io::Error,
}
