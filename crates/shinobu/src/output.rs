use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, OutputError};

/// Destination of a child's stdout or stderr.
///
/// Encoded as `{"type": "null" | "stdout" | "stderr" | "file", "file": "<path>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTarget", into = "RawTarget")]
pub enum OutputTarget {
	Discard,
	InheritStdout,
	InheritStderr,
	File(PathBuf),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawTarget {
	Null,
	Stdout,
	Stderr,
	File {
		#[serde(default)]
		file: PathBuf,
	},
}

impl From<RawTarget> for OutputTarget {
	fn from(raw: RawTarget) -> Self {
		match raw {
			RawTarget::Null => OutputTarget::Discard,
			RawTarget::Stdout => OutputTarget::InheritStdout,
			RawTarget::Stderr => OutputTarget::InheritStderr,
			RawTarget::File { file } => OutputTarget::File(file),
		}
	}
}

impl From<OutputTarget> for RawTarget {
	fn from(target: OutputTarget) -> Self {
		match target {
			OutputTarget::Discard => RawTarget::Null,
			OutputTarget::InheritStdout => RawTarget::Stdout,
			OutputTarget::InheritStderr => RawTarget::Stderr,
			OutputTarget::File(file) => RawTarget::File { file },
		}
	}
}

impl OutputTarget {
	pub(crate) fn validate(&self, stream: &'static str) -> Result<(), ConfigError> {
		match self {
			OutputTarget::File(path) if path.as_os_str().is_empty() => {
				Err(ConfigError::EmptyOutputPath { stream })
			}
			_ => Ok(()),
		}
	}
}

/// Keeps a redirection file open for the lifetime of one process
/// incarnation. Host streams are never closed.
#[derive(Debug)]
pub struct OutputGuard {
	file: Option<(PathBuf, File)>,
}

impl OutputGuard {
	fn none() -> Self {
		Self { file: None }
	}

	pub fn path(&self) -> Option<&PathBuf> {
		self.file.as_ref().map(|(path, _)| path)
	}

	pub fn release(mut self) {
		if let Some((path, file)) = self.file.take() {
			drop(file);
			tracing::trace!(path = %path.display(), "redirection file closed");
		}
	}
}

/// A sink that drops everything the child writes.
pub fn discard() -> (Stdio, OutputGuard) {
	(Stdio::null(), OutputGuard::none())
}

/// Resolves `target` into a handle the child can write to directly.
pub fn open(target: &OutputTarget) -> Result<(Stdio, OutputGuard), OutputError> {
	match target {
		OutputTarget::Discard => Ok(discard()),
		OutputTarget::InheritStdout => Ok((Stdio::from(io::stdout()), OutputGuard::none())),
		OutputTarget::InheritStderr => Ok((Stdio::from(io::stderr()), OutputGuard::none())),
		OutputTarget::File(path) => {
			let wrap = |source: io::Error| OutputError {
				path: path.clone(),
				source,
			};
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(path)
				.map_err(wrap)?;
			let child_end = file.try_clone().map_err(wrap)?;
			Ok((
				Stdio::from(child_end),
				OutputGuard {
					file: Some((path.clone(), file)),
				},
			))
		}
	}
}
