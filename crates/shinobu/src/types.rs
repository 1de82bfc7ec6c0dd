use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

use crate::duration;
use crate::error::ConfigError;
use crate::output::OutputTarget;
use crate::policy::RestartPolicy;

pub const DEFAULT_GRACE_PERIOD: &str = "10s";
pub const DEFAULT_STOP_SIGNAL: &str = "SIGINT";

/// One command to supervise, as declared by the host configuration.
///
/// `command`, `dir` and every `env` value may contain template
/// placeholders, rendered once per replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Definition {
	/// Program followed by its arguments.
	pub command: Vec<String>,
	/// Number of instances to run. `0` is treated as `1`.
	#[serde(default)]
	pub replicas: u32,
	/// Working directory; empty means the host's current directory.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub dir: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub env: BTreeMap<String, String>,
	#[serde(default = "default_stdout")]
	pub redirect_stdout: OutputTarget,
	#[serde(default = "default_stderr")]
	pub redirect_stderr: OutputTarget,
	#[serde(default)]
	pub restart_policy: RestartPolicy,
	/// Time allowed between the stop signal and `SIGKILL`, e.g. `10s`.
	#[serde(default = "default_grace_period")]
	pub termination_grace_period: String,
	/// Signal sent to the process group to ask for a graceful exit.
	#[serde(default = "default_stop_signal")]
	pub stop_signal: String,
}

fn default_stdout() -> OutputTarget {
	OutputTarget::InheritStdout
}
fn default_stderr() -> OutputTarget {
	OutputTarget::InheritStderr
}
fn default_grace_period() -> String {
	DEFAULT_GRACE_PERIOD.into()
}
fn default_stop_signal() -> String {
	DEFAULT_STOP_SIGNAL.into()
}

impl Definition {
	pub fn new<I, S>(command: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			command: command.into_iter().map(Into::into).collect(),
			replicas: 0,
			dir: String::new(),
			env: BTreeMap::new(),
			redirect_stdout: default_stdout(),
			redirect_stderr: default_stderr(),
			restart_policy: RestartPolicy::default(),
			termination_grace_period: default_grace_period(),
			stop_signal: default_stop_signal(),
		}
	}

	/// Checks everything that can be checked without rendering templates.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.command.is_empty() {
			return Err(ConfigError::EmptyCommand);
		}
		self.redirect_stdout.validate("stdout")?;
		self.redirect_stderr.validate("stderr")?;
		self.grace_period()?;
		self.signal()?;
		Ok(())
	}

	pub fn grace_period(&self) -> Result<Duration, ConfigError> {
		duration::parse(&self.termination_grace_period).map_err(|source| ConfigError::InvalidDuration {
			value: self.termination_grace_period.clone(),
			source,
		})
	}

	pub fn signal(&self) -> Result<Signal, ConfigError> {
		parse_signal(&self.stop_signal)
	}

	pub fn replica_count(&self) -> u32 {
		self.replicas.max(1)
	}

	pub fn command_line(&self) -> String {
		self.command.join(" ")
	}
}

fn parse_signal(name: &str) -> Result<Signal, ConfigError> {
	let upper = name.trim().to_ascii_uppercase();
	let full = if upper.starts_with("SIG") {
		upper
	} else {
		format!("SIG{}", upper)
	};
	full.parse::<Signal>()
		.map_err(|_| ConfigError::InvalidSignal(name.to_string()))
}

/// One replica's fully rendered, ready-to-spawn configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
	pub replica: u32,
	pub command: String,
	pub args: Vec<String>,
	pub dir: Option<PathBuf>,
	pub env: BTreeMap<String, String>,
	pub redirect_stdout: OutputTarget,
	pub redirect_stderr: OutputTarget,
	pub restart_policy: RestartPolicy,
	pub termination_grace_period: Duration,
	pub stop_signal: Signal,
}

impl ResolvedOptions {
	pub fn command_line(&self) -> String {
		std::iter::once(self.command.as_str())
			.chain(self.args.iter().map(String::as_str))
			.collect::<Vec<_>>()
			.join(" ")
	}
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SupervisorState {
	Idle,
	Starting,
	Running { pid: u32 },
	Exited,
	Restarting { delay: Duration },
	Stopped,
}

impl SupervisorState {
	pub fn is_running(&self) -> bool {
		matches!(self, SupervisorState::Running { .. })
	}
}

/// How one process incarnation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
	Success,
	Failed { code: Option<i32>, signal: Option<i32> },
	SpawnFailed { error: String },
	WaitFailed { error: String },
}

impl ExitOutcome {
	pub fn is_failure(&self) -> bool {
		!matches!(self, ExitOutcome::Success)
	}
}

impl fmt::Display for ExitOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExitOutcome::Success => write!(f, "exit 0"),
			ExitOutcome::Failed { code: Some(code), .. } => write!(f, "exit {}", code),
			ExitOutcome::Failed { signal: Some(signal), .. } => write!(f, "killed by signal {}", signal),
			ExitOutcome::Failed { .. } => write!(f, "failed"),
			ExitOutcome::SpawnFailed { error } => write!(f, "spawn failed: {}", error),
			ExitOutcome::WaitFailed { error } => write!(f, "wait failed: {}", error),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
	Started { pid: u32 },
	SpawnFailed { error: String },
	Exited { outcome: ExitOutcome, duration: Duration },
	RestartScheduled { delay: Duration },
	StopRequested { pid: u32, signal: Signal },
	ForceKilled { pid: u32 },
	Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
	pub command: String,
	pub replica: u32,
	#[serde(flatten)]
	pub state: SupervisorState,
	pub restarts: u32,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn definition_defaults_from_json() {
		let def: Definition = serde_json::from_str(r#"{"command": ["php-fpm"]}"#).unwrap();
		assert_eq!(def, Definition::new(["php-fpm"]));
		assert_eq!(def.replica_count(), 1);
		assert_eq!(def.restart_policy, RestartPolicy::Always);
		assert_eq!(def.redirect_stdout, OutputTarget::InheritStdout);
		assert_eq!(def.redirect_stderr, OutputTarget::InheritStderr);
		assert_eq!(def.grace_period().unwrap(), Duration::from_secs(10));
		assert_eq!(def.signal().unwrap(), Signal::SIGINT);
	}

	#[test]
	fn definition_rejects_negative_replicas() {
		let res = serde_json::from_str::<Definition>(r#"{"command": ["x"], "replicas": -1}"#);
		assert!(res.is_err());
	}

	#[test]
	fn validate_reports_each_problem() {
		let def = Definition::new(Vec::<String>::new());
		assert!(matches!(def.validate(), Err(ConfigError::EmptyCommand)));

		let mut def = Definition::new(["sleep", "1"]);
		def.termination_grace_period = "soon".into();
		assert!(matches!(def.validate(), Err(ConfigError::InvalidDuration { .. })));

		let mut def = Definition::new(["sleep", "1"]);
		def.stop_signal = "SIGNOPE".into();
		assert!(matches!(def.validate(), Err(ConfigError::InvalidSignal(_))));

		let mut def = Definition::new(["sleep", "1"]);
		def.redirect_stderr = OutputTarget::File("".into());
		assert!(matches!(
			def.validate(),
			Err(ConfigError::EmptyOutputPath { stream: "stderr" })
		));
	}

	#[test]
	fn signal_names_accept_short_form() {
		let mut def = Definition::new(["x"]);
		def.stop_signal = "term".into();
		assert_eq!(def.signal().unwrap(), Signal::SIGTERM);
	}

	#[test]
	fn outcome_failure_classification() {
		assert!(!ExitOutcome::Success.is_failure());
		assert!(ExitOutcome::Failed { code: Some(1), signal: None }.is_failure());
		assert!(ExitOutcome::SpawnFailed { error: "nope".into() }.is_failure());
		assert_eq!(ExitOutcome::Failed { code: Some(3), signal: None }.to_string(), "exit 3");
	}
}
