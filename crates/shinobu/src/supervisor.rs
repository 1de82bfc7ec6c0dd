use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

use crate::backoff::{Backoff, BackoffConfig};
use crate::output::{self, OutputGuard, OutputTarget};
use crate::policy::should_restart;
use crate::types::*;

const EVENT_CAPACITY: usize = 256;

/// Owns the lifecycle of one replica: spawn, wait, decide, back off,
/// respawn, until stopped.
///
/// The drive loop ([`Supervisor::run`]) and [`Supervisor::stop`] may run on
/// different tasks. The pid of the current incarnation is only published
/// and cleared while holding the `child` lock, and the stop flag is raised
/// under that same lock, so a stop never misses a process that is being
/// spawned.
#[derive(Debug)]
pub struct Supervisor {
	options: ResolvedOptions,
	backoff: BackoffConfig,
	child: Mutex<Option<u32>>,
	stop: watch::Sender<bool>,
	state: watch::Sender<SupervisorState>,
	events: broadcast::Sender<SupervisorEvent>,
	restarts: AtomicU32,
	span: tracing::Span,
}

impl Supervisor {
	pub fn new(options: ResolvedOptions, backoff: BackoffConfig) -> Arc<Self> {
		let span = tracing::info_span!(
			"supervisor",
			command = %options.command_line(),
			replica = options.replica,
		);
		let (stop, _) = watch::channel(false);
		let (state, _) = watch::channel(SupervisorState::Idle);
		let (events, _) = broadcast::channel(EVENT_CAPACITY);

		Arc::new(Self {
			options,
			backoff,
			child: Mutex::new(None),
			stop,
			state,
			events,
			restarts: AtomicU32::new(0),
			span,
		})
	}

	pub fn options(&self) -> &ResolvedOptions {
		&self.options
	}

	pub fn state(&self) -> SupervisorState {
		self.state.borrow().clone()
	}

	pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
		self.state.subscribe()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
		self.events.subscribe()
	}

	/// Pid of the process currently being supervised, if any.
	pub fn pid(&self) -> Option<u32> {
		*self.lock_child()
	}

	pub fn restarts(&self) -> u32 {
		self.restarts.load(Ordering::Relaxed)
	}

	/// True between the start of the drive loop and the first stop request.
	pub fn is_running(&self) -> bool {
		!*self.stop.borrow()
			&& !matches!(*self.state.borrow(), SupervisorState::Idle | SupervisorState::Stopped)
	}

	pub fn status(&self) -> SupervisorStatus {
		SupervisorStatus {
			command: self.options.command_line(),
			replica: self.options.replica,
			state: self.state(),
			restarts: self.restarts(),
		}
	}

	/// Drives the process until supervision ends. A supervisor runs at
	/// most once; calling this again after it started or stopped returns
	/// immediately.
	pub async fn run(self: Arc<Self>) {
		let span = self.span.clone();
		self.drive().instrument(span).await
	}

	/// Stops supervision and waits until the current process, if any, has
	/// exited. Sends the configured stop signal to the process group and
	/// escalates to `SIGKILL` once the grace period runs out.
	pub async fn stop(&self) {
		let span = self.span.clone();
		self.stop_process().instrument(span).await
	}

	/// Resolves once the drive loop has reached [`SupervisorState::Stopped`].
	pub async fn wait_stopped(&self) {
		let mut state = self.state.subscribe();
		let _ = state.wait_for(|s| *s == SupervisorState::Stopped).await;
	}

	async fn drive(&self) {
		let started = self.state.send_if_modified(|state| {
			if *state == SupervisorState::Idle {
				*state = SupervisorState::Starting;
				true
			} else {
				false
			}
		});
		if !started {
			match self.state() {
				SupervisorState::Stopped => tracing::debug!("supervisor stopped before it started"),
				state => tracing::warn!(?state, "supervisor is not idle, not starting"),
			}
			return;
		}

		let mut backoff = Backoff::new(self.backoff);
		let mut stop_rx = self.stop.subscribe();

		loop {
			self.set_state(SupervisorState::Starting);

			let Some((outcome, duration)) = self.incarnation().await else {
				break;
			};

			self.set_state(SupervisorState::Exited);
			match &outcome {
				ExitOutcome::Success => tracing::info!(?duration, "process exited"),
				other => tracing::error!(?duration, outcome = %other, "process exited with error"),
			}
			let failed = outcome.is_failure();
			self.emit(SupervisorEvent::Exited { outcome, duration });

			if !should_restart(self.options.restart_policy, failed, *self.stop.borrow()) {
				break;
			}

			let delay = backoff.next_delay(duration);
			tracing::info!(?delay, "process will restart");
			self.emit(SupervisorEvent::RestartScheduled { delay });
			self.set_state(SupervisorState::Restarting { delay });

			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				_ = async {
					let _ = stop_rx.wait_for(|stop| *stop).await;
				} => break,
			}

			self.restarts.fetch_add(1, Ordering::Relaxed);
		}

		self.set_state(SupervisorState::Stopped);
		self.emit(SupervisorEvent::Stopped);
		tracing::info!("supervision stopped");
	}

	/// Runs one process incarnation to completion. Returns `None` when a
	/// stop arrived before the process could be spawned.
	async fn incarnation(&self) -> Option<(ExitOutcome, Duration)> {
		let (stdout, stdout_guard) = self.open_output("stdout", &self.options.redirect_stdout);
		let (stderr, stderr_guard) = self.open_output("stderr", &self.options.redirect_stderr);

		let mut cmd = Command::new(&self.options.command);
		cmd.args(&self.options.args)
			.envs(&self.options.env)
			.stdin(Stdio::null())
			.stdout(stdout)
			.stderr(stderr)
			// Own process group: host signals are not forwarded and the
			// whole tree can be signalled on stop.
			.process_group(0);
		if let Some(dir) = &self.options.dir {
			cmd.current_dir(dir);
		}

		let started_at = Instant::now();
		let spawned = {
			let mut tracked = self.lock_child();
			if *self.stop.borrow() {
				None
			} else {
				let spawned = cmd.spawn();
				if let Ok(child) = &spawned {
					*tracked = child.id();
				}
				Some(spawned)
			}
		};
		drop(cmd);

		let Some(spawned) = spawned else {
			stdout_guard.release();
			stderr_guard.release();
			return None;
		};

		let outcome = match spawned {
			Err(e) => {
				tracing::error!(error = %e, "failed to start process");
				self.emit(SupervisorEvent::SpawnFailed { error: e.to_string() });
				ExitOutcome::SpawnFailed { error: e.to_string() }
			}
			Ok(mut child) => {
				let pid = child.id().unwrap_or(0);
				tracing::info!(pid, "process started");
				self.emit(SupervisorEvent::Started { pid });
				self.set_state(SupervisorState::Running { pid });

				let status = child.wait().await;
				*self.lock_child() = None;

				match status {
					Ok(status) if status.success() => ExitOutcome::Success,
					Ok(status) => ExitOutcome::Failed {
						code: status.code(),
						signal: status.signal(),
					},
					Err(e) => ExitOutcome::WaitFailed { error: e.to_string() },
				}
			}
		};
		let duration = started_at.elapsed();

		stdout_guard.release();
		stderr_guard.release();

		Some((outcome, duration))
	}

	async fn stop_process(&self) {
		let pid = {
			let tracked = self.lock_child();
			self.stop.send_replace(true);
			self.state.send_if_modified(|state| {
				if *state == SupervisorState::Idle {
					*state = SupervisorState::Stopped;
					true
				} else {
					false
				}
			});
			*tracked
		};

		if let Some(pid) = pid {
			let signal = self.options.stop_signal;
			let grace_period = self.options.termination_grace_period;
			tracing::info!(pid, signal = signal.as_str(), ?grace_period, "stopping process");
			self.emit(SupervisorEvent::StopRequested { pid, signal });

			match deliver(pid, signal) {
				Ok(()) => {
					let stopped = self.wait_stopped();
					tokio::pin!(stopped);
					tokio::select! {
						_ = &mut stopped => return,
						_ = tokio::time::sleep(grace_period) => {
							if self.is_tracking(pid) {
								tracing::warn!(pid, ?grace_period, "termination grace period exceeded, killing");
								self.force_kill(pid);
							}
						}
					}
				}
				Err(Errno::ESRCH) => {
					tracing::debug!(pid, "process already exited before stop signal");
				}
				Err(errno) => {
					tracing::error!(pid, error = %errno, "cannot deliver stop signal, killing");
					self.force_kill(pid);
				}
			}
		}

		self.wait_stopped().await;
	}

	/// Sends `SIGKILL` to the group and to the process itself, as long as
	/// `pid` is still the tracked incarnation. Returns whether anything was
	/// killed.
	fn force_kill(&self, pid: u32) -> bool {
		let tracked = self.lock_child();
		if *tracked != Some(pid) {
			return false;
		}

		let target = Pid::from_raw(pid as i32);
		let group = killpg(target, Signal::SIGKILL);
		let process = kill(target, Signal::SIGKILL);
		drop(tracked);

		match (group, process) {
			(Ok(()), _) | (_, Ok(())) => {
				self.emit(SupervisorEvent::ForceKilled { pid });
				true
			}
			(Err(Errno::ESRCH), Err(Errno::ESRCH)) => {
				tracing::debug!(pid, "process already exited, nothing to kill");
				false
			}
			(Err(group), Err(process)) => {
				tracing::error!(pid, %group, %process, "SIGKILL not delivered");
				false
			}
		}
	}

	fn is_tracking(&self, pid: u32) -> bool {
		*self.lock_child() == Some(pid)
	}

	fn open_output(&self, stream: &'static str, target: &OutputTarget) -> (Stdio, OutputGuard) {
		match output::open(target) {
			Ok(sink) => sink,
			Err(e) => {
				tracing::warn!(stream, error = %e, "cannot set up redirection, discarding");
				output::discard()
			}
		}
	}

	fn lock_child(&self) -> MutexGuard<'_, Option<u32>> {
		self.child.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn set_state(&self, state: SupervisorState) {
		self.state.send_replace(state);
	}

	fn emit(&self, event: SupervisorEvent) {
		let _ = self.events.send(event);
	}
}

/// Signals the process group led by `pid`. Falls back to the process
/// alone when the group is gone, which happens when the child moved
/// itself to another group.
fn deliver(pid: u32, signal: Signal) -> nix::Result<()> {
	let target = Pid::from_raw(pid as i32);
	match killpg(target, signal) {
		Err(Errno::ESRCH) => kill(target, signal),
		other => other,
	}
}
