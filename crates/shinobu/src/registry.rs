use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};

use crate::backoff::BackoffConfig;
use crate::error::ConfigError;
use crate::replicas;
use crate::supervisor::Supervisor;
use crate::types::{Definition, SupervisorState, SupervisorStatus};

#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisorConfig {
	pub backoff: BackoffConfig,
}

/// The set of supervisors owned by one host application.
pub struct Registry {
	pub config: SupervisorConfig,
	supervisors: RwLock<Vec<Arc<Supervisor>>>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Registry {
	pub fn new(config: SupervisorConfig) -> Arc<Self> {
		Arc::new(Self {
			config,
			supervisors: RwLock::new(Vec::new()),
			tasks: Mutex::new(Vec::new()),
		})
	}

	/// Expands `def` into its replicas and registers one supervisor per
	/// replica. On error nothing is registered for this definition.
	pub async fn provision(&self, def: &Definition) -> Result<Vec<Arc<Supervisor>>, ConfigError> {
		let options = replicas::expand(def)?;
		let created: Vec<Arc<Supervisor>> = options
			.into_iter()
			.map(|opts| Supervisor::new(opts, self.config.backoff))
			.collect();

		tracing::debug!(command = %def.command_line(), replicas = created.len(), "definition provisioned");

		let mut supervisors = self.supervisors.write().await;
		supervisors.extend(created.iter().cloned());
		Ok(created)
	}

	pub async fn supervisors(&self) -> Vec<Arc<Supervisor>> {
		self.supervisors.read().await.clone()
	}

	pub async fn len(&self) -> usize {
		self.supervisors.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.supervisors.read().await.is_empty()
	}

	/// Starts the drive loop of every registered supervisor on its own
	/// task. Supervisors that already ran are left alone.
	pub async fn start_all(&self) {
		let supervisors = self.supervisors.read().await;
		let mut tasks = self.tasks.lock().await;
		for sup in supervisors.iter() {
			if sup.state() != SupervisorState::Idle {
				continue;
			}
			tasks.push(tokio::spawn(Arc::clone(sup).run()));
		}
		tracing::info!(supervisors = supervisors.len(), "supervisors started");
	}

	/// Stops every supervisor concurrently and returns once all of them
	/// have confirmed termination.
	pub async fn stop_all(&self) {
		let supervisors = self.supervisors().await;

		let mut stopping = JoinSet::new();
		for sup in supervisors {
			stopping.spawn(async move { sup.stop().await });
		}
		while let Some(res) = stopping.join_next().await {
			if let Err(e) = res {
				tracing::error!(error = %e, "stop task failed");
			}
		}

		let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
		for task in tasks {
			if let Err(e) = task.await {
				tracing::error!(error = %e, "supervisor task failed");
			}
		}
		tracing::info!("all supervisors stopped");
	}

	pub async fn status(&self) -> Vec<SupervisorStatus> {
		self.supervisors
			.read()
			.await
			.iter()
			.map(|sup| sup.status())
			.collect()
	}
}
