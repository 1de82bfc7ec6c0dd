//! # shinobu
//!
//! Embeddable process supervisor.
//!
//! Each [`Definition`] is expanded into one or more replicas, every replica
//! gets its own [`Supervisor`] that starts the command, waits for it to
//! exit, restarts it according to its [`RestartPolicy`] with exponential
//! backoff, and terminates it gracefully (stop signal, grace period,
//! `SIGKILL`) on request. A [`Registry`] owned by the host ties the
//! supervisors to the host's own startup and shutdown.
//!
//! Children are placed in their own process group, so this crate only
//! builds for Unix targets.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use shinobu::{Definition, Registry, RestartPolicy, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = Registry::new(SupervisorConfig::default());
//!
//! let mut def = Definition::new(["php-fpm", "--nodaemonize"]);
//! def.replicas = 2;
//! def.restart_policy = RestartPolicy::OnFailure;
//! def.env.insert("WORKER_NUMBER".into(), "{{ replica_index + 1 }}".into());
//!
//! registry.provision(&def).await.unwrap();
//! registry.start_all().await;
//!
//! tokio::signal::ctrl_c().await.unwrap();
//! registry.stop_all().await;
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("shinobu supervises Unix process groups and only supports Unix targets");

pub mod backoff;
pub mod config;
pub mod duration;
pub mod error;
pub mod output;
pub mod policy;
pub mod registry;
pub mod replicas;
pub mod supervisor;
pub mod template;
pub mod types;

pub use backoff::{Backoff, BackoffConfig};
pub use config::HostConfig;
pub use error::{ConfigError, OutputError, TemplateError};
pub use output::OutputTarget;
pub use policy::{should_restart, RestartPolicy};
pub use registry::{Registry, SupervisorConfig};
pub use replicas::expand;
pub use supervisor::Supervisor;
pub use template::TemplateContext;
pub use types::*;
