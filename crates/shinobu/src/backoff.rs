use std::time::Duration;

use serde::Deserialize;

/// Tuning for the delay inserted between restarts of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BackoffConfig {
	/// Delay used for the first restart and after every reset.
	#[serde(default = "default_min", deserialize_with = "crate::duration::deserialize")]
	pub min_delay: Duration,
	/// First non-floor delay when growing from a zero floor.
	#[serde(default = "default_first", deserialize_with = "crate::duration::deserialize")]
	pub first_delay: Duration,
	#[serde(default = "default_max", deserialize_with = "crate::duration::deserialize")]
	pub max_delay: Duration,
	/// A run lasting longer than this resets the delay to `min_delay`.
	#[serde(default = "default_reset", deserialize_with = "crate::duration::deserialize")]
	pub reset_after: Duration,
}

fn default_min() -> Duration {
	Duration::ZERO
}
fn default_first() -> Duration {
	Duration::from_secs(1)
}
fn default_max() -> Duration {
	Duration::from_secs(5 * 60)
}
fn default_reset() -> Duration {
	Duration::from_secs(10 * 60)
}

impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			min_delay: default_min(),
			first_delay: default_first(),
			max_delay: default_max(),
			reset_after: default_reset(),
		}
	}
}

/// Per-supervisor restart delay. Doubles after every use up to the
/// ceiling; a stable run brings it back to the floor.
#[derive(Debug, Clone)]
pub struct Backoff {
	config: BackoffConfig,
	delay: Duration,
}

impl Backoff {
	pub fn new(config: BackoffConfig) -> Self {
		Self {
			config,
			delay: config.min_delay,
		}
	}

	pub fn current(&self) -> Duration {
		self.delay
	}

	pub fn reset(&mut self) {
		self.delay = self.config.min_delay;
	}

	/// Returns the wait before the next restart, given how long the
	/// process that just exited had been running.
	pub fn next_delay(&mut self, run_duration: Duration) -> Duration {
		if run_duration > self.config.reset_after {
			self.reset();
		}
		let wait = self.delay;
		self.delay = self.grow(wait);
		wait
	}

	fn grow(&self, delay: Duration) -> Duration {
		let next = if delay.is_zero() {
			self.config.first_delay
		} else {
			delay.saturating_mul(2)
		};
		next.min(self.config.max_delay)
	}
}

impl Default for Backoff {
	fn default() -> Self {
		Self::new(BackoffConfig::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SHORT_RUN: Duration = Duration::from_millis(5);

	#[test]
	fn first_restart_is_immediate() {
		let mut backoff = Backoff::default();
		assert_eq!(backoff.next_delay(SHORT_RUN), Duration::ZERO);
		assert_eq!(backoff.current(), Duration::from_secs(1));
	}

	#[test]
	fn delays_double_up_to_ceiling() {
		let mut backoff = Backoff::default();
		let delays: Vec<u64> = (0..12)
			.map(|_| backoff.next_delay(SHORT_RUN).as_secs())
			.collect();
		assert_eq!(delays, vec![0, 1, 2, 4, 8, 16, 32, 64, 128, 256, 300, 300]);
	}

	#[test]
	fn never_exceeds_ceiling() {
		let mut backoff = Backoff::default();
		for _ in 0..100 {
			assert!(backoff.next_delay(SHORT_RUN) <= Duration::from_secs(300));
		}
	}

	#[test]
	fn stable_run_resets_to_floor() {
		let mut backoff = Backoff::default();
		for _ in 0..6 {
			backoff.next_delay(SHORT_RUN);
		}
		assert_eq!(backoff.current(), Duration::from_secs(32));
		assert_eq!(backoff.next_delay(Duration::from_secs(11 * 60)), Duration::ZERO);
		assert_eq!(backoff.next_delay(SHORT_RUN), Duration::from_secs(1));
	}

	#[test]
	fn run_at_threshold_does_not_reset() {
		let mut backoff = Backoff::default();
		backoff.next_delay(SHORT_RUN);
		backoff.next_delay(SHORT_RUN);
		assert_eq!(backoff.next_delay(Duration::from_secs(10 * 60)), Duration::from_secs(2));
	}

	#[test]
	fn positive_floor_doubles_from_floor() {
		let mut backoff = Backoff::new(BackoffConfig {
			min_delay: Duration::from_secs(10),
			..BackoffConfig::default()
		});
		assert_eq!(backoff.next_delay(SHORT_RUN), Duration::from_secs(10));
		assert_eq!(backoff.next_delay(SHORT_RUN), Duration::from_secs(20));
		assert_eq!(backoff.next_delay(Duration::from_secs(3600)), Duration::from_secs(10));
	}

	#[test]
	fn config_from_toml_strings() {
		let cfg: BackoffConfig = toml::from_str("max_delay = \"30s\"\nreset_after = \"1m\"").unwrap();
		assert_eq!(cfg.max_delay, Duration::from_secs(30));
		assert_eq!(cfg.reset_after, Duration::from_secs(60));
		assert_eq!(cfg.min_delay, Duration::ZERO);
		assert_eq!(cfg.first_delay, Duration::from_secs(1));
	}
}
