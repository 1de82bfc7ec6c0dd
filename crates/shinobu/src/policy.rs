use serde::{Deserialize, Serialize};

/// When a supervised process should be started again after it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
	Never,
	OnFailure,
	#[default]
	Always,
}

/// An external stop always wins over the policy.
pub fn should_restart(policy: RestartPolicy, failed: bool, stop_requested: bool) -> bool {
	if stop_requested {
		return false;
	}
	match policy {
		RestartPolicy::Never => false,
		RestartPolicy::OnFailure => failed,
		RestartPolicy::Always => true,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn never_restarts_after_any_exit() {
		assert!(!should_restart(RestartPolicy::Never, false, false));
		assert!(!should_restart(RestartPolicy::Never, true, false));
	}

	#[test]
	fn on_failure_follows_outcome() {
		assert!(should_restart(RestartPolicy::OnFailure, true, false));
		assert!(!should_restart(RestartPolicy::OnFailure, false, false));
	}

	#[test]
	fn always_restarts_while_running() {
		assert!(should_restart(RestartPolicy::Always, false, false));
		assert!(should_restart(RestartPolicy::Always, true, false));
	}

	#[test]
	fn stop_request_overrides_every_policy() {
		for policy in [RestartPolicy::Never, RestartPolicy::OnFailure, RestartPolicy::Always] {
			for failed in [false, true] {
				assert!(!should_restart(policy, failed, true));
			}
		}
	}

	#[test]
	fn policy_tokens() {
		let p: RestartPolicy = serde_json::from_str(r#""on_failure""#).unwrap();
		assert_eq!(p, RestartPolicy::OnFailure);
		assert!(serde_json::from_str::<RestartPolicy>(r#""sometimes""#).is_err());
	}
}
