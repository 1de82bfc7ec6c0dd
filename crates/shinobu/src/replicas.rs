use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::template::{Renderer, TemplateContext};
use crate::types::{Definition, ResolvedOptions};

/// Expands `def` into one [`ResolvedOptions`] per replica, indices
/// `0..replicas`. Nothing is returned unless every replica rendered.
pub fn expand(def: &Definition) -> Result<Vec<ResolvedOptions>, ConfigError> {
	def.validate()?;
	let grace_period = def.grace_period()?;
	let stop_signal = def.signal()?;
	let renderer = Renderer::new();

	(0..def.replica_count())
		.map(|replica| {
			let ctx = TemplateContext::new(replica);
			let render = |field: &str, text: &str| {
				renderer
					.render(field, text, &ctx)
					.map_err(|source| ConfigError::Template { replica, source })
			};

			let command = render("command", &def.command[0])?;
			let args = def.command[1..]
				.iter()
				.enumerate()
				.map(|(i, arg)| render(&format!("args[{}]", i), arg))
				.collect::<Result<Vec<_>, _>>()?;
			let dir = render("dir", &def.dir)?;
			let env = def
				.env
				.iter()
				.map(|(key, value)| Ok((key.clone(), render(&format!("env.{}", key), value)?)))
				.collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

			Ok(ResolvedOptions {
				replica,
				command,
				args,
				dir: if dir.is_empty() { None } else { Some(PathBuf::from(dir)) },
				env,
				redirect_stdout: def.redirect_stdout.clone(),
				redirect_stderr: def.redirect_stderr.clone(),
				restart_policy: def.restart_policy,
				termination_grace_period: grace_period,
				stop_signal,
			})
		})
		.collect()
}
