//! Per-replica placeholder rendering.
//!
//! Templates use Jinja syntax: `{{ replica_index }}`,
//! `{{ replica_index + 1 }}`, `{{ add(replica_index, 100) }}` or
//! `{{ "worker" | upper }}`. Referencing anything that is not part of the
//! [`TemplateContext`] is an error rather than an empty string.

use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior};
use serde::Serialize;

use crate::error::TemplateError;

/// Values visible to templates.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TemplateContext {
	pub replica_index: u32,
}

impl TemplateContext {
	pub fn new(replica_index: u32) -> Self {
		Self { replica_index }
	}
}

pub struct Renderer {
	env: Environment<'static>,
}

impl Renderer {
	pub fn new() -> Self {
		let mut env = Environment::new();
		env.set_undefined_behavior(UndefinedBehavior::Strict);
		env.set_keep_trailing_newline(true);
		env.add_function("add", |a: i64, b: i64| checked(a.checked_add(b)));
		env.add_function("sub", |a: i64, b: i64| checked(a.checked_sub(b)));
		env.add_function("mul", |a: i64, b: i64| checked(a.checked_mul(b)));
		Self { env }
	}

	/// Renders one field. `field` only labels the error.
	pub fn render(&self, field: &str, text: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
		if !text.contains("{{") && !text.contains("{%") && !text.contains("{#") {
			return Ok(text.to_string());
		}
		self.env.render_str(text, ctx).map_err(|source| TemplateError {
			field: field.to_string(),
			source,
		})
	}
}

fn checked(value: Option<i64>) -> Result<i64, Error> {
	value.ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "integer overflow"))
}

impl Default for Renderer {
	fn default() -> Self {
		Self::new()
	}
}

/// Renders `text` with a throwaway [`Renderer`].
pub fn render(text: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
	Renderer::new().render("template", text, ctx)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn literal_text_passes_through() {
		let ctx = TemplateContext::new(3);
		assert_eq!(render("php-fpm", &ctx).unwrap(), "php-fpm");
		assert_eq!(render("", &ctx).unwrap(), "");
	}

	#[test]
	fn substitutes_replica_index() {
		let ctx = TemplateContext::new(2);
		assert_eq!(render("worker-{{ replica_index }}", &ctx).unwrap(), "worker-2");
		assert_eq!(render("WORKER_NUMBER={{replica_index + 1}}", &ctx).unwrap(), "WORKER_NUMBER=3");
	}

	#[test]
	fn helper_functions() {
		let ctx = TemplateContext::new(4);
		assert_eq!(render("{{ add(1, replica_index) }}", &ctx).unwrap(), "5");
		assert_eq!(render("{{ mul(replica_index, 10) }}", &ctx).unwrap(), "40");
		assert_eq!(render("{{ sub(replica_index, 1) }}", &ctx).unwrap(), "3");
		assert_eq!(render("{{ 'w' | upper }}{{ replica_index }}", &ctx).unwrap(), "W4");
	}

	#[test]
	fn helper_overflow_is_an_error() {
		let ctx = TemplateContext::new(0);
		let err = Renderer::new()
			.render("env.PORT", "{{ add(9223372036854775807, replica_index + 1) }}", &ctx)
			.unwrap_err();
		assert_eq!(err.field, "env.PORT");
		assert!(render("{{ mul(9223372036854775807, 2) }}", &ctx).is_err());
		assert!(render("{{ sub(-9223372036854775807, 2) }}", &ctx).is_err());
	}

	#[test]
	fn undefined_field_is_an_error() {
		let ctx = TemplateContext::new(0);
		let err = Renderer::new().render("dir", "{{ replica }}", &ctx).unwrap_err();
		assert_eq!(err.field, "dir");
	}

	#[test]
	fn invalid_syntax_is_an_error() {
		let ctx = TemplateContext::new(0);
		assert!(render("{{ replica_index", &ctx).is_err());
		assert!(render("{% if %}", &ctx).is_err());
	}
}
