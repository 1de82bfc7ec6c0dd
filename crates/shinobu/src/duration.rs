//! Duration strings such as `10s`, `1m30s` or `1.5h`.
//!
//! A duration is a sequence of decimal numbers, each with an optional
//! fraction and a mandatory unit. Valid units are `ns`, `us` (or `µs`),
//! `ms`, `s`, `m` and `h`. The bare string `0` is accepted without a unit.

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

const MAX_FRACTION_DIGITS: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
	#[error("empty duration")]
	Empty,
	#[error("negative durations are not allowed")]
	Negative,
	#[error("invalid number '{0}'")]
	InvalidNumber(String),
	#[error("missing unit after '{0}'")]
	MissingUnit(String),
	#[error("unknown unit '{0}', expected one of ns, us, ms, s, m, h")]
	UnknownUnit(String),
	#[error("duration is too large")]
	Overflow,
}

pub fn parse(input: &str) -> Result<Duration, DurationError> {
	let s = input.trim();
	if s.is_empty() {
		return Err(DurationError::Empty);
	}
	if s.starts_with('-') {
		return Err(DurationError::Negative);
	}
	let s = s.strip_prefix('+').unwrap_or(s);
	if s == "0" {
		return Ok(Duration::ZERO);
	}

	let mut rest = s;
	let mut total: u128 = 0;

	while !rest.is_empty() {
		let number_len = rest
			.find(|c: char| !(c.is_ascii_digit() || c == '.'))
			.unwrap_or(rest.len());
		let number = &rest[..number_len];
		rest = &rest[number_len..];

		let unit_len = rest
			.find(|c: char| c.is_ascii_digit() || c == '.')
			.unwrap_or(rest.len());
		let unit = &rest[..unit_len];
		rest = &rest[unit_len..];

		if number.is_empty() || number == "." {
			return Err(DurationError::InvalidNumber(format!("{}{}", number, unit)));
		}
		if unit.is_empty() {
			return Err(DurationError::MissingUnit(number.to_string()));
		}

		let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit(unit.to_string()))?;
		let nanos = component_nanos(number, scale)?;
		total = total.checked_add(nanos).ok_or(DurationError::Overflow)?;
	}

	let nanos = u64::try_from(total).map_err(|_| DurationError::Overflow)?;
	Ok(Duration::from_nanos(nanos))
}

fn unit_nanos(unit: &str) -> Option<u128> {
	match unit {
		"ns" => Some(1),
		"us" | "µs" | "μs" => Some(1_000),
		"ms" => Some(1_000_000),
		"s" => Some(1_000_000_000),
		"m" => Some(60 * 1_000_000_000),
		"h" => Some(3_600 * 1_000_000_000),
		_ => None,
	}
}

fn component_nanos(number: &str, scale: u128) -> Result<u128, DurationError> {
	let invalid = || DurationError::InvalidNumber(number.to_string());

	let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
	if frac_part.contains('.') {
		return Err(invalid());
	}

	let int: u128 = if int_part.is_empty() {
		0
	} else {
		int_part.parse().map_err(|_| invalid())?
	};
	let mut nanos = int.checked_mul(scale).ok_or(DurationError::Overflow)?;

	let frac_part = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS)];
	if !frac_part.is_empty() {
		let frac: u128 = frac_part.parse().map_err(|_| invalid())?;
		let denom = 10u128.pow(frac_part.len() as u32);
		nanos += frac * scale / denom;
	}

	Ok(nanos)
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
	D: Deserializer<'de>,
{
	let value = String::deserialize(deserializer)?;
	parse(&value).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_single_units() {
		assert_eq!(parse("10s"), Ok(Duration::from_secs(10)));
		assert_eq!(parse("250ms"), Ok(Duration::from_millis(250)));
		assert_eq!(parse("5m"), Ok(Duration::from_secs(300)));
		assert_eq!(parse("2h"), Ok(Duration::from_secs(7200)));
		assert_eq!(parse("7us"), Ok(Duration::from_micros(7)));
		assert_eq!(parse("7µs"), Ok(Duration::from_micros(7)));
		assert_eq!(parse("42ns"), Ok(Duration::from_nanos(42)));
	}

	#[test]
	fn parses_compound_and_fractional() {
		assert_eq!(parse("1m30s"), Ok(Duration::from_secs(90)));
		assert_eq!(parse("1h1m1s"), Ok(Duration::from_secs(3661)));
		assert_eq!(parse("1.5s"), Ok(Duration::from_millis(1500)));
		assert_eq!(parse(".5s"), Ok(Duration::from_millis(500)));
		assert_eq!(parse("+3s"), Ok(Duration::from_secs(3)));
	}

	#[test]
	fn bare_zero_needs_no_unit() {
		assert_eq!(parse("0"), Ok(Duration::ZERO));
		assert_eq!(parse("0s"), Ok(Duration::ZERO));
	}

	#[test]
	fn rejects_malformed_input() {
		assert_eq!(parse(""), Err(DurationError::Empty));
		assert_eq!(parse("-1s"), Err(DurationError::Negative));
		assert_eq!(parse("10"), Err(DurationError::MissingUnit("10".into())));
		assert_eq!(parse("10x"), Err(DurationError::UnknownUnit("x".into())));
		assert_eq!(parse("s"), Err(DurationError::InvalidNumber("s".into())));
		assert_eq!(parse("1.2.3s"), Err(DurationError::InvalidNumber("1.2.3".into())));
	}

	#[test]
	fn rejects_overflow() {
		assert_eq!(parse("99999999999999999999h"), Err(DurationError::Overflow));
	}
}
