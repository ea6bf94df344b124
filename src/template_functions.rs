//! prometheus style helper filters available inside alert templates
use std::{collections::HashMap, net::IpAddr};

use chrono::{TimeZone, Utc};
use regex::Regex;
use tera::{try_get_value, Tera, Value};

const SI_PREFIXES: [&str; 8] = ["k", "M", "G", "T", "P", "E", "Z", "Y"];
const SI_SUB_PREFIXES: [&str; 8] = ["m", "u", "n", "p", "f", "a", "z", "y"];
const IEC_PREFIXES: [&str; 8] = ["ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi", "Yi"];

/// register all helper filters on `tera`
pub fn register(tera: &mut Tera) {
	tera.register_filter("humanize", humanize);
	tera.register_filter("humanize1024", humanize1024);
	tera.register_filter("humanize_duration", humanize_duration);
	tera.register_filter("humanize_percentage", humanize_percentage);
	tera.register_filter("humanize_timestamp", humanize_timestamp);
	tera.register_filter("re_replace_all", re_replace_all);
	tera.register_filter("strip_port", strip_port);
	tera.register_filter("strip_domain", strip_domain);
	tera.register_filter("graph_link", graph_link);
	tera.register_filter("table_link", table_link);
}

/// numbers are used as is, strings are parsed
pub(crate) fn to_float(filter: &str, value: &Value) -> tera::Result<f64> {
	match value {
		Value::Number(number) => number
			.as_f64()
			.ok_or_else(|| tera::Error::msg(format!("{filter}: {number} is not a float"))),
		Value::String(string) => string
			.trim()
			.parse()
			.map_err(|_| tera::Error::msg(format!("{filter}: can't convert {string:?} to float"))),
		other => Err(tera::Error::msg(format!("{filter}: can't convert {other} to float"))),
	}
}

/// drop trailing fractional zeros and a dangling decimal point
fn trim_fraction(formatted: &str) -> &str {
	if formatted.contains('.') {
		formatted.trim_end_matches('0').trim_end_matches('.')
	} else {
		formatted
	}
}

/// formats like printf's `%.4g`: four significant digits, exponent notation for very
/// large and very small magnitudes
pub fn format_significant(value: f64) -> String {
	if value.is_nan() {
		return String::from("NaN");
	}
	if value.is_infinite() {
		return String::from(if value > 0. { "+Inf" } else { "-Inf" });
	}
	if value == 0. {
		return String::from("0");
	}

	// let the formatter do the rounding, it also tells us the rounded exponent
	let scientific = format!("{value:.3e}");
	let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
	let exponent: i32 = exponent.parse().unwrap_or(0);

	if !(-4..4).contains(&exponent) {
		let sign = if exponent < 0 { '-' } else { '+' };
		format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
	} else {
		let decimals = (3 - exponent).max(0) as usize;
		trim_fraction(&format!("{value:.decimals$}")).to_owned()
	}
}

fn scale(mut value: f64, base: f64, prefixes: &[&str]) -> String {
	let mut prefix = "";
	for &p in prefixes {
		if value.abs() < base {
			break;
		}
		prefix = p;
		value /= base;
	}
	format!("{}{prefix}", format_significant(value))
}

fn humanize(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
	let mut v = to_float("humanize", value)?;

	if v == 0. || !v.is_finite() {
		return Ok(Value::String(format_significant(v)));
	}
	if v.abs() >= 1. {
		return Ok(Value::String(scale(v, 1000., &SI_PREFIXES)));
	}

	let mut prefix = "";
	for p in SI_SUB_PREFIXES {
		if v.abs() >= 1. {
			break;
		}
		prefix = p;
		v *= 1000.;
	}
	Ok(Value::String(format!("{}{prefix}", format_significant(v))))
}

fn humanize1024(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
	let v = to_float("humanize1024", value)?;

	if v.abs() <= 1. || !v.is_finite() {
		return Ok(Value::String(format_significant(v)));
	}
	Ok(Value::String(scale(v, 1024., &IEC_PREFIXES)))
}

fn humanize_duration(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
	let mut v = to_float("humanize_duration", value)?;

	if !v.is_finite() {
		return Ok(Value::String(format_significant(v)));
	}
	if v == 0. {
		return Ok(Value::String(String::from("0s")));
	}

	if v.abs() >= 1. {
		let sign = if v < 0. { "-" } else { "" };
		v = v.abs();

		let duration = v as i64;
		let seconds = duration % 60;
		let minutes = (duration / 60) % 60;
		let hours = (duration / 60 / 60) % 24;
		let days = duration / 60 / 60 / 24;

		let formatted = if days != 0 {
			format!("{sign}{days}d {hours}h {minutes}m {seconds}s")
		} else if hours != 0 {
			format!("{sign}{hours}h {minutes}m {seconds}s")
		} else if minutes != 0 {
			format!("{sign}{minutes}m {seconds}s")
		} else {
			format!("{sign}{}s", format_significant(v))
		};
		return Ok(Value::String(formatted));
	}

	let mut prefix = "";
	for p in SI_SUB_PREFIXES {
		if v.abs() >= 1. {
			break;
		}
		prefix = p;
		v *= 1000.;
	}
	Ok(Value::String(format!("{}{prefix}s", format_significant(v))))
}

fn humanize_percentage(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
	let v = to_float("humanize_percentage", value)?;
	Ok(Value::String(format!("{}%", format_significant(v * 100.))))
}

fn humanize_timestamp(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
	let v = to_float("humanize_timestamp", value)?;

	if !v.is_finite() {
		return Ok(Value::String(format_significant(v)));
	}

	let nanos = v * 1e9;
	if nanos > i64::MAX as f64 || nanos < i64::MIN as f64 {
		return Err(tera::Error::msg(format!(
			"humanize_timestamp: {v} cannot be represented as a nanoseconds timestamp"
		)));
	}

	let time = Utc.timestamp_nanos(nanos as i64);
	Ok(Value::String(time.format("%Y-%m-%d %H:%M:%S%.f +0000 UTC").to_string()))
}

fn re_replace_all(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
	let text = try_get_value!("re_replace_all", "value", String, value);

	let pattern = match args.get("pattern") {
		Some(pattern) => try_get_value!("re_replace_all", "pattern", String, pattern),
		None => return Err(tera::Error::msg("re_replace_all: missing `pattern` argument")),
	};
	let replacement = match args.get("replacement") {
		Some(replacement) => try_get_value!("re_replace_all", "replacement", String, replacement),
		None => return Err(tera::Error::msg("re_replace_all: missing `replacement` argument")),
	};

	let regex = Regex::new(&pattern)
		.map_err(|err| tera::Error::msg(format!("re_replace_all: invalid pattern: {err}")))?;

	Ok(Value::String(regex.replace_all(&text, replacement.as_str()).into_owned()))
}

/// splits `host:port` (also `[v6]:port`) into its parts
fn split_host_port(host_port: &str) -> Option<(&str, &str)> {
	if let Some(rest) = host_port.strip_prefix('[') {
		let (host, port) = rest.split_once("]:")?;
		return Some((host, port));
	}

	let (host, port) = host_port.rsplit_once(':')?;
	if host.contains(':') {
		return None;
	}
	Some((host, port))
}

fn strip_port(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
	let host_port = try_get_value!("strip_port", "value", String, value);

	let stripped = split_host_port(&host_port).map_or(host_port.as_str(), |(host, _)| host);
	Ok(Value::String(stripped.to_owned()))
}

fn strip_domain(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
	let host_port = try_get_value!("strip_domain", "value", String, value);

	let (host, port) = split_host_port(&host_port).unwrap_or((host_port.as_str(), ""));
	if host.parse::<IpAddr>().is_ok() {
		return Ok(Value::String(host_port));
	}

	let host = host.split('.').next().unwrap_or(host);
	let stripped = if port.is_empty() { host.to_owned() } else { format!("{host}:{port}") };
	Ok(Value::String(stripped))
}

fn expression_link(filter: &str, value: &Value, tab: u8) -> tera::Result<Value> {
	let expression = try_get_value!(filter, "value", String, value);
	let escaped: String = url::form_urlencoded::byte_serialize(expression.as_bytes()).collect();

	Ok(Value::String(format!("/graph?g0.expr={escaped}&g0.tab={tab}")))
}

fn graph_link(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
	expression_link("graph_link", value, 0)
}

fn table_link(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
	expression_link("table_link", value, 1)
}
