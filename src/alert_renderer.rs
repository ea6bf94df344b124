//! Renders alert annotations via tera templates.
//!
//! Every call to [render] builds its own [Tera] instance so renders never share state.

use std::collections::HashMap;

use tera::{Context, Tera, Value};
use thiserror::Error;
use url::Url;

use crate::{
	alert::{self, Alert},
	template_functions,
};

/// name the annotation template is registered under
const TEMPLATE_NAME: &str = "annotation";

/// functions alertmanager templates may call that can't be served from a single alert
pub const UNSUPPORTED_FUNCTIONS: [&str; 8] =
	["query", "first", "label", "value", "strvalue", "safeHtml", "sortByLabel", "get_env"];

/// Error occuring while rendering an annotation template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
	#[error("error in template: the bridge does not support the function {0}")]
	UnsupportedFunction(&'static str),
	#[error("error in template: {0}")]
	Syntax(String),
	#[error("error in template: {0}")]
	Evaluation(String),
}

/// Renders `template` against the fields of `alert`.
///
/// # Arguments
///
/// * `template` - annotation value, interpreted as tera template
///
/// * `alert` - the alert whose fields are available inside the template
///
/// * `external_url` - url of the alert source, exposed as `external_url` and `path_prefix`
pub fn render(template: &str, alert: &Alert, external_url: Option<&Url>) -> Result<String, RenderError> {
	if let Some(function) = find_unsupported_function(template) {
		return Err(RenderError::UnsupportedFunction(function));
	}

	let values = serde_json::to_value(alert.values())
		.map_err(|err| RenderError::Evaluation(err.to_string()))?;

	let mut tera = Tera::default();
	template_functions::register(&mut tera);
	tera.register_function("Humanize", humanize);
	{
		let values = values.clone();
		tera.register_function("Values", move |_: &HashMap<String, Value>| -> tera::Result<Value> {
			Ok(values.clone())
		});
	}

	tera.add_raw_template(TEMPLATE_NAME, template)
		.map_err(|err| RenderError::Syntax(describe(&err)))?;

	let mut context = Context::new();
	context.insert("status", &alert.raw_status);
	context.insert("annotations", &alert.annotations);
	context.insert("labels", &alert.labels);
	context.insert("generator_url", &alert.generator_url);
	context.insert("starts_at", &alert.starts_at);
	context.insert("value_string", alert.value_string());
	context.insert("values", &values);
	context.insert("external_url", &external_url.map(Url::as_str).unwrap_or_default());
	context.insert("path_prefix", &external_url.map(Url::path).unwrap_or_default());

	tera.render(TEMPLATE_NAME, &context)
		.map_err(|err| RenderError::Evaluation(describe(&err)))
}

/// `Humanize(value=x)`
fn humanize(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let value = args
		.get("value")
		.ok_or_else(|| tera::Error::msg("Humanize: missing `value` argument"))?;

	Ok(Value::String(alert::humanize(template_functions::to_float("Humanize", value)?)))
}

/// tera only displays the outermost error, the interesting part is further down the chain
fn describe(err: &tera::Error) -> String {
	let mut description = err.to_string();
	let mut source = std::error::Error::source(err);

	while let Some(cause) = source {
		description.push_str(": ");
		description.push_str(&cause.to_string());
		source = cause.source();
	}

	description
}

/// Finds the first unsupported function the template uses.
///
/// A function counts as used when it is the first identifier of a `{{ }}` expression
/// or when it is called (`name(`) anywhere inside a tag. String literals are skipped.
fn find_unsupported_function(template: &str) -> Option<&'static str> {
	let mut rest = template;

	while let Some(open) = rest.find("{{").into_iter().chain(rest.find("{%")).min() {
		let expression = rest[open..].starts_with("{{");
		let body = &rest[open + 2..];

		let (function, end) = scan_tag(body, expression);
		if function.is_some() {
			return function;
		}

		rest = &body[end..];
	}

	None
}

/// Scans a tag body up to its closing delimiter, which only counts outside of string
/// literals. Returns the first unsupported function and the offset behind the tag.
fn scan_tag(body: &str, expression: bool) -> (Option<&'static str>, usize) {
	let close = if expression { "}}" } else { "%}" };
	let mut chars = body.char_indices().peekable();
	// only expressions treat their leading identifier as a call
	let mut leading = expression;

	while let Some((start, c)) = chars.next() {
		if body[start..].starts_with(close) {
			return (None, start + close.len());
		}

		match c {
			'"' | '\'' | '`' => {
				for (_, inner) in chars.by_ref() {
					if inner == c {
						break;
					}
				}
				leading = false;
			}
			c if c.is_alphabetic() || c == '_' => {
				let mut end = start + c.len_utf8();
				while let Some(&(index, next)) = chars.peek() {
					if !(next.is_alphanumeric() || next == '_') {
						break;
					}
					end = index + next.len_utf8();
					chars.next();
				}

				let identifier = &body[start..end];
				let called = body[end..].trim_start().starts_with('(');

				if leading || called {
					if let Some(function) =
						UNSUPPORTED_FUNCTIONS.iter().copied().find(|function| *function == identifier)
					{
						return (Some(function), end);
					}
				}
				leading = false;
			}
			// whitespace control (`{{-`) and whitespace keep us at the start of the expression
			'-' if leading => {}
			c if c.is_whitespace() => {}
			_ => leading = false,
		}
	}

	(None, body.len())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn alert() -> Alert {
		Alert {
			raw_status: String::from("firing"),
			labels: HashMap::from([
				(String::from("instance"), String::from("api:9100")),
				(String::from("job"), String::from("api")),
			]),
			annotations: HashMap::from([(String::from("summary"), String::from("down"))]),
			value_string: String::from("[ metric='load' labels={job=api} value=1.23456 ]"),
			..Default::default()
		}
	}

	#[test]
	fn renders_alert_fields() {
		let rendered =
			render("{{ labels.instance }} is {{ status }}: {{ annotations.summary }}", &alert(), None)
				.unwrap();
		assert_eq!(rendered, "api:9100 is firing: down");
	}

	#[test]
	fn rejects_unsupported_functions_regardless_of_spacing() {
		for template in [
			"{{ query \"up\" }}",
			"{{query \"up\"}}",
			"{{   query }}",
			"{{- query }}",
			"text before {{ labels.job }} {{query}}",
		] {
			assert_eq!(
				render(template, &alert(), None),
				Err(RenderError::UnsupportedFunction("query")),
				"{template}"
			);
		}

		assert_eq!(
			render("{{ sortByLabel }}", &alert(), None),
			Err(RenderError::UnsupportedFunction("sortByLabel"))
		);
		assert_eq!(
			render("{{ labels.job ~ safeHtml(text=\"x\") }}", &alert(), None),
			Err(RenderError::UnsupportedFunction("safeHtml"))
		);
		assert_eq!(
			render("{{ get_env(name=\"GOTIFY_TOKEN\") }}", &alert(), None),
			Err(RenderError::UnsupportedFunction("get_env"))
		);
	}

	#[test]
	fn closing_delimiters_inside_strings_do_not_end_the_tag() {
		assert_eq!(
			render("{{ \"}}\" ~ get_env(name=\"GOTIFY_TOKEN\") }}", &alert(), None),
			Err(RenderError::UnsupportedFunction("get_env"))
		);
		assert_eq!(
			render("{{ '}}' ~ query() }}", &alert(), None),
			Err(RenderError::UnsupportedFunction("query"))
		);
		assert_eq!(
			render("{% set a = \"%}\" ~ get_env(name=\"GOTIFY_TOKEN\") %}{{ a }}", &alert(), None),
			Err(RenderError::UnsupportedFunction("get_env"))
		);
		assert_eq!(render("{{ \"}}\" ~ labels.job }}", &alert(), None).unwrap(), "}}api");
	}

	#[test]
	fn unsupported_function_error_names_the_function() {
		let err = render("{{ first }}", &alert(), None).unwrap_err();
		assert_eq!(err.to_string(), "error in template: the bridge does not support the function first");
	}

	#[test]
	fn similar_identifiers_and_string_literals_are_allowed() {
		assert_eq!(render("{{ \"query\" }}", &alert(), None).unwrap(), "query");
		assert_eq!(render("{{ values | length }}", &alert(), None).unwrap(), "1");
		assert_eq!(render("{{ values.0.metric | upper }}", &alert(), None).unwrap(), "LOAD");
		// tera's own `first` filter stays usable
		assert_eq!(render("{{ values | first | get(key=\"metric\") }}", &alert(), None).unwrap(), "load");
	}

	#[test]
	fn status_is_rendered_verbatim() {
		let alert = Alert { raw_status: String::from("pending"), ..alert() };
		assert_eq!(render("{{ status }}", &alert, None).unwrap(), "pending");
	}

	#[test]
	fn exposes_values_and_humanize() {
		let rendered = render(
			"{% for v in Values() %}{{ v.metric }}={{ Humanize(value=v.value) }} ({{ v.labels.job }}){% endfor %}",
			&alert(),
			None,
		)
		.unwrap();
		assert_eq!(rendered, "load=1.23 (api)");

		assert_eq!(render("{{ Humanize(value=5.0) }}", &alert(), None).unwrap(), "5");
	}

	#[test]
	fn exposes_prometheus_filters() {
		assert_eq!(render("{{ 1234567 | humanize }}", &alert(), None).unwrap(), "1.235M");
		assert_eq!(render("{{ labels.instance | strip_port }}", &alert(), None).unwrap(), "api");
	}

	#[test]
	fn exposes_external_url() {
		let url = Url::parse("http://am.example.com:9093/alertmanager").unwrap();
		let rendered = render("{{ external_url }} {{ path_prefix }}", &alert(), Some(&url)).unwrap();
		assert_eq!(rendered, "http://am.example.com:9093/alertmanager /alertmanager");

		assert_eq!(render("[{{ external_url }}]", &alert(), None).unwrap(), "[]");
	}

	#[test]
	fn malformed_template_is_a_syntax_error() {
		assert!(matches!(render("{{ labels.job", &alert(), None), Err(RenderError::Syntax(_))));
	}

	#[test]
	fn unknown_field_is_an_evaluation_error() {
		match render("{{ missing_field }}", &alert(), None) {
			Err(RenderError::Evaluation(description)) => assert!(description.contains("missing_field")),
			other => panic!("unexpected result {other:?}"),
		}
	}

	#[test]
	fn plain_text_is_returned_unchanged() {
		assert_eq!(render("disk almost full", &alert(), None).unwrap(), "disk almost full");
	}
}
