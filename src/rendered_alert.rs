//! Turns a single alertmanager alert into a gotify message.
//!
//! Title and message are rendered from annotations via
//! [alert_renderer](crate::alert_renderer), the priority is read from an annotation and
//! extended details decorate the message with html.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::{
	alert::{Alert, AlertStatus},
	alert_renderer,
};

/// title of the notification sent in place of an alert that couldn't be rendered
pub const ERROR_TITLE: &str = "Alertmanager-Gotify-Bridge Error";

/// length of `YYYY-MM-DDTHH:MM:SS`
const START_TIME_LEN: usize = 19;

const RESOLVED_MARKER: &str =
	"<font style='color: #00b339;' data-mx-color='#00b339'>RESOLVED</font><br/> ";
const FIRING_MARKER: &str =
	"<font style='color: #b31e00;' data-mx-color='#b31e00'>FIRING</font><br/> ";

#[derive(Debug, Clone, Deserialize, Serialize)]
/// how alerts are mapped onto gotify messages
pub struct AlertSettings {
	/// annotation rendered into the title
	pub title_annotation: String,
	/// annotation rendered into the message
	pub message_annotation: String,
	/// annotation holding an integer priority
	pub priority_annotation: String,
	/// priority of alerts without (valid) priority annotation
	pub default_priority: i64,
	/// html messages with colorized status, start time and source link
	pub extended_details: bool,
	/// send an error notification instead of dropping alerts that can't be rendered
	pub dispatch_errors: bool,
}

impl Default for AlertSettings {
	fn default() -> Self {
		Self {
			title_annotation: String::from("summary"),
			message_annotation: String::from("description"),
			priority_annotation: String::from("priority"),
			default_priority: 5,
			extended_details: false,
			dispatch_errors: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// body of a gotify `POST /message`
pub struct GotifyMessage {
	pub title: String,
	pub message: String,
	pub priority: i64,
	pub extras: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
/// outcome of [transform]
pub struct Transformed {
	/// the message to send if `proceed` is set
	pub message: GotifyMessage,
	/// whether the message should be sent
	pub proceed: bool,
	/// everything that went wrong, even if an error notification is sent instead
	pub error: Option<String>,
}

/// Maps `alert` onto a gotify message.
///
/// # Arguments
///
/// * `alert` - the alert to transform
///
/// * `settings` - annotation names, default priority and modes
///
/// * `raw_payload` - the request body the alert was part of, quoted in error notifications
pub fn transform(alert: &Alert, settings: &AlertSettings, raw_payload: &str) -> Transformed {
	let external_url = external_url(alert);
	let external_url = external_url.as_ref();

	let mut extras = Map::new();
	let mut title = String::new();
	let mut message = String::new();

	if settings.extended_details {
		extras.insert(String::from("client::display"), json!({ "contentType": "text/html" }));

		match alert.status() {
			AlertStatus::Resolved => {
				message.push_str(RESOLVED_MARKER);
				title.push_str("[RES] ");
			}
			AlertStatus::Firing => {
				message.push_str(FIRING_MARKER);
				title.push_str("[FIR] ");
			}
			AlertStatus::Unknown => {}
		}
	}

	let mut errors = Vec::new();

	match render_annotation(alert, &settings.title_annotation, external_url) {
		Ok(rendered) => title.push_str(&rendered),
		Err(err) => errors.push(err),
	}
	tracing::debug!("title: {title}");

	match render_annotation(alert, &settings.message_annotation, external_url) {
		Ok(rendered) => message.push_str(&rendered),
		Err(err) => errors.push(err),
	}
	tracing::debug!("message: {message}");

	let mut proceed = errors.is_empty();
	let error = (!errors.is_empty()).then(|| errors.join("; "));

	if let Some(error) = &error {
		tracing::debug!("alert can't be rendered: {error}");

		if settings.dispatch_errors {
			proceed = true;
			title = String::from(ERROR_TITLE);
			message = format!(
				"    Error: {error}\n\nAlso check Alertmanager, maybe an alert was raised!\n\nIncoming request:\n{raw_payload}"
			);
		}
	}

	let priority = priority(alert, settings);

	if settings.extended_details {
		if alert.generator_url.starts_with("http") {
			message.push_str(&format!("<br/><a href='{}'>go to source</a>", alert.generator_url));
			extras.insert(
				String::from("client::notification"),
				json!({ "click": { "url": alert.generator_url } }),
			);
		}

		if !alert.starts_at.is_empty() {
			let started = alert.starts_at.get(..START_TIME_LEN).unwrap_or(alert.starts_at.as_str());
			message.push_str(&format!(
				"<br/><br/><i><font style='color: #999999;' data-mx-color='#999999'> alert created at: {started}</font></i><br/>"
			));
		}
	}

	Transformed { message: GotifyMessage { title, message, priority, extras }, proceed, error }
}

/// externalURL if set, otherwise the generatorURL
fn external_url(alert: &Alert) -> Option<Url> {
	let candidate = [&alert.external_url, &alert.generator_url]
		.into_iter()
		.find(|url| !url.is_empty())?;

	match Url::parse(candidate) {
		Ok(url) => Some(url),
		Err(err) => {
			tracing::warn!("external url {candidate:?} of alert can't be parsed: {err}");
			None
		}
	}
}

fn render_annotation(alert: &Alert, key: &str, external_url: Option<&Url>) -> Result<String, String> {
	let template = alert.annotations.get(key).ok_or_else(|| format!("missing annotation: {key}"))?;

	alert_renderer::render(template, alert, external_url).map_err(|err| err.to_string())
}

/// A valid integer in the priority annotation overrides the default priority.
fn priority(alert: &Alert, settings: &AlertSettings) -> i64 {
	let Some(value) = alert.annotations.get(&settings.priority_annotation) else {
		tracing::debug!(
			"priority annotation ({}) missing, falling back to default ({})",
			settings.priority_annotation,
			settings.default_priority
		);
		return settings.default_priority;
	};

	match value.trim().parse::<i64>() {
		Ok(priority) => {
			tracing::debug!("priority: {priority}");
			priority
		}
		Err(err) => {
			tracing::warn!(
				"priority annotation {value:?} is not an integer ({err}), falling back to default ({})",
				settings.default_priority
			);
			settings.default_priority
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn alert(annotations: &[(&str, &str)]) -> Alert {
		Alert {
			raw_status: String::from("firing"),
			annotations: annotations
				.iter()
				.map(|(key, value)| (key.to_string(), value.to_string()))
				.collect(),
			labels: HashMap::from([(String::from("instance"), String::from("db:9100"))]),
			generator_url: String::from("http://prometheus:9090/graph?g0.expr=up"),
			starts_at: String::from("2023-03-01T10:15:30.123456789Z"),
			..Default::default()
		}
	}

	fn complete_alert() -> Alert {
		alert(&[("summary", "{{ labels.instance }} down"), ("description", "it is {{ status }}")])
	}

	#[test]
	fn renders_title_and_message() {
		let transformed = transform(&complete_alert(), &AlertSettings::default(), "");

		assert!(transformed.proceed);
		assert_eq!(transformed.error, None);
		assert_eq!(transformed.message.title, "db:9100 down");
		assert_eq!(transformed.message.message, "it is firing");
		assert_eq!(transformed.message.priority, 5);
		assert!(transformed.message.extras.is_empty());
	}

	#[test]
	fn missing_title_annotation_is_not_dispatched() {
		let transformed = transform(&alert(&[("description", "text")]), &AlertSettings::default(), "");

		assert!(!transformed.proceed);
		assert_eq!(transformed.error.as_deref(), Some("missing annotation: summary"));
	}

	#[test]
	fn missing_message_annotation_is_not_dispatched() {
		let transformed = transform(&alert(&[("summary", "title")]), &AlertSettings::default(), "");

		assert!(!transformed.proceed);
		assert_eq!(transformed.error.as_deref(), Some("missing annotation: description"));
	}

	#[test]
	fn both_errors_are_reported() {
		let transformed = transform(&alert(&[]), &AlertSettings::default(), "");

		assert!(!transformed.proceed);
		assert_eq!(
			transformed.error.as_deref(),
			Some("missing annotation: summary; missing annotation: description")
		);
	}

	#[test]
	fn render_failure_is_not_dispatched() {
		let transformed = transform(
			&alert(&[("summary", "{{ query \"up\" }}"), ("description", "text")]),
			&AlertSettings::default(),
			"",
		);

		assert!(!transformed.proceed);
		assert!(transformed.error.unwrap().contains("does not support the function query"));
	}

	#[test]
	fn dispatch_errors_sends_diagnostic() {
		let settings = AlertSettings { dispatch_errors: true, ..Default::default() };
		let transformed = transform(&alert(&[("description", "text")]), &settings, "{\"alerts\":[]}");

		assert!(transformed.proceed);
		assert_eq!(transformed.message.title, ERROR_TITLE);
		assert!(transformed.message.message.contains("missing annotation: summary"));
		assert!(transformed.message.message.contains("{\"alerts\":[]}"));
		assert_eq!(transformed.error.as_deref(), Some("missing annotation: summary"));
	}

	#[test]
	fn dispatch_errors_covers_message_failures() {
		let settings = AlertSettings { dispatch_errors: true, ..Default::default() };
		let transformed =
			transform(&alert(&[("summary", "ok"), ("description", "{{ nope }}")]), &settings, "");

		assert!(transformed.proceed);
		assert_eq!(transformed.message.title, ERROR_TITLE);
		assert!(transformed.message.message.contains("nope"));
	}

	#[test]
	fn valid_priority_overrides_default() {
		// historically a successfully parsed priority was ignored and only a failed parse
		// touched the priority; a valid annotation is meant to win
		let mut alert = complete_alert();
		alert.annotations.insert(String::from("priority"), String::from("9"));

		assert_eq!(transform(&alert, &AlertSettings::default(), "").message.priority, 9);
	}

	#[test]
	fn invalid_priority_keeps_default() {
		let mut alert = complete_alert();
		alert.annotations.insert(String::from("priority"), String::from("urgent"));

		let settings = AlertSettings { default_priority: 3, ..Default::default() };
		let transformed = transform(&alert, &settings, "");

		assert!(transformed.proceed);
		assert_eq!(transformed.message.priority, 3);
	}

	#[test]
	fn extended_details_decorate_firing_alert() {
		let settings = AlertSettings { extended_details: true, ..Default::default() };
		let transformed = transform(&complete_alert(), &settings, "");
		let message = &transformed.message;

		assert_eq!(message.title, "[FIR] db:9100 down");
		assert!(message.message.starts_with(FIRING_MARKER));
		assert!(message.message.contains("it is firing"));
		assert!(message
			.message
			.contains("<a href='http://prometheus:9090/graph?g0.expr=up'>go to source</a>"));
		assert!(message.message.contains("alert created at: 2023-03-01T10:15:30</font>"));
		assert_eq!(message.extras["client::display"], json!({ "contentType": "text/html" }));
		assert_eq!(
			message.extras["client::notification"],
			json!({ "click": { "url": "http://prometheus:9090/graph?g0.expr=up" } })
		);
	}

	#[test]
	fn extended_details_mark_resolved_alert() {
		let settings = AlertSettings { extended_details: true, ..Default::default() };
		let mut alert = complete_alert();
		alert.raw_status = String::from("resolved");

		let message = transform(&alert, &settings, "").message;
		assert_eq!(message.title, "[RES] db:9100 down");
		assert!(message.message.starts_with(RESOLVED_MARKER));
	}

	#[test]
	fn extended_details_skip_unknown_status_and_relative_source() {
		let settings = AlertSettings { extended_details: true, ..Default::default() };
		let mut alert = complete_alert();
		alert.raw_status = String::from("pending");
		alert.generator_url = String::from("/graph");
		alert.starts_at = String::from("2023-03-01");

		let message = transform(&alert, &settings, "").message;
		assert_eq!(message.title, "db:9100 down");
		assert!(!message.message.contains("go to source"));
		assert!(!message.extras.contains_key("client::notification"));
		assert!(message.message.contains("alert created at: 2023-03-01</font>"));
	}

	#[test]
	fn unparseable_external_url_is_not_fatal() {
		let mut alert = complete_alert();
		alert.external_url = String::from("::not a url::");
		alert.annotations.insert(String::from("summary"), String::from("[{{ external_url }}]"));

		let transformed = transform(&alert, &AlertSettings::default(), "");
		assert!(transformed.proceed);
		assert_eq!(transformed.message.title, "[]");
	}
}
