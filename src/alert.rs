//! data structures for deserializing incoming alerts
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

/// matches `[ metric='M' labels={K=V,...} value=X ]` records inside a value string
static VALUE_RECORD: Lazy<Regex> = Lazy::new(|| {
	#[allow(clippy::expect_used)]
	Regex::new(r"\[\s*metric='(.*?)'\s*labels=\{(.*?)\}\s*value=(.*?)\s*\]")
		.expect("value record regex is valid")
});

/// matches a single `K=V` pair inside the labels of a value record
static VALUE_LABEL: Lazy<Regex> = Lazy::new(|| {
	#[allow(clippy::expect_used)]
	Regex::new(r"([^=, ]+?)=([^=, ]+)").expect("value label regex is valid")
});

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
/// data from alertmanager (or grafana) received by the webhook receiver
pub struct Notification {
	#[serde_as(as = "DefaultOnNull")]
	#[serde(default)]
	pub alerts: Vec<Alert>,
}

/// the states alertmanager reports, anything else is `Unknown`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertStatus {
	Firing,
	Resolved,
	Unknown,
}

impl From<&str> for AlertStatus {
	fn from(status: &str) -> Self {
		match status {
			"firing" => Self::Firing,
			"resolved" => Self::Resolved,
			_ => Self::Unknown,
		}
	}
}

/// Fields set to `null` deserialize like missing ones.
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	#[serde_as(as = "DefaultOnNull")]
	pub annotations: HashMap<String, String>,
	/// kept verbatim for templates, see [Alert::status]
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "status")]
	pub raw_status: String,
	#[serde_as(as = "DefaultOnNull")]
	pub labels: HashMap<String, String>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "generatorURL")]
	pub generator_url: String,
	/// kept verbatim, only the leading date and time are ever displayed
	#[serde_as(as = "DefaultOnNull")]
	pub starts_at: String,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "valueString")]
	pub value_string: String,
	/// some senders put the value string into `value`, which may also be a number
	#[serde(skip_serializing)]
	pub value: Option<serde_json::Value>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "externalURL")]
	pub external_url: String,
}

/// a single metric sample embedded in the value string of an [Alert]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertValue {
	pub metric: String,
	pub labels: HashMap<String, String>,
	pub value: f64,
}

impl Alert {
	pub fn status(&self) -> AlertStatus {
		AlertStatus::from(self.raw_status.as_str())
	}

	/// `valueString`, or a string `value` if `valueString` is missing
	pub fn value_string(&self) -> &str {
		match &self.value {
			Some(serde_json::Value::String(value)) if self.value_string.is_empty() => value,
			_ => &self.value_string,
		}
	}

	/// Parses the metric samples grafana embeds into the value string.
	///
	/// Records whose value isn't a number are kept with a value of `-1`.
	pub fn values(&self) -> Vec<AlertValue> {
		VALUE_RECORD
			.captures_iter(self.value_string())
			.map(|record| {
				let labels = VALUE_LABEL
					.captures_iter(&record[2])
					.map(|label| (label[1].to_owned(), label[2].to_owned()))
					.collect();

				AlertValue {
					metric: record[1].to_owned(),
					labels,
					value: record[3].trim().parse().unwrap_or(-1.),
				}
			})
			.collect()
	}
}

/// Rounds to two decimal places and drops trailing fractional zeros.
pub fn humanize(value: f64) -> String {
	let rounded = (value * 100.).round() / 100.;
	let formatted = format!("{rounded:.2}");
	let formatted = formatted.trim_end_matches('0').trim_end_matches('.');

	match formatted {
		"-0" => String::from("0"),
		formatted => formatted.to_owned(),
	}
}
