//! config options for the gotify server alerts are forwarded to

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize)]
/// where and how to reach gotify
pub struct GotifySettings {
	/// message endpoint, `/message` is appended if missing
	pub endpoint: String,
	/// default application token, can be overridden per request
	pub token: String,
	/// timeout of a single request to gotify
	#[serde_as(as = "DurationSeconds<f64>")]
	pub timeout: Duration,
}

impl Default for GotifySettings {
	fn default() -> Self {
		Self {
			endpoint: String::from("http://127.0.0.1:80/message"),
			token: String::new(),
			timeout: Duration::from_secs(5),
		}
	}
}
