//! everything that talks to gotify

use std::borrow::Cow;

use thiserror::Error;
use url::Url;

pub mod health;
pub mod http_client;
pub mod settings;

pub use http_client::{Client, ClientError, Dispatch, DispatchResponse};

/// Error occuring when the configured gotify endpoint is unusable
#[derive(Error, Debug)]
pub enum EndpointError {
	#[error("invalid gotify endpoint {endpoint:?}: {source}")]
	Invalid { endpoint: String, source: url::ParseError },
	#[error("gotify endpoint {0:?} is not an http(s) url")]
	Scheme(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// the message and health urls of a gotify server
pub struct Endpoint {
	message: Url,
	health: Url,
}

impl Endpoint {
	/// Parses the configured endpoint, appending `/message` if it is missing.
	pub fn parse(endpoint: &str) -> Result<Self, EndpointError> {
		let corrected = Self::with_message_suffix(endpoint);
		if corrected != endpoint {
			tracing::warn!(
				"/message not at the end of the gotify endpoint ({endpoint}), using {corrected}"
			);
		}

		let message = Self::parse_url(&corrected)?;

		let base = corrected.strip_suffix("/message").unwrap_or(&corrected);
		let health = Self::parse_url(&format!("{base}/health"))?;

		Ok(Self { message, health })
	}

	fn with_message_suffix(endpoint: &str) -> Cow<'_, str> {
		if endpoint.ends_with("/message") {
			Cow::Borrowed(endpoint)
		} else if endpoint.ends_with('/') {
			Cow::Owned(format!("{endpoint}message"))
		} else {
			Cow::Owned(format!("{endpoint}/message"))
		}
	}

	fn parse_url(endpoint: &str) -> Result<Url, EndpointError> {
		let url = Url::parse(endpoint).map_err(|source| EndpointError::Invalid {
			endpoint: endpoint.to_owned(),
			source,
		})?;

		match url.scheme() {
			"http" | "https" => Ok(url),
			_ => Err(EndpointError::Scheme(endpoint.to_owned())),
		}
	}

	/// url alerts are posted to
	pub fn message_url(&self) -> &Url {
		&self.message
	}

	/// url of the health check
	pub fn health_url(&self) -> &Url {
		&self.health
	}
}
