use std::time::Duration;

use async_trait::async_trait;
use http::{header::InvalidHeaderValue, HeaderValue, StatusCode};
use thiserror::Error;

use super::{health::Health, Endpoint};
use crate::rendered_alert::GotifyMessage;

/// header carrying the gotify application token
const TOKEN_HEADER: &str = "X-Gotify-Key";

/// Error occuring while talking to gotify
#[derive(Error, Debug)]
pub enum ClientError {
	#[error("failed to build http client: {0}")]
	Build(#[source] reqwest::Error),
	#[error("error dispatching to gotify: {0}")]
	Request(#[from] reqwest::Error),
	#[error("invalid gotify token: {0}")]
	Token(#[from] InvalidHeaderValue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// what gotify answered to a dispatched message
pub struct DispatchResponse {
	pub status: StatusCode,
	pub body: String,
}

/// Sends a single message to gotify. Each call is a single attempt, there are no retries.
#[async_trait]
pub trait Dispatch: Send + Sync {
	async fn dispatch(
		&self,
		message: &GotifyMessage,
		token: &str,
	) -> Result<DispatchResponse, ClientError>;
}

#[derive(Debug, Clone)]
/// http client for the gotify message api
pub struct Client {
	client: reqwest::Client,
	endpoint: Endpoint,
}

impl Client {
	/// every request made by the client is bounded by `timeout`
	pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, ClientError> {
		let client = reqwest::Client::builder().timeout(timeout).build().map_err(ClientError::Build)?;

		Ok(Self { client, endpoint })
	}

	pub fn endpoint(&self) -> &Endpoint {
		&self.endpoint
	}

	/// Probes the gotify health endpoint. Never fails, an unreachable server is reported
	/// as such.
	pub async fn health(&self) -> Health {
		let response = match self.client.get(self.endpoint.health_url().clone()).send().await {
			Ok(response) => response,
			Err(err) => {
				tracing::warn!("error getting health information from gotify: {err}");
				return Health::unreachable();
			}
		};

		match response.bytes().await {
			Ok(body) => Health::from_body(&body),
			Err(err) => {
				tracing::warn!("error reading health status from gotify response: {err}");
				Health { up: true, ..Health::unreachable() }
			}
		}
	}
}

#[async_trait]
impl Dispatch for Client {
	async fn dispatch(
		&self,
		message: &GotifyMessage,
		token: &str,
	) -> Result<DispatchResponse, ClientError> {
		let token = HeaderValue::from_str(token)?;

		let response = self
			.client
			.post(self.endpoint.message_url().clone())
			.header(TOKEN_HEADER, token)
			.json(message)
			.send()
			.await?;

		let status = response.status();
		let body = response.text().await?;

		tracing::debug!("gotify answered {status}: {body}");

		Ok(DispatchResponse { status, body })
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use wiremock::{
		matchers::{body_json, header, method, path},
		Mock, MockServer, ResponseTemplate,
	};

	use super::*;

	fn message() -> GotifyMessage {
		GotifyMessage {
			title: String::from("disk full"),
			message: String::from("/var is at 99%"),
			priority: 8,
			extras: serde_json::Map::new(),
		}
	}

	fn client(server: &MockServer, timeout: Duration) -> Client {
		let endpoint = Endpoint::parse(&server.uri()).unwrap();
		Client::new(endpoint, timeout).unwrap()
	}

	#[tokio::test]
	async fn posts_message_with_token() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.and(path("/message"))
			.and(header("X-Gotify-Key", "secret"))
			.and(header("content-type", "application/json"))
			.and(body_json(json!({
				"title": "disk full",
				"message": "/var is at 99%",
				"priority": 8,
				"extras": {}
			})))
			.respond_with(ResponseTemplate::new(200).set_body_string("{\"id\":1}"))
			.expect(1)
			.mount(&server)
			.await;

		let response =
			client(&server, Duration::from_secs(5)).dispatch(&message(), "secret").await.unwrap();

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(response.body, "{\"id\":1}");
	}

	#[tokio::test]
	async fn non_success_status_is_returned_not_raised() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;

		let response =
			client(&server, Duration::from_secs(5)).dispatch(&message(), "secret").await.unwrap();

		assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
	}

	#[tokio::test]
	async fn timeout_is_an_error() {
		let server = MockServer::start().await;

		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
			.mount(&server)
			.await;

		let result =
			client(&server, Duration::from_millis(50)).dispatch(&message(), "secret").await;

		assert!(matches!(result, Err(ClientError::Request(_))));
	}

	#[tokio::test]
	async fn unreachable_server_is_an_error() {
		let endpoint = Endpoint::parse("http://127.0.0.1:1/message").unwrap();
		let client = Client::new(endpoint, Duration::from_secs(1)).unwrap();

		assert!(matches!(
			client.dispatch(&message(), "secret").await,
			Err(ClientError::Request(_))
		));
		assert_eq!(client.health().await, Health::unreachable());
	}

	#[test]
	fn client_uses_corrected_endpoint() {
		let endpoint = Endpoint::parse("http://gotify.example.com/app").unwrap();
		let client = Client::new(endpoint, Duration::from_secs(1)).unwrap();

		assert_eq!(client.endpoint().message_url().as_str(), "http://gotify.example.com/app/message");
	}

	#[tokio::test]
	async fn token_with_newline_is_rejected() {
		let endpoint = Endpoint::parse("http://127.0.0.1:1/message").unwrap();
		let client = Client::new(endpoint, Duration::from_secs(1)).unwrap();

		assert!(matches!(
			client.dispatch(&message(), "bad\ntoken").await,
			Err(ClientError::Token(_))
		));
	}

	#[tokio::test]
	async fn health_is_probed() {
		let server = MockServer::start().await;

		Mock::given(method("GET"))
			.and(path("/health"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(json!({ "health": "green", "database": "orange" })),
			)
			.expect(1)
			.mount(&server)
			.await;

		let health = client(&server, Duration::from_secs(5)).health().await;
		assert_eq!(health, Health { up: true, health: true, database: false });
	}
}
