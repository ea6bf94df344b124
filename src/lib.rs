//! webhook receiver for prometheus alertmanager which forwards alerts to a gotify server
//!
//! Features:
//! - every alert becomes its own gotify message, title/message/priority taken from annotations
//! - annotations are rendered as templates with prometheus style helper functions
//! - render failures can be dispatched to gotify as error notifications
//! - per request gotify token via the `token` query parameter
//! - prometheus metrics about processed alerts and the health of the gotify server

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;

use crate::{
	gotify::{settings::GotifySettings, Client},
	metrics::BridgeMetrics,
	settings::Settings,
};

pub mod alert;
pub mod alert_renderer;
pub mod alertmanager_webhook_receiver;
pub mod gotify;
pub mod log;
pub mod metrics;
pub mod rendered_alert;
pub mod settings;
pub mod telemetry_endpoint;
pub mod template_functions;

/// gotify client for the configured (and auto-corrected) endpoint
pub fn gotify_client(settings: &GotifySettings) -> Result<Client> {
	let endpoint = gotify::Endpoint::parse(&settings.endpoint)?;

	Client::new(endpoint, settings.timeout).context("failed to build gotify client")
}

/// Builds the http application: the webhook and the metrics endpoint share one listener.
pub fn app(settings: &Settings, client: Client) -> Result<Router> {
	let metrics = Arc::new(
		BridgeMetrics::new(&settings.telemetry_endpoint.namespace)
			.context("failed to register metrics")?,
	);

	let receiver_state = alertmanager_webhook_receiver::State::new(
		settings.alerts.clone(),
		settings.gotify.token.clone(),
		Arc::new(client.clone()),
		metrics.clone(),
	);

	let telemetry_state = telemetry_endpoint::State::new(
		client,
		metrics,
		settings.telemetry_endpoint.credentials(),
	);

	Ok(alertmanager_webhook_receiver::router(
		&settings.alert_webhook_receiver.webhook_path,
		Arc::new(receiver_state),
	)
	.merge(telemetry_endpoint::router(
		&settings.telemetry_endpoint.path,
		Arc::new(telemetry_state),
	)))
}
