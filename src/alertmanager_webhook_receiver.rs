use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    routing::post,
    Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    alert::Notification,
    gotify::Dispatch,
    metrics::BridgeMetrics,
    rendered_alert::{self, AlertSettings},
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlertReceiverSettings {
    pub bind_address: IpAddr,
    pub port: u16,
    pub webhook_path: String,
}

impl AlertReceiverSettings {
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

impl Default for AlertReceiverSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            webhook_path: String::from("/gotify_webhook"),
        }
    }
}

/// everything a webhook request needs, shared by all requests
pub struct State {
    settings: AlertSettings,
    token: String,
    gotify: Arc<dyn Dispatch>,
    metrics: Arc<BridgeMetrics>,
}

impl State {
    /// # Arguments
    ///
    /// * `settings` - how alerts are mapped onto gotify messages
    ///
    /// * `token` - gotify token used unless a request brings its own
    ///
    /// * `gotify` - where rendered alerts are sent to
    ///
    /// * `metrics` - request and alert counters
    pub fn new(
        settings: AlertSettings,
        token: String,
        gotify: Arc<dyn Dispatch>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            settings,
            token,
            gotify,
            metrics,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Handles one webhook request: every alert is transformed and dispatched on its own,
/// the outcomes are joined into one response.
///
/// The response status is the most severe status seen, a single failed alert makes the
/// whole request fail even though the other alerts were delivered.
///
/// # Arguments
///
/// * `state` - shared receiver state
///
/// * `body` - raw request body
///
/// * `token` - gotify token for this request
pub async fn handle_notification(state: &State, body: &[u8], token: &str) -> (StatusCode, String) {
    let State {
        settings,
        gotify,
        metrics,
        ..
    } = state;

    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, String::from("No content sent"));
    }

    let raw_payload = String::from_utf8_lossy(body);

    let notification: Notification = match serde_json::from_slice(body) {
        Ok(notification) => notification,
        Err(err) => {
            tracing::info!("unmarshal of request failed: {err}");
            tracing::debug!("passed data:\n{raw_payload}");
            metrics.record_request_invalid();
            return (StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    metrics.record_request_received();
    tracing::debug!("detected {} alerts", notification.alerts.len());

    let mut status = StatusCode::OK;
    let mut lines = Vec::with_capacity(notification.alerts.len());

    for (idx, alert) in notification.alerts.iter().enumerate() {
        metrics.record_alert_received();
        tracing::debug!("alert {idx}");

        let transformed = rendered_alert::transform(alert, settings, &raw_payload);

        // also when an error notification is sent in place of the alert
        if transformed.error.is_some() {
            status = most_severe(status, StatusCode::BAD_REQUEST);
        }

        if !transformed.proceed {
            metrics.record_alert_invalid();
            lines.push(
                transformed
                    .error
                    .unwrap_or_else(|| String::from("Incomplete request")),
            );
            continue;
        }

        if let Ok(outbound) = serde_json::to_string(&transformed.message) {
            tracing::debug!("dispatching to gotify: {outbound}");
        }

        match gotify.dispatch(&transformed.message, token).await {
            Err(err) => {
                tracing::warn!("alert {idx}: {err}");
                metrics.record_alert_failed();
                status = most_severe(status, StatusCode::INTERNAL_SERVER_ERROR);
                lines.push(err.to_string());
            }
            Ok(response) if response.status != StatusCode::OK => {
                tracing::warn!(
                    "alert {idx}: non-200 response from gotify: {} (enable debug to see body)",
                    response.status
                );
                tracing::debug!("gotify response body: {}", response.body);
                metrics.record_alert_failed();
                status = most_severe(status, response.status);
                lines.push(format!("downstream error: {}", response.status));
            }
            Ok(_) => {
                metrics.record_alert_processed();
                lines.push(match &transformed.error {
                    Some(error) => {
                        format!("Message {idx} dispatched as error notification: {error}")
                    }
                    None => format!("Message {idx} dispatched"),
                });
            }
        }
    }

    (status, lines.join("\n"))
}

/// statuses are ranked by their numeric value, so any error outranks success and
/// server errors outrank client errors
fn most_severe(current: StatusCode, new: StatusCode) -> StatusCode {
    if new.as_u16() > current.as_u16() {
        new
    } else {
        current
    }
}

async fn webhook_receiver(
    Extension(state): Extension<Arc<State>>,
    Query(query): Query<TokenQuery>,
    body: Bytes,
) -> (StatusCode, String) {
    let token = match query.token.as_deref() {
        Some(token) if !token.is_empty() => {
            tracing::debug!("gotify token found in request uri, overriding default token");
            token
        }
        _ => state.token.as_str(),
    };

    handle_notification(&state, &body, token).await
}

/// router serving the webhook on `path`
pub fn router(path: &str, state: Arc<State>) -> Router {
    Router::new()
        .route(path, post(webhook_receiver))
        .layer(Extension(state))
}
