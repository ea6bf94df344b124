//! Here we expose prometheus metrics about the bridge and the gotify server behind it
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::{gotify, metrics::BridgeMetrics};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelemetryEndpointSettings {
    pub path: String,
    pub namespace: String,
    #[serde(default)]
    pub auth_username: Option<String>,
    #[serde(default)]
    pub auth_password: Option<String>,
}

impl Default for TelemetryEndpointSettings {
    fn default() -> Self {
        Self {
            path: String::from("/metrics"),
            namespace: String::from("alertmanager_gotify_bridge"),
            auth_username: None,
            auth_password: None,
        }
    }
}

impl TelemetryEndpointSettings {
    /// basic auth is only enabled if both username and password are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.auth_username.as_deref(), self.auth_password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(Credentials {
                    username: username.to_owned(),
                    password: password.to_owned(),
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// checks the `Authorization: Basic ..` header of a request
    fn authorize(&self, headers: &HeaderMap) -> bool {
        let encoded = match headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
        {
            Some(encoded) => encoded.trim(),
            None => return false,
        };

        let decoded = match base64::decode(encoded).map(String::from_utf8) {
            Ok(Ok(decoded)) => decoded,
            _ => return false,
        };

        match decoded.split_once(':') {
            Some((username, password)) => username == self.username && password == self.password,
            None => false,
        }
    }
}

pub struct State {
    gotify: gotify::Client,
    metrics: Arc<BridgeMetrics>,
    credentials: Option<Credentials>,
}

impl State {
    pub fn new(
        gotify: gotify::Client,
        metrics: Arc<BridgeMetrics>,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            gotify,
            metrics,
            credentials,
        }
    }
}

async fn metrics_handler(Extension(state): Extension<Arc<State>>, headers: HeaderMap) -> Response {
    if let Some(credentials) = &state.credentials {
        if !credentials.authorize(&headers) {
            tracing::info!("invalid http auth for the metrics endpoint");
            return (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Basic realm=\"metrics\"")],
                "Invalid username or password",
            )
                .into_response();
        }
    }

    let health = state.gotify.health().await;
    state.metrics.record_health(&health);

    match state.metrics.encode() {
        Ok((buffer, content_type)) => {
            (StatusCode::OK, [(CONTENT_TYPE, content_type)], buffer).into_response()
        }
        Err(err) => {
            tracing::error!("failed to encode metrics: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// router serving the metrics on `path`
pub fn router(path: &str, state: Arc<State>) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .layer(Extension(state))
}
