//! gotify `/health` responses

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct HealthResponse {
	#[serde(default)]
	health: String,
	#[serde(default)]
	database: String,
}

/// state of the gotify server as seen by the health probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Health {
	/// gotify answered the probe
	pub up: bool,
	/// gotify reports itself as green
	pub health: bool,
	/// gotify reports its database as green
	pub database: bool,
}

impl Health {
	/// gotify could not be reached
	pub fn unreachable() -> Self {
		Self::default()
	}

	/// Interprets the body of a `/health` response. A body that isn't valid json counts
	/// as reachable but unhealthy.
	pub fn from_body(body: &[u8]) -> Self {
		let response = serde_json::from_slice::<HealthResponse>(body).unwrap_or_else(|err| {
			tracing::warn!("invalid json returned from gotify health endpoint: {err}");
			HealthResponse::default()
		});

		Self { up: true, health: response.health == "green", database: response.database == "green" }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn green_means_healthy() {
		let health = Health::from_body(br#"{"health":"green","database":"green"}"#);
		assert_eq!(health, Health { up: true, health: true, database: true });
	}

	#[test]
	fn other_values_are_unhealthy() {
		let health = Health::from_body(br#"{"health":"orange","database":"green"}"#);
		assert_eq!(health, Health { up: true, health: false, database: true });

		let health = Health::from_body(br#"{"health":"green"}"#);
		assert_eq!(health, Health { up: true, health: true, database: false });
	}

	#[test]
	fn garbage_is_reachable_but_unhealthy() {
		let health = Health::from_body(b"<html>bad gateway</html>");
		assert_eq!(health, Health { up: true, health: false, database: false });
	}

	#[test]
	fn unreachable_is_all_down() {
		assert_eq!(Health::unreachable(), Health { up: false, health: false, database: false });
	}
}
