//! prometheus meters of the bridge
//!
//! The meters live in their own [Registry] which is handed to the webhook receiver
//! and the telemetry endpoint, nothing is registered globally.

use prometheus::{opts, Encoder, IntCounter, IntGauge, IntGaugeVec, Registry, TextEncoder};

use crate::gotify::health::Health;

#[derive(Debug, Clone)]
/// counters updated by the webhook receiver and gauges updated on every scrape
pub struct BridgeMetrics {
	registry: Registry,
	/// requests with a parseable body
	requests_received: IntCounter,
	/// requests whose body isn't valid json
	requests_invalid: IntCounter,
	alerts_received: IntCounter,
	/// alerts that couldn't be rendered and weren't sent
	alerts_invalid: IntCounter,
	/// alerts accepted by gotify
	alerts_processed: IntCounter,
	/// alerts gotify didn't accept or couldn't be reached for
	alerts_failed: IntCounter,
	gotify_up: IntGauge,
	gotify_health: IntGauge,
	gotify_database: IntGauge,
}

/// point in time values of the request and alert counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricCounts {
	pub requests_received: u64,
	pub requests_invalid: u64,
	pub alerts_received: u64,
	pub alerts_invalid: u64,
	pub alerts_processed: u64,
	pub alerts_failed: u64,
}

impl BridgeMetrics {
	/// construct and register all meters, every name is prefixed with `namespace`
	pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
		let registry = Registry::new();

		let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
			let counter = IntCounter::with_opts(opts!(name, help).namespace(namespace))?;
			registry.register(Box::new(counter.clone()))?;
			Ok(counter)
		};

		let requests_received = counter("requests_received", "requests with a valid body")?;
		let requests_invalid = counter("requests_invalid", "requests with an invalid body")?;
		let alerts_received = counter("alerts_received", "alerts received")?;
		let alerts_invalid = counter("alerts_invalid", "alerts that could not be rendered")?;
		let alerts_processed = counter("alerts_processed", "alerts dispatched to gotify")?;
		let alerts_failed = counter("alerts_failed", "alerts gotify did not accept")?;

		let gauge = |name: &str, subsystem: &str, help: &str| -> Result<IntGauge, prometheus::Error> {
			let gauge =
				IntGauge::with_opts(opts!(name, help).namespace(namespace).subsystem(subsystem))?;
			registry.register(Box::new(gauge.clone()))?;
			Ok(gauge)
		};

		let gotify_up = gauge("gotify_up", "", "base scrape status for gotify")?;
		let gotify_health = gauge("health", "gotify_health", "gotify health metric 'health'")?;
		let gotify_database = gauge("database", "gotify_health", "gotify health metric 'database'")?;

		let build_info = IntGaugeVec::new(
			opts!("build_info", "version of the bridge, constant 1").namespace(namespace),
			&["version"],
		)?;
		registry.register(Box::new(build_info.clone()))?;
		build_info.with_label_values(&[env!("CARGO_PKG_VERSION")]).set(1);

		Ok(Self {
			registry,
			requests_received,
			requests_invalid,
			alerts_received,
			alerts_invalid,
			alerts_processed,
			alerts_failed,
			gotify_up,
			gotify_health,
			gotify_database,
		})
	}

	pub fn record_request_received(&self) {
		self.requests_received.inc();
	}

	pub fn record_request_invalid(&self) {
		self.requests_invalid.inc();
	}

	pub fn record_alert_received(&self) {
		self.alerts_received.inc();
	}

	pub fn record_alert_invalid(&self) {
		self.alerts_invalid.inc();
	}

	pub fn record_alert_processed(&self) {
		self.alerts_processed.inc();
	}

	pub fn record_alert_failed(&self) {
		self.alerts_failed.inc();
	}

	/// store the result of a gotify health probe
	pub fn record_health(&self, health: &Health) {
		self.gotify_up.set(health.up.into());
		self.gotify_health.set(health.health.into());
		self.gotify_database.set(health.database.into());
	}

	pub fn counts(&self) -> MetricCounts {
		MetricCounts {
			requests_received: self.requests_received.get(),
			requests_invalid: self.requests_invalid.get(),
			alerts_received: self.alerts_received.get(),
			alerts_invalid: self.alerts_invalid.get(),
			alerts_processed: self.alerts_processed.get(),
			alerts_failed: self.alerts_failed.get(),
		}
	}

	/// the text exposition of all meters together with its content type
	pub fn encode(&self) -> Result<(Vec<u8>, String), prometheus::Error> {
		let mut buffer = vec![];
		let encoder = TextEncoder::new();

		encoder.encode(&self.registry.gather(), &mut buffer)?;

		Ok((buffer, encoder.format_type().to_owned()))
	}
}
