use alertmanager_gotify_bridge::{app, gotify_client, log, settings::Settings};
use anyhow::{Context, Result};

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let settings = Settings::load().context("failed to load settings")?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	let client = gotify_client(&settings.gotify)?;
	let message_url = client.endpoint().message_url().clone();

	let app = app(&settings, client)?;

	let addr = settings.alert_webhook_receiver.to_socket_addr();

	tracing::info!(
		"starting server on http://{addr}{} translating to {}",
		settings.alert_webhook_receiver.webhook_path,
		message_url
	);
	tracing::info!(
		"serving metrics on http://{addr}{}",
		settings.telemetry_endpoint.path
	);

	axum::Server::bind(&addr)
		.serve(app.into_make_service())
		.await
		.context("webhook receiver failed to start or crashed")?;

	Ok(())
}
