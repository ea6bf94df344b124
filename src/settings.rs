use std::ffi::OsString;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use config::Config;
use serde::{Deserialize, Serialize};

use crate::{
    alertmanager_webhook_receiver::AlertReceiverSettings, gotify::settings::GotifySettings,
    log::LogSettings, rendered_alert::AlertSettings,
    telemetry_endpoint::TelemetryEndpointSettings,
};

/// a command line argument, the environment variable backing it and the config key it overrides
struct Argument {
    id: &'static str,
    env: &'static str,
    key: &'static str,
    help: &'static str,
}

const ARGUMENTS: [Argument; 16] = [
    Argument {
        id: "gotify_endpoint",
        env: "GOTIFY_ENDPOINT",
        key: "gotify.endpoint",
        help: "full path to the gotify message endpoint",
    },
    Argument {
        id: "gotify_token",
        env: "GOTIFY_TOKEN",
        key: "gotify.token",
        help: "default gotify application token",
    },
    Argument {
        id: "timeout",
        env: "TIMEOUT",
        key: "gotify.timeout",
        help: "number of seconds to wait for gotify",
    },
    Argument {
        id: "bind_address",
        env: "BIND_ADDRESS",
        key: "alert_webhook_receiver.bind_address",
        help: "address the bridge listens on",
    },
    Argument {
        id: "port",
        env: "PORT",
        key: "alert_webhook_receiver.port",
        help: "port the bridge listens on",
    },
    Argument {
        id: "webhook_path",
        env: "WEBHOOK_PATH",
        key: "alert_webhook_receiver.webhook_path",
        help: "url path alertmanager posts to",
    },
    Argument {
        id: "title_annotation",
        env: "TITLE_ANNOTATION",
        key: "alerts.title_annotation",
        help: "annotation holding the title of the alert",
    },
    Argument {
        id: "message_annotation",
        env: "MESSAGE_ANNOTATION",
        key: "alerts.message_annotation",
        help: "annotation holding the alert message",
    },
    Argument {
        id: "priority_annotation",
        env: "PRIORITY_ANNOTATION",
        key: "alerts.priority_annotation",
        help: "annotation holding the priority of the alert",
    },
    Argument {
        id: "default_priority",
        env: "DEFAULT_PRIORITY",
        key: "alerts.default_priority",
        help: "priority of alerts without priority annotation",
    },
    Argument {
        id: "extended_details",
        env: "EXTENDED_DETAILS",
        key: "alerts.extended_details",
        help: "send html messages with colorized status, start time and a link to the alert source",
    },
    Argument {
        id: "dispatch_errors",
        env: "DISPATCH_ERRORS",
        key: "alerts.dispatch_errors",
        help: "send an error notification when an alert can't be templated",
    },
    Argument {
        id: "metrics_path",
        env: "METRICS_PATH",
        key: "telemetry_endpoint.path",
        help: "url path the metrics are exposed on",
    },
    Argument {
        id: "metrics_namespace",
        env: "METRICS_NAMESPACE",
        key: "telemetry_endpoint.namespace",
        help: "namespace of the exposed metrics",
    },
    Argument {
        id: "metrics_auth_username",
        env: "AUTH_USERNAME",
        key: "telemetry_endpoint.auth_username",
        help: "basic auth username for the metrics endpoint",
    },
    Argument {
        id: "metrics_auth_password",
        env: "AUTH_PASSWORD",
        key: "telemetry_endpoint.auth_password",
        help: "basic auth password for the metrics endpoint",
    },
];

/// switches which may be passed without value
const SWITCHES: [&str; 2] = ["extended_details", "dispatch_errors"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    pub gotify: GotifySettings,
    pub alert_webhook_receiver: AlertReceiverSettings,
    pub alerts: AlertSettings,
    pub telemetry_endpoint: TelemetryEndpointSettings,
    pub log: LogSettings,
}

impl Settings {
    /// load settings from the command line, the environment and an optional config file
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::args_os())
    }

    pub fn load_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let opts = Self::command().get_matches_from(args);

        let settings = Self::merge(&opts)?;
        settings.validate()?;

        Ok(settings)
    }

    fn command() -> Command<'static> {
        let command = Command::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .author(clap::crate_authors!())
            .args(&[
                Arg::new("config")
                    .help("path of an optional config file")
                    .takes_value(true)
                    .short('c')
                    .long("config")
                    .env("CONFIG_FILE"),
                Arg::new("level")
                    .help("log level")
                    .possible_values(["error", "warn", "info", "debug", "trace"])
                    .ignore_case(true)
                    .takes_value(true)
                    .long("log")
                    .env("LOG_LEVEL"),
                Arg::new("debug")
                    .help("shorthand for --log debug")
                    .long("debug"),
            ]);

        ARGUMENTS.iter().fold(command, |command, argument| {
            let arg = Arg::new(argument.id)
                .help(argument.help)
                .long(argument.id)
                .env(argument.env)
                .takes_value(true);

            let arg = match argument.id {
                "gotify_token" | "metrics_auth_password" => arg.hide_env_values(true),
                id if SWITCHES.contains(&id) => {
                    arg.min_values(0).require_equals(true).default_missing_value("true")
                }
                _ => arg,
            };

            command.arg(arg)
        })
    }

    /// defaults < config file < environment and command line
    fn merge(opts: &ArgMatches) -> Result<Self> {
        let defaults = Config::try_from(&Settings::default()).context("invalid default settings")?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = opts.value_of("config") {
            builder = builder.add_source(config::File::from(std::path::Path::new(path)));
        }

        for argument in ARGUMENTS.iter() {
            if let Some(value) = opts.value_of(argument.id) {
                builder = builder.set_override(argument.key, value)?;
            }
        }

        if let Some(level) = opts.value_of("level") {
            builder = builder.set_override("log.level", level)?;
        }
        if opts.is_present("debug") {
            builder = builder.set_override("log.level", "debug")?;
        }

        builder
            .build()
            .context("can't load config")?
            .try_deserialize()
            .context("can't load config")
    }

    fn validate(&self) -> Result<()> {
        if self.gotify.token.is_empty() {
            bail!("the token for the gotify api must be set via --gotify_token or GOTIFY_TOKEN");
        }

        let webhook_path = self.alert_webhook_receiver.webhook_path.as_str();
        let metrics_path = self.telemetry_endpoint.path.as_str();

        for path in [webhook_path, metrics_path] {
            if !path.starts_with('/') {
                bail!("url path {path:?} must start with '/'");
            }
        }
        if webhook_path == metrics_path {
            bail!("webhook path and metrics path must differ (both are {webhook_path:?})");
        }

        Ok(())
    }
}
