use crate::config::LoggingConfig;
use std::io;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

fn parse_level(value: &str) -> Level {
    match value.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn quiet_directive(directive: &str, level: Level) -> tracing_subscriber::filter::Directive {
    directive.parse().unwrap_or_else(|_| level.into())
}

/// Installs the global subscriber. Safe to call once per process; later
/// calls leave the first subscriber in place.
pub fn init_tracing(cfg: &LoggingConfig) {
    let level = parse_level(&cfg.log_level);

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(quiet_directive("hyper=warn", level))
        .add_directive(quiet_directive("tungstenite=warn", level))
        .add_directive(quiet_directive("tokio_tungstenite=warn", level));

    let make_writer = io::stdout;

    let result = if cfg.log_format.to_lowercase() == "pretty" {
        let layer = fmt::layer()
            .with_writer(make_writer)
            .with_ansi(cfg.log_color)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_level(true);

        Registry::default().with(filter).with(layer).try_init()
    } else {
        let layer = fmt::layer()
            .with_writer(make_writer)
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .json()
            .flatten_event(true);

        Registry::default().with(filter).with(layer).try_init()
    };

    if let Err(error) = result {
        tracing::debug!(%error, "tracing subscriber already installed");
    }
}
