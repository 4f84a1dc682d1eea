use std::process::ExitCode;

use crewflow_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();
    crewflow_cli::run()
}

/// Best-effort subscriber setup: a broken config file must not prevent the
/// commands (doctor included) from running, so fall back to defaults.
fn init_tracing() {
    let logging = AppConfig::load(LoadOptions::default())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
