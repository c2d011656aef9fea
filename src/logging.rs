use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Safe to call more than once;
/// only the first call installs anything.
pub fn init(settings: &LoggingSettings) {
    let level = settings.level.clone();
    let format = settings.format.clone();

    INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true);

        if format == "pretty" {
            subscriber.pretty().init();
        } else {
            subscriber.init();
        }
    });
}
