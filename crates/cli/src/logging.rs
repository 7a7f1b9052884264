use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LEVEL: &str = "info";

/// Install the stderr log layer.
///
/// Filter precedence: `RUST_LOG`, then `--log-level`, then the config's
/// `[logging] level`, then `info`. An unparseable directive falls back to
/// the default level instead of failing the run.
pub fn init(cli_level: Option<&str>, config_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = cli_level.or(config_level).unwrap_or(DEFAULT_LEVEL);
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    });

    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    // A second init (tests driving several commands) is a no-op.
    let _ = tracing_subscriber::registry().with(log_layer).try_init();
}
