//! Logging-Bootstrap für Server, Client-Tools und Tests.

use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Maps the number of `-v` flags onto a level filter.
///
/// No flag logs warnings and errors, `-v` adds info, `-vv` debug and
/// anything above that trace.
pub fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global subscriber: one console layer on stderr.
///
/// `RUST_LOG` wins over the verbosity when it is set. Calling this twice is
/// harmless, the second call keeps the first subscriber.
pub fn init(verbosity: u8) {
    let level = level_from_verbosity(verbosity);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let console_layer = fmt::Layer::default()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    if tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}
