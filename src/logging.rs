use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// How log events are rendered on stderr.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Installs the global subscriber. Filter comes from `INGEST_LOG`, then
/// `RUST_LOG`, then `info`.
///
/// Events carry `dataset`, `uri` and `dst_prefix` fields where they apply.
/// Calling this twice is harmless; the second call leaves the first subscriber
/// in place.
pub fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("INGEST_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
