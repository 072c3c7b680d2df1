//! `tracing` setup, in the style of `cmd_util::env::config_service`/
//! `config_test`, trimmed to stdout/stderr only: a file-writer layer would
//! depend on `tracing_appender`, which isn't part of this crate's
//! dependency stack (see `DESIGN.md`).

use std::io;

use tracing::Level;
use tracing_subscriber::{
    fmt::format::format,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Call from a CLI tool at startup: errors only, on stderr.
pub fn init_for_tool() {
    init(io::stderr, Level::ERROR)
}

/// Call from a long-running service at startup: info and above, on stdout.
pub fn init_for_service() {
    init(io::stdout, Level::INFO)
}

fn init<W>(writer: W, level: Level)
where
    W: Send + Sync + for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + 'static,
{
    let color_disabled = std::env::var("NO_COLOR").is_ok();
    let format_layer = tracing_subscriber::fmt::layer().with_ansi(!color_disabled).with_writer(writer);
    let format_layer = match std::env::var("LOG_FORMAT") {
        Ok(s) if s == "json" => format_layer.event_format(format().json()).boxed(),
        Ok(s) if s == "pretty" => format_layer.event_format(format().pretty()).boxed(),
        _ => format_layer.event_format(format().compact()).boxed(),
    };
    let format_layer = format_layer
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())))
        .boxed();
    let _ = tracing_subscriber::registry().with(format_layer).try_init();
}

/// Call from test setup. Never panics if tracing was already initialized by
/// another test in the same process.
pub fn init_for_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .compact()
        .try_init();
}
