use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// Crates whose events fire per read or per socket call.
const WIRE_TARGETS: [&str; 2] = ["chronoamp_frame", "chronoamp_transport"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` everywhere, except that framing and socket chatter stays at
/// `info` until `trace` is asked for. `debug` then shows session decisions
/// (rejected lines, state changes) without one event per read.
fn targets(level: LogLevel) -> Targets {
    let max = level.as_filter();
    let wire = if level == LogLevel::Trace {
        LevelFilter::TRACE
    } else {
        max.min(LevelFilter::INFO)
    };
    WIRE_TARGETS
        .iter()
        .fold(Targets::new().with_default(max), |targets, target| {
            targets.with_target(*target, wire)
        })
}

/// Install the global subscriber. Logs always go to stderr so stdout stays
/// clean for record output.
///
/// Thread names are included: acquisition events come from the
/// `acquisition` thread, display events from `main`.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = tracing_subscriber::registry()
                .with(layer.with_filter(targets(level)))
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::registry()
                .with(layer.json().with_filter(targets(level)))
                .try_init();
        }
    }
}
