use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding extra filter directives.
pub const LOG_FILTER_ENV: &str = "CHRONOLINK_LOG";

/// Crates whose events follow `--log-level`; everything else stays at warn.
const WORKSPACE_TARGETS: [&str; 5] = [
    "chronolink",
    "chronolink_node",
    "chronolink_protocol",
    "chronolink_frame",
    "chronolink_transport",
];

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

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Filter string for `level` over the workspace crates, followed by any
/// `extra` directives so they take precedence for the targets they name.
pub fn filter_directives(level: LogLevel, extra: Option<&str>) -> String {
    let base = match level {
        LogLevel::Error => LogLevel::Error,
        _ => LogLevel::Warn,
    };
    let level = level.directive();
    let mut directives = vec![base.directive().to_string()];
    directives.extend(
        WORKSPACE_TARGETS
            .iter()
            .map(|target| format!("{target}={level}")),
    );
    if let Some(extra) = extra.map(str::trim).filter(|extra| !extra.is_empty()) {
        directives.push(extra.to_string());
    }
    directives.join(",")
}

/// Install the stderr subscriber. A second call is a no-op.
///
/// Directives that fail to parse fall back to the plain level filter.
pub fn init_logging(format: LogFormat, level: LogLevel, extra: Option<&str>) {
    let directives = filter_directives(level, extra);
    let (filter, rejected) = match EnvFilter::try_new(&directives) {
        Ok(filter) => (filter, None),
        Err(err) => (
            EnvFilter::default().add_directive(level.as_filter().into()),
            Some(err),
        ),
    };

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(extra.is_some())
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }

    if let Some(err) = rejected {
        tracing::warn!(%directives, error = %err, "{} ignored", LOG_FILTER_ENV);
    }
}
