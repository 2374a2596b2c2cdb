use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Overrides `--log-level` with full filter directives, e.g.
/// `bnepkit_peer=debug,bnepkit_frame=trace`.
pub const LOG_ENV: &str = "BNEPKIT_LOG";

/// Library crates whose events the CLI shows at the requested level.
const ENGINE_TARGETS: [&str; 5] = [
    "bnepkit",
    "bnepkit_transport",
    "bnepkit_event",
    "bnepkit_frame",
    "bnepkit_peer",
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

    /// Directives scoping `self` to the bnepkit crates; everything else
    /// stays at `warn`.
    fn directives(self) -> String {
        let level = self.as_filter().to_string().to_lowercase();
        let mut directives = vec!["warn".to_string()];
        for target in ENGINE_TARGETS {
            directives.push(format!("{target}={level}"));
        }
        directives.join(",")
    }
}

fn filter(level: LogLevel) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(raw) if !raw.trim().is_empty() => {
            EnvFilter::try_new(raw).unwrap_or_else(|_| EnvFilter::new(level.directives()))
        }
        _ => EnvFilter::new(level.directives()),
    }
}

/// Install the stderr subscriber. The JSON format keeps the engine's `cid`
/// and `addr` fields machine-readable and includes the emitting crate.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter(level))
        .with_ansi(false);

    let _ = match format {
        LogFormat::Text => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().with_target(true).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_scope_engine_crates() {
        let directives = LogLevel::Debug.directives();
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("bnepkit_peer=debug"));
        assert!(directives.contains("bnepkit_frame=debug"));
        assert_eq!(directives.matches('=').count(), ENGINE_TARGETS.len());
    }

    #[test]
    fn directives_parse_as_env_filter() {
        for level in [LogLevel::Error, LogLevel::Trace] {
            assert!(EnvFilter::try_new(level.directives()).is_ok());
        }
    }
}
