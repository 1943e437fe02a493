use std::fmt::Display;
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(()),
        }
    }
}

/// Default filter directive for a level; `RUST_LOG` takes precedence.
pub fn default_filter(level: LogLevel) -> String {
    format!("tfemcp={},rmcp=warn,reqwest=warn,hyper=warn", level)
}

/// Install the global subscriber. Logs go to stderr: stdout is the MCP
/// stdio channel.
pub fn init() {
    let level = std::env::var("TFEMCP_LOG_LEVEL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(LogLevel::Info);

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Log debug level message
pub fn debug(message: &str) {
    tracing::debug!("{}", message);
}

/// Log info level message
pub fn info(message: &str) {
    tracing::info!("{}", message);
}

/// Log warning level message
pub fn warn(message: &str) {
    tracing::warn!("{}", message);
}

/// Log error level message
pub fn error(message: &str) {
    tracing::error!("{}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!(" debug ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(
            default_filter(LogLevel::Warning),
            "tfemcp=warn,rmcp=warn,reqwest=warn,hyper=warn"
        );
    }
}
