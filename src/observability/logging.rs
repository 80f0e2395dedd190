//! Structured logging configuration.

/// Output rendering for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, single-line-per-event text, the default for
    /// interactive use.
    #[default]
    Pretty,
    /// Newline-delimited JSON, suited to log aggregation.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown log format {other:?}, expected pretty or json"
            ))),
        }
    }
}

/// Logging configuration, read from `HIPPOCAMPUS_LOG_FORMAT` /
/// `RUST_LOG` by [`super::init`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Rendering format for emitted log lines.
    pub format: LogFormat,
    /// `EnvFilter` directive string, e.g. `"hippocampus=info,warn"`.
    pub filter_directive: String,
}

const ENV_LOG_FORMAT: &str = "HIPPOCAMPUS_LOG_FORMAT";
const DEFAULT_FILTER: &str = "info";

impl LoggingConfig {
    /// Builds a configuration from the process environment, defaulting to
    /// pretty-printed `info`-level output when unset.
    #[must_use]
    pub fn from_env() -> Self {
        let format = std::env::var(ENV_LOG_FORMAT)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        let filter_directive =
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        Self {
            format,
            filter_directive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn default_format_is_pretty() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }
}
