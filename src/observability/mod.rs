//! Tracing setup and log hygiene helpers.
//!
//! The library only emits `tracing` events. Installing a subscriber is the
//! host application's call; [`init_tracing`] is a convenience for binaries
//! and tests.

use crate::error::LlmError;

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonCompact,
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
    /// Extra `EnvFilter` directives appended after the crate-level one,
    /// e.g. `reqwest=warn`.
    pub extra_directives: Vec<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
            extra_directives: Vec::new(),
        }
    }
}

impl TracingConfig {
    pub fn debug() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
            ..Self::default()
        }
    }

    pub fn json() -> Self {
        Self {
            output_format: OutputFormat::Json,
            ..Self::default()
        }
    }

    pub fn with_level_str(mut self, level: &str) -> Result<Self, LlmError> {
        self.log_level = match level.to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            other => {
                return Err(LlmError::ConfigurationError(format!(
                    "invalid log level '{other}', expected trace|debug|info|warn|error"
                )));
            }
        };
        Ok(self)
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.extra_directives.push(directive.into());
        self
    }

    fn filter(&self) -> String {
        let level = self.log_level.as_str().to_lowercase();
        let mut filter = format!("chatrelay={level}");
        for d in &self.extra_directives {
            filter.push(',');
            filter.push_str(d);
        }
        filter
    }
}

/// Install a global fmt subscriber. Succeeds quietly when one is already set.
pub fn init_tracing(config: TracingConfig) -> Result<(), LlmError> {
    let filter = config.filter();
    let result = match config.output_format {
        OutputFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init(),
        OutputFormat::JsonCompact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .compact()
            .try_init(),
        OutputFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("global default trace dispatcher has already been set") => {
            Ok(())
        }
        Err(e) => Err(LlmError::ConfigurationError(format!(
            "failed to initialize tracing: {e}"
        ))),
    }
}

/// Mask a credential-like value for logging: keeps a short prefix and
/// suffix of long values, hides short ones entirely.
pub fn mask_sensitive_value(value: &str) -> String {
    let value = value.strip_prefix("Bearer ").unwrap_or(value);
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_keep_only_edges() {
        assert_eq!(mask_sensitive_value("short"), "***");
        let masked = mask_sensitive_value("Bearer sk-abcdefghijklmnop1234");
        assert_eq!(masked, "sk-a...1234");
        assert!(!masked.contains("efghijkl"));
    }

    #[test]
    fn level_parsing_rejects_garbage() {
        assert!(TracingConfig::default().with_level_str("loud").is_err());
        let cfg = TracingConfig::default()
            .with_level_str("DEBUG")
            .unwrap()
            .with_directive("reqwest=warn");
        assert_eq!(cfg.filter(), "chatrelay=debug,reqwest=warn");
    }
}
