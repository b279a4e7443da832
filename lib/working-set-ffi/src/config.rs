//! Logging configuration.

/// Environment variable holding the log filtering directives.
pub const LOG_LEVEL_ENV_VAR: &str = "MEMORY_USAGE_LOG_LEVEL";

/// Environment variable selecting JSON-formatted log output.
pub const LOG_FORMAT_JSON_ENV_VAR: &str = "MEMORY_USAGE_LOG_FORMAT_JSON";

/// Logging configuration.
///
/// Only consulted when logging is explicitly initialized by the host application; the library never reads the
/// environment otherwise.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoggingConfiguration {
    /// Filtering directives, in `EnvFilter` syntax.
    ///
    /// When not set, only warnings and errors are logged.
    pub level_directives: Option<String>,

    /// Whether to format logs as JSON instead of human-readable text.
    pub json: bool,
}

impl LoggingConfiguration {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration using the given lookup function to resolve environment variables.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let level_directives = lookup(LOG_LEVEL_ENV_VAR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let json = lookup(LOG_FORMAT_JSON_ENV_VAR)
            .map(|s| s.trim().to_lowercase())
            .map(|s| s == "true" || s == "1")
            .unwrap_or(false);

        Self { level_directives, json }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> LoggingConfiguration {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        LoggingConfiguration::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        assert_eq!(config_from(&[]), LoggingConfiguration::default());
    }

    #[test]
    fn level_directives() {
        let config = config_from(&[(LOG_LEVEL_ENV_VAR, " working_set=trace ")]);
        assert_eq!(config.level_directives.as_deref(), Some("working_set=trace"));

        let config = config_from(&[(LOG_LEVEL_ENV_VAR, "   ")]);
        assert_eq!(config.level_directives, None);
    }

    #[test]
    fn json_format() {
        for value in ["true", "TRUE", " 1 ", "True"] {
            assert!(config_from(&[(LOG_FORMAT_JSON_ENV_VAR, value)]).json, "{:?} should enable JSON", value);
        }

        for value in ["false", "0", "yes", ""] {
            assert!(!config_from(&[(LOG_FORMAT_JSON_ENV_VAR, value)]).json, "{:?} should not enable JSON", value);
        }
    }
}
