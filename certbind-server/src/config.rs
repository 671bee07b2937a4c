//! Process configuration.
//!
//! Values come from the environment (after `.env` has been loaded) and are
//! then overridden by command-line flags.

use std::path::PathBuf;

use certbind_auth::CertAuthPolicy;

pub const ENV_DB: &str = "CERTBIND_DB";
pub const ENV_ALLOW_DUPLICATES: &str = "CERTBIND_ALLOW_DUPLICATES";
pub const ENV_ALLOW_RETROACTIVE: &str = "CERTBIND_ALLOW_RETROACTIVE";
pub const ENV_WARN_ONLY: &str = "CERTBIND_WARN_ONLY";
pub const ENV_WEBHOOK_URL: &str = "CERTBIND_WEBHOOK_URL";

/// Effective server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub policy: CertAuthPolicy,
    pub webhook_url: Option<String>,
}

/// Command-line values that take precedence over the environment.
///
/// Boolean flags can only switch a setting on.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<PathBuf>,
    pub allow_duplicates: bool,
    pub allow_retroactive: bool,
    pub warn_only: bool,
    pub webhook_url: Option<String>,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = match lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_db_path(),
        };

        let policy = CertAuthPolicy::default()
            .with_allow_duplicates(parse_flag(ENV_ALLOW_DUPLICATES, &lookup)?)
            .with_allow_retroactive(parse_flag(ENV_ALLOW_RETROACTIVE, &lookup)?)
            .with_warn_only(parse_flag(ENV_WARN_ONLY, &lookup)?);

        let webhook_url = lookup(ENV_WEBHOOK_URL)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Self {
            db_path,
            policy,
            webhook_url,
        })
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(path) = overrides.db_path {
            self.db_path = path;
        }
        if overrides.allow_duplicates {
            self.policy.allow_duplicates = true;
        }
        if overrides.allow_retroactive {
            self.policy.allow_retroactive = true;
        }
        if overrides.warn_only {
            self.policy.warn_only = true;
        }
        if overrides.webhook_url.is_some() {
            self.webhook_url = overrides.webhook_url;
        }
        self
    }
}

/// Default database location under the user's local data directory.
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("certbind")
        .join("certauth.db")
}

fn parse_flag(
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<bool, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool { key, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid boolean for {key}: {value:?}")]
    InvalidBool { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.policy, CertAuthPolicy::default());
        assert!(config.webhook_url.is_none());
        assert!(config.db_path.ends_with("certbind/certauth.db"));
    }

    #[test]
    fn test_reads_environment() {
        let config = config_from(&[
            (ENV_DB, "/var/lib/certbind/assoc.db"),
            (ENV_ALLOW_DUPLICATES, "yes"),
            (ENV_ALLOW_RETROACTIVE, "TRUE"),
            (ENV_WARN_ONLY, "0"),
            (ENV_WEBHOOK_URL, " http://localhost:9000/webhook "),
        ])
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/certbind/assoc.db"));
        assert!(config.policy.allow_duplicates);
        assert!(config.policy.allow_retroactive);
        assert!(!config.policy.warn_only);
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("http://localhost:9000/webhook")
        );
    }

    #[test]
    fn test_invalid_boolean_is_rejected() {
        let err = config_from(&[(ENV_WARN_ONLY, "sometimes")]).unwrap_err();
        assert!(err.to_string().contains(ENV_WARN_ONLY));
        assert!(err.to_string().contains("sometimes"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = config_from(&[(ENV_WEBHOOK_URL, "http://env")])
            .unwrap()
            .with_overrides(ConfigOverrides {
                db_path: Some(PathBuf::from("cli.db")),
                warn_only: true,
                webhook_url: Some("http://cli".into()),
                ..Default::default()
            });

        assert_eq!(config.db_path, PathBuf::from("cli.db"));
        assert!(config.policy.warn_only);
        assert!(!config.policy.allow_duplicates);
        assert_eq!(config.webhook_url.as_deref(), Some("http://cli"));
    }

    #[test]
    fn test_empty_webhook_url_is_unset() {
        let config = config_from(&[(ENV_WEBHOOK_URL, "  ")]).unwrap();
        assert!(config.webhook_url.is_none());
    }
}
