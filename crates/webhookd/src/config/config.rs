use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use tracing_subscriber::filter::LevelFilter;

use super::diagnostics::{format_diagnostics, Diagnostic, ValidationError};
use super::partial::{PartialConfig, PartialSwitch};
use crate::auth::MIN_SECRET_LEN;
use crate::gateway::HomeAssistantConfig;
use crate::registry::{is_valid_switch_id, Switch, DEFAULT_ICON};

/// Environment variable holding the supervisor token when running as an add-on
pub const SUPERVISOR_TOKEN_ENV: &str = "SUPERVISOR_TOKEN";

const DEFAULT_LISTEN: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8099;
const DEFAULT_HA_URL: &str = "http://supervisor/core";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub home_assistant: HomeAssistantConfig,
    pub switches: Vec<Switch>,
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    pub overrides: HashMap<String, LogLevel>,
}

#[derive(Debug)]
pub struct AuthConfig {
    /// Shared secret used to verify bearer tokens
    pub jwt_secret: SecretString,
}

impl Config {
    /// Load configuration from multiple TOML files with import resolution
    ///
    /// Supports:
    /// - Multiple config files (e.g., base + secrets)
    /// - Import statements within config files
    /// - Conflict detection across all sources
    /// - Validation with all errors and warnings reported together
    ///
    /// Returns Ok((Config, diagnostics)) where diagnostics contains warnings.
    /// Only returns Err if there are actual errors (not just warnings).
    pub fn from_files(
        paths: &[PathBuf],
    ) -> Result<(Self, Vec<Diagnostic>), Box<dyn std::error::Error>> {
        let configs = PartialConfig::load_with_imports(paths)?;

        // Merge with first-wins semantics, collecting diagnostics
        let (partial, diagnostics) = PartialConfig::merge(configs);

        Self::from_partial(partial, diagnostics)
    }

    /// Convert a PartialConfig to a Config, validating all fields
    ///
    /// Takes diagnostics from the merge step and adds validation diagnostics.
    /// Returns Ok((Config, diagnostics)) if no errors, Err if there are errors.
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), Box<dyn std::error::Error>> {
        let server = partial
            .server
            .map(|s| ServerConfig {
                listen: s
                    .listen
                    .map(|l| l.into_inner())
                    .unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
                port: s.port.map(|p| p.into_inner()).unwrap_or(DEFAULT_PORT),
            })
            .unwrap_or_default();

        if server.port == 0 {
            diagnostics.push(ValidationError::new("server.port", "port must be non-zero").into());
        }

        let logging = if let Some(partial_logging) = partial.logging {
            LoggingConfig {
                level: partial_logging
                    .level
                    .map(|s| *s.get_ref())
                    .unwrap_or_default(),
                overrides: partial_logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, *v.get_ref())).collect())
                    .unwrap_or_default(),
            }
        } else {
            LoggingConfig::default()
        };

        let jwt_secret = partial
            .auth
            .and_then(|a| a.jwt_secret)
            .map(|s| s.into_inner())
            .unwrap_or_default();

        if jwt_secret.is_empty() {
            diagnostics.push(ValidationError::new("auth.jwt_secret", "jwt_secret is required").into());
        } else if jwt_secret.chars().count() < MIN_SECRET_LEN {
            diagnostics.push(
                ValidationError::new(
                    "auth.jwt_secret",
                    format!("jwt_secret must be at least {} characters long", MIN_SECRET_LEN),
                )
                .into(),
            );
        }

        let home_assistant = Self::validate_home_assistant(
            partial.home_assistant.unwrap_or_default(),
            &mut diagnostics,
        );

        let switches = Self::validate_switches(partial.switches, &mut diagnostics);

        let config = Config {
            server,
            logging,
            auth: AuthConfig {
                jwt_secret: SecretString::from(jwt_secret),
            },
            home_assistant,
            switches,
        };

        // Check if there are any errors (not just warnings)
        let has_errors = diagnostics.iter().any(|d| d.is_error());

        if has_errors {
            Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format_diagnostics(&diagnostics),
            )))
        } else {
            Ok((config, diagnostics))
        }
    }

    fn validate_home_assistant(
        partial: super::partial::PartialHomeAssistantConfig,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> HomeAssistantConfig {
        let url = partial
            .url
            .map(|u| u.into_inner())
            .unwrap_or_else(|| DEFAULT_HA_URL.to_string());

        if let Err(e) = reqwest::Url::parse(&url) {
            diagnostics.push(
                ValidationError::new("home_assistant.url", format!("invalid URL '{}': {}", url, e))
                    .into(),
            );
        }

        // The supervisor injects its token into the environment of add-ons
        let token = partial
            .token
            .map(|t| t.into_inner())
            .or_else(|| std::env::var(SUPERVISOR_TOKEN_ENV).ok())
            .unwrap_or_default();

        if token.is_empty() {
            diagnostics.push(
                ValidationError::new(
                    "home_assistant.token",
                    format!("token is required (or set ${})", SUPERVISOR_TOKEN_ENV),
                )
                .into(),
            );
        }

        let timeout_secs = partial
            .timeout_secs
            .map(|t| t.into_inner())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        if timeout_secs == 0 {
            diagnostics.push(
                ValidationError::new("home_assistant.timeout_secs", "timeout must be non-zero")
                    .into(),
            );
        }

        HomeAssistantConfig {
            url,
            token: SecretString::from(token),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Validate switch definitions: non-empty set, valid and unique ids, names present
    fn validate_switches(
        partials: Vec<PartialSwitch>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Switch> {
        if partials.is_empty() {
            diagnostics.push(
                ValidationError::new("switches", "at least one switch must be configured").into(),
            );
            return Vec::new();
        }

        // Group definitions by id, keeping first-seen order
        let mut by_id: Vec<(String, Vec<&PartialSwitch>)> = Vec::new();
        for partial in &partials {
            match by_id.iter().position(|(id, _)| id == partial.id.get_ref()) {
                Some(i) => by_id[i].1.push(partial),
                None => by_id.push((partial.id.get_ref().clone(), vec![partial])),
            }
        }

        let mut switches = Vec::with_capacity(by_id.len());
        for (id, defs) in by_id {
            let field_path = format!("switches.{}", id);
            let first = defs[0];

            if !is_valid_switch_id(&id) {
                let mut error = ValidationError::new(
                    field_path.clone(),
                    format!(
                        "invalid switch id '{}': only letters, digits and underscores are allowed",
                        id
                    ),
                );
                if let Some(location) = first.id_location() {
                    error = error.with_label(location);
                }
                diagnostics.push(error.into());
            }

            if defs.len() > 1 {
                let error = defs.iter().filter_map(|d| d.id_location()).fold(
                    ValidationError::new(field_path.clone(), format!("duplicate switch id '{}'", id)),
                    |error, location| error.with_label(location),
                );
                diagnostics.push(error.into());
            }

            let name = match &first.name {
                Some(name) if !name.trim().is_empty() => name.clone(),
                _ => {
                    let mut error = ValidationError::new(
                        format!("{}.name", field_path),
                        "name is required",
                    );
                    if let Some(location) = first.id_location() {
                        error = error.with_label(location);
                    }
                    diagnostics.push(error.into());
                    String::new()
                }
            };

            switches.push(Switch {
                id,
                name,
                icon: first
                    .icon
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ICON.to_string()),
            });
        }

        switches
    }
}
