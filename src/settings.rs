//! Process configuration, read once from the environment

use crate::errors::{Error, Result};
use std::{fmt, str::FromStr, time::Duration};

const DEFAULT_ENTITY: &str = "default";
const DEFAULT_APP_NAME: &str = "openshift-facade";
const DEFAULT_VAULT_SECRET_PATH: &str = "secret/data/openshift/clusters";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Where cluster configuration comes from
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    SecretsCache {
        url: String,
        api_key: String,
        app_name: String,
    },
    Vault {
        url: String,
        user: String,
        password: String,
        secret_path: String,
    },
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::SecretsCache { url, app_name, .. } => f
                .debug_struct("SecretsCache")
                .field("url", url)
                .field("app_name", app_name)
                .finish_non_exhaustive(),
            CredentialSource::Vault {
                url,
                user,
                secret_path,
                ..
            } => f
                .debug_struct("Vault")
                .field("url", url)
                .field("user", user)
                .field("secret_path", secret_path)
                .finish_non_exhaustive(),
        }
    }
}

/// How Blue-Green selectors are matched against deployments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SelectorMatch {
    /// Selector occurs anywhere in the serialized deployments listing
    #[default]
    Substring,
    /// Selector equals an `app_name` label value of some deployment
    Exact,
}

/// Options of the upstream HTTP client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Bound on the whole request
    pub timeout: Duration,
    /// Bound on connection establishment
    pub connect_timeout: Duration,
    pub selector_match: SelectorMatch,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        GatewayOptions {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            selector_match: SelectorMatch::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub source: CredentialSource,
    /// Entity whose clusters are loaded, lower-cased
    pub entity: String,
    pub gateway: GatewayOptions,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| Error::config(format!("{} must be set", key)))
        };

        let cache_enabled = parse_flag("SECRETS_CACHE_ENABLED", var("SECRETS_CACHE_ENABLED"))?;
        let vault_enabled = parse_flag("VAULT_ENABLED", var("VAULT_ENABLED"))?;

        let source = match (cache_enabled, vault_enabled) {
            (true, true) => {
                return Err(Error::config(
                    "SECRETS_CACHE_ENABLED and VAULT_ENABLED are mutually exclusive",
                ))
            }
            (false, false) => {
                return Err(Error::config(
                    "no credential source configured: set SECRETS_CACHE_ENABLED or VAULT_ENABLED",
                ))
            }
            (true, false) => CredentialSource::SecretsCache {
                url: required("SECRETS_CACHE_URL")?,
                api_key: required("SECRETS_CACHE_API_KEY")?,
                app_name: var("SECRETS_CACHE_APP_NAME")
                    .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            },
            (false, true) => CredentialSource::Vault {
                url: required("VAULT_URL")?,
                user: required("VAULT_USER")?,
                password: required("VAULT_PASSWORD")?,
                secret_path: var("VAULT_SECRET_PATH")
                    .unwrap_or_else(|| DEFAULT_VAULT_SECRET_PATH.to_string()),
            },
        };

        let entity = var("ENTITY_ID")
            .unwrap_or_else(|| DEFAULT_ENTITY.to_string())
            .to_lowercase();

        let gateway = GatewayOptions {
            timeout: parse_secs("OPENSHIFT_TIMEOUT", var("OPENSHIFT_TIMEOUT"), DEFAULT_TIMEOUT_SECS)?,
            connect_timeout: parse_secs(
                "OPENSHIFT_CONNECT_TIMEOUT",
                var("OPENSHIFT_CONNECT_TIMEOUT"),
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            selector_match: match var("BLUEGREEN_MATCH") {
                Some(v) => SelectorMatch::from_str(&v.to_lowercase()).map_err(|_| {
                    Error::config(format!(
                        "BLUEGREEN_MATCH must be 'substring' or 'exact', got '{}'",
                        v
                    ))
                })?,
                None => SelectorMatch::default(),
            },
        };

        Ok(Settings {
            source,
            entity,
            gateway,
        })
    }
}

fn parse_flag(key: &str, value: Option<String>) -> Result<bool> {
    let value = match value {
        Some(v) => v,
        None => return Ok(false),
    };
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::config(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn parse_secs(key: &str, value: Option<String>, default: u64) -> Result<Duration> {
    let secs = match value {
        Some(v) => v.trim().parse::<u64>().map_err(|_| {
            Error::config(format!("{} must be a whole number of seconds, got '{}'", key, v))
        })?,
        None => default,
    };
    if secs == 0 {
        return Err(Error::config(format!("{} must be positive", key)));
    }
    Ok(Duration::from_secs(secs))
}
