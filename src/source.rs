//! Sources of cluster configuration

use crate::{
    clusters::ClusterConfig,
    errors::{Error, Result},
    settings::CredentialSource,
};
use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashMap, time::Duration};

const CACHE_TIMEOUT: Duration = Duration::from_secs(5);
const API_KEY_HEADER: &str = "x-api-key";
const APP_NAME_HEADER: &str = "x-app-name";

/// Every entity's configurations, in source order
pub type ClustersMap = HashMap<String, Vec<Value>>;

/// Something that can deliver cluster configuration for entities.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// Login step. Must be called before `clusters_map`.
    async fn connect(&mut self) -> anyhow::Result<()>;

    async fn clusters_map(&self) -> anyhow::Result<ClustersMap>;
}

/// Loads configuration of `entity` from `source`. The first configuration
/// listed for the entity wins.
#[tracing::instrument(skip(source))]
pub async fn load(source: &dyn ClusterSource, entity: &str) -> Result<ClusterConfig> {
    let mut map = source
        .clusters_map()
        .await
        .map_err(|err| Error::config(format!("failed to load clusters: {:#}", err)))?;
    let configs = map
        .remove(entity)
        .ok_or_else(|| Error::config(format!("entity '{}' has no cluster configuration", entity)))?;
    if configs.len() > 1 {
        tracing::warn!(count = configs.len(), "several configurations listed, using the first");
    }
    let first = configs
        .into_iter()
        .next()
        .ok_or_else(|| Error::config(format!("entity '{}' has an empty configuration list", entity)))?;
    let config = ClusterConfig::from_value(first)?;
    tracing::info!(
        environments = config.environments().count(),
        "loaded cluster configuration"
    );
    Ok(config)
}

/// Builds the source selected by settings. Connecting is left to the caller.
pub fn from_settings(source: &CredentialSource) -> Result<Box<dyn ClusterSource>> {
    match source {
        CredentialSource::SecretsCache {
            url,
            api_key,
            app_name,
        } => Ok(Box::new(SecretsCache::new(url, api_key, app_name)?)),
        CredentialSource::Vault {
            url,
            user,
            password,
            secret_path,
        } => Ok(Box::new(Vault::new(url, user, password, secret_path)?)),
    }
}

/// HTTP endpoint answering `{entity: config}`
pub struct SecretsCache {
    http: reqwest::Client,
    url: String,
    api_key: String,
    app_name: String,
}

impl SecretsCache {
    pub fn new(url: &str, api_key: &str, app_name: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CACHE_TIMEOUT)
            .build()
            .map_err(|err| Error::config(format!("failed to build HTTP client: {}", err)))?;
        Ok(SecretsCache {
            http,
            url: url.to_string(),
            api_key: api_key.to_string(),
            app_name: app_name.to_string(),
        })
    }
}

#[async_trait]
impl ClusterSource for SecretsCache {
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn clusters_map(&self) -> anyhow::Result<ClustersMap> {
        let by_entity: HashMap<String, Value> = self
            .http
            .get(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(APP_NAME_HEADER, &self.app_name)
            .send()
            .await
            .context("secrets cache is unreachable")?
            .error_for_status()
            .context("secrets cache rejected the request")?
            .json()
            .await
            .context("secrets cache returned malformed body")?;
        Ok(by_entity
            .into_iter()
            .map(|(entity, config)| (entity, vec![config]))
            .collect())
    }
}

/// Vault KV v2 secret holding `{entity: [config, ...]}`, read after a
/// userpass login.
pub struct Vault {
    http: reqwest::Client,
    url: String,
    user: String,
    password: String,
    secret_path: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Deserialize)]
struct SecretResponse {
    data: SecretData,
}

#[derive(Deserialize)]
struct SecretData {
    data: ClustersMap,
}

impl Vault {
    pub fn new(url: &str, user: &str, password: &str, secret_path: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CACHE_TIMEOUT)
            .build()
            .map_err(|err| Error::config(format!("failed to build HTTP client: {}", err)))?;
        Ok(Vault {
            http,
            url: url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
            secret_path: secret_path.trim_matches('/').to_string(),
            token: None,
        })
    }
}

#[async_trait]
impl ClusterSource for Vault {
    async fn connect(&mut self) -> anyhow::Result<()> {
        let login: LoginResponse = self
            .http
            .post(format!("{}/v1/auth/userpass/login/{}", self.url, self.user))
            .json(&serde_json::json!({ "password": self.password }))
            .send()
            .await
            .context("vault is unreachable")?
            .error_for_status()
            .context("vault login failed")?
            .json()
            .await
            .context("vault login returned malformed body")?;
        tracing::info!(user = %self.user, "logged into vault");
        self.token = Some(login.auth.client_token);
        Ok(())
    }

    async fn clusters_map(&self) -> anyhow::Result<ClustersMap> {
        let token = self
            .token
            .as_deref()
            .context("vault source used before connect")?;
        let secret: SecretResponse = self
            .http
            .get(format!("{}/v1/{}", self.url, self.secret_path))
            .header("X-Vault-Token", token)
            .send()
            .await
            .context("vault is unreachable")?
            .error_for_status()
            .with_context(|| format!("failed to read {}", self.secret_path))?
            .json()
            .await
            .context("vault secret has unexpected shape")?;
        Ok(secret.data.data)
    }
}
