//! Entry point tying configuration, resolution and fetching together

use crate::{
    clusters::{ClusterConfig, ClusterConfigStore, ClusterSummary},
    errors::{Error, Result},
    gateway::ResourceGateway,
    kind::Kind,
    resolver::{self, Coordinate, Resolution},
    settings::{GatewayOptions, Settings},
    source::{self, ClusterSource},
};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};
use tokio::sync::Mutex;

/// Arguments of [`OpenshiftClient::get_resource`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequest {
    pub environment: String,
    pub cluster: Option<String>,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub region: Option<String>,
    pub name: Option<String>,
    pub az: Option<String>,
}

impl ResourceRequest {
    pub fn new(environment: &str) -> Self {
        ResourceRequest {
            environment: environment.to_string(),
            ..Default::default()
        }
    }

    pub fn cluster(mut self, cluster: &str) -> Self {
        self.cluster = Some(cluster.to_string());
        self
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn az(mut self, az: &str) -> Self {
        self.az = Some(az.to_string());
        self
    }

    fn coordinate(&self) -> Coordinate<'_> {
        Coordinate {
            environment: &self.environment,
            cluster: self.cluster.as_deref(),
            az: self.az.as_deref(),
            region: self.region.as_deref(),
        }
    }
}

/// Client facade over the clusters of one entity.
pub struct OpenshiftClient {
    store: ClusterConfigStore,
    gateway: ResourceGateway,
    source: Option<Mutex<Box<dyn ClusterSource>>>,
    entity: RwLock<String>,
}

impl OpenshiftClient {
    /// Connects the credential source selected by `settings` and loads
    /// the configured entity.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let source = source::from_settings(&settings.source)?;
        Self::with_source(source, &settings.entity, settings.gateway).await
    }

    pub async fn with_source(
        mut source: Box<dyn ClusterSource>,
        entity: &str,
        options: GatewayOptions,
    ) -> Result<Self> {
        source.connect().await.map_err(|err| {
            Error::config(format!("failed to connect credential source: {:#}", err))
        })?;
        let config = source::load(&*source, entity).await?;
        Ok(OpenshiftClient {
            store: ClusterConfigStore::new(config),
            gateway: ResourceGateway::new(options),
            source: Some(Mutex::new(source)),
            entity: RwLock::new(entity.to_string()),
        })
    }

    /// Client over a fixed configuration, without a credential source.
    pub fn with_clusters(config: ClusterConfig, options: GatewayOptions) -> Self {
        OpenshiftClient {
            store: ClusterConfigStore::new(config),
            gateway: ResourceGateway::new(options),
            source: None,
            entity: RwLock::new(String::new()),
        }
    }

    pub fn entity(&self) -> String {
        self.entity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reloads configuration for another entity. Requests already in flight
    /// finish against the configuration they started with.
    #[tracing::instrument(skip(self))]
    pub async fn change_entity(&self, entity: &str) -> Result<()> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| Error::config("client has no credential source to reload from"))?;
        let entity = entity.to_lowercase();
        let mut source = source.lock().await;
        source.connect().await.map_err(|err| {
            Error::config(format!("failed to reconnect credential source: {:#}", err))
        })?;
        let config = source::load(&**source, &entity).await?;
        self.store.swap(config);
        *self.entity.write().unwrap_or_else(PoisonError::into_inner) = entity;
        Ok(())
    }

    pub fn environments_and_clusters(&self) -> (Vec<String>, Vec<String>) {
        self.store.snapshot().environments_and_clusters()
    }

    pub fn cluster_summaries(
        &self,
        environment: &str,
    ) -> Result<(Vec<ClusterSummary>, Vec<ClusterSummary>)> {
        self.store.snapshot().cluster_summaries(environment)
    }

    /// Fetches a resource from every target the request resolves to.
    ///
    /// Results are keyed by target identifier. When the request fans out
    /// over several targets they are fetched concurrently; if any fails,
    /// the failure with the smallest identifier is returned, naming its
    /// target.
    #[tracing::instrument(skip(self, req), fields(env = %req.environment, kind = ?req.kind))]
    pub async fn get_resource(&self, req: &ResourceRequest) -> Result<BTreeMap<String, Value>> {
        let kind: Kind = req
            .kind
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("resource kind is required"))?
            .parse()?;
        let config = self.store.snapshot();

        if kind == Kind::Clusters {
            let environment = config
                .environment(&req.environment)
                .ok_or_else(|| Error::not_found(format!("environment {}", req.environment)))?;
            return environment
                .iter()
                .map(|(cluster, node)| {
                    serde_json::to_value(node)
                        .map(|v| (cluster.clone(), v))
                        .map_err(|err| Error::Internal {
                            kind: kind.to_string(),
                            namespace: "<cluster>".to_string(),
                            detail: err.to_string(),
                        })
                })
                .collect();
        }

        let resolution = resolver::resolve(&config, &req.coordinate())?;
        let fanned_out = matches!(resolution, Resolution::Many(_));
        let targets = resolution.into_targets();
        tracing::debug!(targets = targets.len(), "resolved");

        let namespace = req.namespace.as_deref();
        let name = req.name.as_deref();
        let fetches = targets.iter().map(|target| async move {
            let result = self.gateway.fetch(kind, target, namespace, name).await;
            (target.identifier.as_str(), result)
        });
        let results = futures::future::join_all(fetches).await;

        let mut out = BTreeMap::new();
        for (identifier, result) in results {
            match result {
                Ok(value) => {
                    out.insert(identifier.to_string(), value);
                }
                Err(err) if fanned_out => {
                    tracing::warn!(identifier, error = %err, "fan-out target failed");
                    return Err(err.for_target(identifier));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}
