//! Cluster configuration: environment → cluster → (az) → (region) → endpoint.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// Leaf of the configuration tree.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    /// API server URL
    #[serde(alias = "endpoint")]
    pub url: String,
    /// Bearer token
    #[serde(alias = "credential")]
    pub token: String,
}

impl fmt::Debug for ClusterEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterEndpoint")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Any level below the cluster name. An object carrying both `url` and
/// `token` is a leaf, everything else is a branch keyed by az or region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClusterNode {
    Leaf(ClusterEndpoint),
    Branch(BTreeMap<String, ClusterNode>),
}

impl ClusterNode {
    pub fn child(&self, key: &str) -> Option<&ClusterNode> {
        match self {
            ClusterNode::Leaf(_) => None,
            ClusterNode::Branch(children) => children.get(key),
        }
    }

    /// All leaves below this node in key order, with the keys leading to them.
    pub fn leaves(&self) -> Vec<(Vec<&str>, &ClusterEndpoint)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(
        &'a self,
        path: &mut Vec<&'a str>,
        out: &mut Vec<(Vec<&'a str>, &'a ClusterEndpoint)>,
    ) {
        match self {
            ClusterNode::Leaf(endpoint) => out.push((path.clone(), endpoint)),
            ClusterNode::Branch(children) => {
                for (key, child) in children {
                    path.push(key);
                    child.collect_leaves(path, out);
                    path.pop();
                }
            }
        }
    }
}

/// Clusters of one environment, keyed by cluster name
pub type Environment = BTreeMap<String, ClusterNode>;

/// Full configuration of one entity, keyed by environment name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterConfig(BTreeMap<String, Environment>);

/// One row of the per-environment cluster listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    pub environment: String,
    pub cluster: String,
    pub region: String,
    pub url: String,
}

impl ClusterConfig {
    pub fn new(environments: BTreeMap<String, Environment>) -> Self {
        ClusterConfig(environments)
    }

    /// Parses configuration delivered by a credential source.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|err| Error::config(format!("malformed cluster configuration: {}", err)))
    }

    pub fn environment(&self, env: &str) -> Option<&Environment> {
        self.0.get(env)
    }

    pub fn environments(&self) -> impl Iterator<Item = (&String, &Environment)> {
        self.0.iter()
    }

    /// Environment names (plus upper-case spellings) and the sorted set of
    /// every cluster name (plus upper-case spellings).
    pub fn environments_and_clusters(&self) -> (Vec<String>, Vec<String>) {
        let mut environments = self.0.keys().cloned().collect::<Vec<_>>();
        let upper = environments
            .iter()
            .map(|e| e.to_uppercase())
            .collect::<Vec<_>>();
        environments.extend(upper);

        let mut clusters = BTreeSet::new();
        for env in self.0.values() {
            for cluster in env.keys() {
                clusters.insert(cluster.clone());
                clusters.insert(cluster.to_uppercase());
            }
        }
        (environments, clusters.into_iter().collect())
    }

    /// Every region of every cluster in `env`, plus a simplified listing
    /// keeping one region per cluster. Azure clusters keep all regions.
    pub fn cluster_summaries(
        &self,
        env: &str,
    ) -> Result<(Vec<ClusterSummary>, Vec<ClusterSummary>)> {
        let environment = self
            .environment(env)
            .ok_or_else(|| Error::not_found(format!("environment {}", env)))?;
        let mut all = Vec::new();
        for (cluster, node) in environment {
            for (path, endpoint) in node.leaves() {
                all.push(ClusterSummary {
                    environment: env.to_string(),
                    cluster: cluster.clone(),
                    region: path.join("/"),
                    url: endpoint.url.clone(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        let simplified = all
            .iter()
            .filter(|s| s.cluster.eq_ignore_ascii_case("azure") || seen.insert(s.cluster.clone()))
            .cloned()
            .collect();
        Ok((all, simplified))
    }
}

/// Holds the active configuration. Readers take a snapshot; reloads
/// replace the whole configuration at once.
#[derive(Debug)]
pub struct ClusterConfigStore {
    current: RwLock<Arc<ClusterConfig>>,
}

impl ClusterConfigStore {
    pub fn new(config: ClusterConfig) -> Self {
        ClusterConfigStore {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn snapshot(&self) -> Arc<ClusterConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn swap(&self, config: ClusterConfig) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(config);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample() -> ClusterConfig {
        ClusterConfig::from_value(json!({
            "dev": {
                "ohe": {
                    "bo1": {"url": "https://ohe-bo1.dev", "token": "t-ohe-1"},
                    "bo2": {"url": "https://ohe-bo2.dev", "token": "t-ohe-2"}
                },
                "azure": {
                    "weu1": {"url": "https://az-weu1.dev", "token": "t-az-1"},
                    "weu2": {"url": "https://az-weu2.dev", "token": "t-az-2"}
                },
                "confluent": {"url": "https://confluent.dev", "token": "t-conf"}
            },
            "pro": {
                "probks": {
                    "az1": {
                        "bo1": {"url": "https://probks-az1-bo1", "token": "t-p-1"}
                    },
                    "az2": {
                        "bo1": {"url": "https://probks-az2-bo1", "token": "t-p-2"}
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn parses_leaves_and_branches() {
        let config = sample();
        let ohe = &config.environment("dev").unwrap()["ohe"];
        assert_eq!(
            ohe.child("bo1"),
            Some(&ClusterNode::Leaf(ClusterEndpoint {
                url: "https://ohe-bo1.dev".to_string(),
                token: "t-ohe-1".to_string(),
            }))
        );
        let confluent = &config.environment("dev").unwrap()["confluent"];
        assert!(matches!(confluent, ClusterNode::Leaf(_)));
    }

    #[test]
    fn accepts_endpoint_credential_aliases() {
        let config = ClusterConfig::from_value(json!({
            "dev": {"c": {"r": {"endpoint": "https://x", "credential": "y"}}}
        }))
        .unwrap();
        let leaves = config.environment("dev").unwrap()["c"].leaves();
        assert_eq!(leaves[0].0, vec!["r"]);
        assert_eq!(leaves[0].1.url, "https://x");
    }

    #[test]
    fn half_leaf_is_rejected() {
        let err = ClusterConfig::from_value(json!({
            "dev": {"c": {"r": {"url": "https://x"}}}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn debug_redacts_token() {
        let endpoint = ClusterEndpoint {
            url: "https://x".to_string(),
            token: "very-secret".to_string(),
        };
        assert!(!format!("{:?}", endpoint).contains("very-secret"));
    }

    #[test]
    fn environments_and_clusters_listing() {
        let (envs, clusters) = sample().environments_and_clusters();
        assert_eq!(envs, vec!["dev", "pro", "DEV", "PRO"]);
        assert_eq!(
            clusters,
            vec!["AZURE", "CONFLUENT", "OHE", "PROBKS", "azure", "confluent", "ohe", "probks"]
        );
    }

    #[test]
    fn summaries_keep_all_azure_regions() {
        let (all, simplified) = sample().cluster_summaries("dev").unwrap();
        assert_eq!(all.len(), 5);
        let simplified = simplified
            .iter()
            .map(|s| format!("{}:{}", s.cluster, s.region))
            .collect::<Vec<_>>();
        assert_eq!(simplified, vec!["azure:weu1", "azure:weu2", "confluent:", "ohe:bo1"]);
    }

    #[test]
    fn summaries_for_unknown_environment() {
        assert!(matches!(
            sample().cluster_summaries("uat"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn swap_replaces_whole_config() {
        let store = ClusterConfigStore::new(sample());
        let before = store.snapshot();
        store.swap(ClusterConfig::default());
        assert!(before.environment("dev").is_some());
        assert!(store.snapshot().environment("dev").is_none());
    }
}
