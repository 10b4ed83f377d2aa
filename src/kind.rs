//! Resource kinds understood by the gateway and their API paths

use crate::errors::{Error, Result};
use std::str::FromStr;

/// Checks that `value` can be placed into a URL path as one segment.
pub fn path_segment<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() || value.contains(['/', '?', '#']) {
        return Err(Error::invalid_argument(format!(
            "'{}' is not a valid {}",
            value, what
        )));
    }
    Ok(value)
}

/// Kinds served by an OpenShift API server.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum ApiKind {
    Pods,
    DeploymentConfigs,
    Routes,
    Services,
    Namespaces,
    ReplicationControllers,
    Hpas,
    Deployments,
    StatefulSets,
    ReplicaSets,
    ConfigMaps,
    Secrets,
    NetworkPolicies,
    Quotas,
    CronJobs,
    Jobs,
    PersistentVolumeClaims,
}

impl ApiKind {
    pub fn is_namespaced(self) -> bool {
        !matches!(self, ApiKind::Namespaces)
    }

    /// Collection path for this kind. `named` tells whether a single object
    /// will be appended: named namespaces live under the core API, while the
    /// listing comes from the project API so that only projects visible to
    /// the token are returned.
    pub fn path(self, namespace: Option<&str>, named: bool) -> Result<String> {
        let ns = || {
            let namespace = namespace.ok_or_else(|| {
                Error::invalid_argument(format!("namespace is required for {}", self))
            })?;
            path_segment("namespace", namespace)
        };
        let path = match self {
            ApiKind::Namespaces if named => "/api/v1/namespaces".to_string(),
            ApiKind::Namespaces => "/apis/project.openshift.io/v1/projects".to_string(),
            ApiKind::Pods => format!("/api/v1/namespaces/{}/pods", ns()?),
            ApiKind::Services => format!("/api/v1/namespaces/{}/services", ns()?),
            ApiKind::ReplicationControllers => {
                format!("/api/v1/namespaces/{}/replicationcontrollers", ns()?)
            }
            ApiKind::ConfigMaps => format!("/api/v1/namespaces/{}/configmaps", ns()?),
            ApiKind::Secrets => format!("/api/v1/namespaces/{}/secrets", ns()?),
            ApiKind::Quotas => format!("/api/v1/namespaces/{}/resourcequotas", ns()?),
            ApiKind::PersistentVolumeClaims => {
                format!("/api/v1/namespaces/{}/persistentvolumeclaims", ns()?)
            }
            ApiKind::DeploymentConfigs => format!(
                "/apis/apps.openshift.io/v1/namespaces/{}/deploymentconfigs",
                ns()?
            ),
            ApiKind::Routes => format!("/apis/route.openshift.io/v1/namespaces/{}/routes", ns()?),
            ApiKind::Hpas => format!(
                "/apis/autoscaling/v1/namespaces/{}/horizontalpodautoscalers",
                ns()?
            ),
            ApiKind::Deployments => format!("/apis/apps/v1/namespaces/{}/deployments", ns()?),
            ApiKind::StatefulSets => format!("/apis/apps/v1/namespaces/{}/statefulsets", ns()?),
            ApiKind::ReplicaSets => format!("/apis/apps/v1/namespaces/{}/replicasets", ns()?),
            ApiKind::NetworkPolicies => format!(
                "/apis/networking.k8s.io/v1/namespaces/{}/networkpolicies",
                ns()?
            ),
            ApiKind::CronJobs => format!("/apis/batch/v1/namespaces/{}/cronjobs", ns()?),
            ApiKind::Jobs => format!("/apis/batch/v1/namespaces/{}/jobs", ns()?),
        };
        Ok(path)
    }
}

/// Resource kind as accepted by `get_resource`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Raw cluster configuration of an environment; no network call
    Clusters,
    /// Echo of the resolved endpoint; no network call
    Url,
    /// Blue-Green classification of a namespace
    BgBlock,
    Api(ApiKind),
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clusters" => Ok(Kind::Clusters),
            "url" => Ok(Kind::Url),
            "bgblock" => Ok(Kind::BgBlock),
            other => other
                .parse::<ApiKind>()
                .map(Kind::Api)
                .map_err(|_| Error::invalid_argument(format!("unknown resource kind '{}'", other))),
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Clusters => f.write_str("clusters"),
            Kind::Url => f.write_str("url"),
            Kind::BgBlock => f.write_str("bgblock"),
            Kind::Api(kind) => write!(f, "{}", kind),
        }
    }
}
