//! Resolution of logical coordinates into concrete cluster targets

use crate::{
    clusters::{ClusterConfig, ClusterEndpoint, ClusterNode},
    errors::{Error, Result},
};
use std::{collections::BTreeMap, fmt};

/// Resolved endpoint/credential pair
#[derive(Clone, PartialEq, Eq)]
pub struct ResourceTarget {
    /// Key used to tag results fetched from this target
    pub identifier: String,
    pub endpoint: String,
    pub credential: String,
}

impl ResourceTarget {
    fn new(identifier: String, endpoint: &ClusterEndpoint) -> Self {
        ResourceTarget {
            identifier,
            endpoint: endpoint.url.clone(),
            credential: endpoint.token.clone(),
        }
    }
}

impl fmt::Debug for ResourceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTarget")
            .field("identifier", &self.identifier)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Logical coordinate of a request
#[derive(Debug, Clone, Copy, Default)]
pub struct Coordinate<'a> {
    pub environment: &'a str,
    /// All clusters of the environment when absent
    pub cluster: Option<&'a str>,
    pub az: Option<&'a str>,
    pub region: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one region was selected
    Single(ResourceTarget),
    /// Every leaf below the selected node, keyed by identifier
    Many(BTreeMap<String, ResourceTarget>),
}

impl Resolution {
    pub fn into_targets(self) -> Vec<ResourceTarget> {
        match self {
            Resolution::Single(target) => vec![target],
            Resolution::Many(targets) => targets.into_values().collect(),
        }
    }
}

fn require_leaf<'a>(
    node: Option<&'a ClusterNode>,
    what: impl FnOnce() -> String,
) -> Result<&'a ClusterEndpoint> {
    match node {
        Some(ClusterNode::Leaf(endpoint)) => Ok(endpoint),
        Some(ClusterNode::Branch(_)) => Err(Error::not_found(format!(
            "{} is not a single region",
            what()
        ))),
        None => Err(Error::not_found(what())),
    }
}

fn all_below(node: &ClusterNode, prefix: Option<&str>) -> BTreeMap<String, ResourceTarget> {
    node.leaves()
        .into_iter()
        .map(|(path, endpoint)| {
            let identifier = prefix
                .into_iter()
                .chain(path)
                .collect::<Vec<_>>()
                .join("/");
            (identifier.clone(), ResourceTarget::new(identifier, endpoint))
        })
        .collect()
}

/// Resolves `coord` against `config`.
pub fn resolve(config: &ClusterConfig, coord: &Coordinate<'_>) -> Result<Resolution> {
    let env = coord.environment;
    let environment = match (config.environment(env), coord.cluster) {
        (Some(e), _) => e,
        (None, Some(cluster)) => {
            return Err(Error::not_found(format!(
                "environment {} / cluster {}",
                env, cluster
            )))
        }
        (None, None) => return Err(Error::not_found(format!("environment {}", env))),
    };

    let cluster = match coord.cluster {
        Some(c) => c,
        None => {
            if coord.az.is_some() || coord.region.is_some() {
                return Err(Error::invalid_argument(
                    "az and region can only be selected together with a cluster",
                ));
            }
            let mut targets = BTreeMap::new();
            for (name, node) in environment {
                targets.extend(all_below(node, Some(name)));
            }
            return Ok(Resolution::Many(targets));
        }
    };

    let cluster_node = environment.get(cluster).ok_or_else(|| {
        Error::not_found(format!("environment {} / cluster {}", env, cluster))
    })?;

    let (node, node_name) = match coord.az {
        Some(az) => {
            let node = cluster_node.child(az).ok_or_else(|| {
                Error::not_found(format!("az {} in {}/{}", az, env, cluster))
            })?;
            (node, az)
        }
        None => (cluster_node, cluster),
    };

    if let Some(region) = coord.region {
        let endpoint = require_leaf(node.child(region), || {
            format!("region {} in {}/{}/{}", region, env, cluster, coord.az.unwrap_or("-"))
        })?;
        return Ok(Resolution::Single(ResourceTarget::new(
            region.to_string(),
            endpoint,
        )));
    }

    match node {
        ClusterNode::Leaf(endpoint) => Ok(Resolution::Single(ResourceTarget::new(
            node_name.to_string(),
            endpoint,
        ))),
        ClusterNode::Branch(_) => Ok(Resolution::Many(all_below(node, None))),
    }
}
