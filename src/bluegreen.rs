//! Blue-Green classification of a namespace.
//!
//! Services named `b-g-*` and `g-b-*` form two directional groups. A group
//! is healthy when every one of its services points, through its
//! `app_name` selector, at an existing deployment. The result is all or
//! nothing: a single unmatched service in either group turns the whole
//! namespace into `ko`.

use crate::{
    errors::{Error, Result},
    gateway::{Listing, ResourceGateway},
    kind::ApiKind,
    resolver::ResourceTarget,
    settings::SelectorMatch,
};
use k8s_openapi::api::core::v1::Service;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Label correlating a service with its deployment
pub const SELECTOR_LABEL: &str = "app_name";
/// Selector of a service without [`SELECTOR_LABEL`]
pub const MISSING_SELECTOR: &str = "missing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `b-g-` prefix
    BlueGreen,
    /// `g-b-` prefix
    GreenBlue,
}

impl Direction {
    pub fn of(service_name: &str) -> Option<Direction> {
        if service_name.starts_with("b-g-") {
            Some(Direction::BlueGreen)
        } else if service_name.starts_with("g-b-") {
            Some(Direction::GreenBlue)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    pub selector: String,
}

impl ServiceSummary {
    pub fn from_service(service: &Service) -> Self {
        let selector = service
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.as_ref())
            .and_then(|selector| selector.get(SELECTOR_LABEL))
            .cloned()
            .unwrap_or_else(|| MISSING_SELECTOR.to_string());
        ServiceSummary {
            name: service.metadata.name.clone().unwrap_or_default(),
            selector,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BlueGreenResult {
    Ok {
        #[serde(rename = "bg-deployments")]
        bg_deployments: Vec<String>,
        #[serde(rename = "gb-deployments")]
        gb_deployments: Vec<String>,
    },
    Ko,
}

/// Services of both groups, in listing order
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Groups {
    pub bg: Vec<ServiceSummary>,
    pub gb: Vec<ServiceSummary>,
}

pub fn partition(services: &[Value], namespace: &str) -> Result<Groups> {
    let mut groups = Groups::default();
    for item in services {
        let service: Service =
            serde_json::from_value(item.clone()).map_err(|err| Error::Internal {
                kind: ApiKind::Services.to_string(),
                namespace: namespace.to_string(),
                detail: format!("unreadable service: {}", err),
            })?;
        let summary = ServiceSummary::from_service(&service);
        match Direction::of(&summary.name) {
            Some(Direction::BlueGreen) => groups.bg.push(summary),
            Some(Direction::GreenBlue) => groups.gb.push(summary),
            None => tracing::trace!(service = %summary.name, "not part of a blue-green pair"),
        }
    }
    Ok(groups)
}

/// Answers whether a selector is backed by some deployment.
pub enum DeploymentIndex {
    Substring(String),
    Exact(HashSet<String>),
}

const DEPLOYMENT_LABEL_POINTERS: &[&str] = &[
    "/spec/selector/matchLabels/app_name",
    "/spec/template/metadata/labels/app_name",
    "/metadata/labels/app_name",
];

impl DeploymentIndex {
    pub fn build(deployments: &Listing, mode: SelectorMatch) -> serde_json::Result<Self> {
        let index = match mode {
            SelectorMatch::Substring => {
                DeploymentIndex::Substring(serde_json::to_string(deployments)?)
            }
            SelectorMatch::Exact => DeploymentIndex::Exact(
                deployments
                    .items
                    .iter()
                    .flat_map(|item| {
                        DEPLOYMENT_LABEL_POINTERS
                            .iter()
                            .filter_map(move |ptr| item.pointer(ptr))
                    })
                    .filter_map(|v| v.as_str().map(ToString::to_string))
                    .collect(),
            ),
        };
        Ok(index)
    }

    pub fn contains(&self, selector: &str) -> bool {
        if selector == MISSING_SELECTOR {
            return false;
        }
        match self {
            DeploymentIndex::Substring(serialized) => serialized.contains(selector),
            DeploymentIndex::Exact(selectors) => selectors.contains(selector),
        }
    }
}

/// Selectors of `group` in order, or `None` if any of them is unmatched.
fn matched(group: &[ServiceSummary], index: &DeploymentIndex) -> Option<Vec<String>> {
    group
        .iter()
        .map(|service| {
            if index.contains(&service.selector) {
                Some(service.selector.clone())
            } else {
                tracing::debug!(
                    service = %service.name,
                    selector = %service.selector,
                    "no deployment for service"
                );
                None
            }
        })
        .collect()
}

/// Classifies already fetched listings.
pub fn classify_listings(
    namespace: &str,
    services: &Listing,
    deployments: &Listing,
    mode: SelectorMatch,
) -> Result<BlueGreenResult> {
    let groups = partition(&services.items, namespace)?;
    let index = DeploymentIndex::build(deployments, mode).map_err(|err| Error::Internal {
        kind: ApiKind::Deployments.to_string(),
        namespace: namespace.to_string(),
        detail: format!("unserializable deployments: {}", err),
    })?;
    let result = match (matched(&groups.bg, &index), matched(&groups.gb, &index)) {
        (Some(bg_deployments), Some(gb_deployments)) => BlueGreenResult::Ok {
            bg_deployments,
            gb_deployments,
        },
        _ => BlueGreenResult::Ko,
    };
    Ok(result)
}

/// Fetches services and deployments of `namespace` and classifies them.
#[tracing::instrument(skip(gateway, target), fields(identifier = %target.identifier))]
pub async fn classify(
    gateway: &ResourceGateway,
    target: &ResourceTarget,
    namespace: &str,
) -> Result<BlueGreenResult> {
    let (services, deployments) = futures::try_join!(
        gateway.list(ApiKind::Services, target, Some(namespace)),
        gateway.list(ApiKind::Deployments, target, Some(namespace)),
    )?;
    let result = classify_listings(
        namespace,
        &services,
        &deployments,
        gateway.options().selector_match,
    )?;
    tracing::info!(ok = matches!(result, BlueGreenResult::Ok { .. }), "classified");
    Ok(result)
}
