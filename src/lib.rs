//! Read-only facade over the REST APIs of a fleet of OpenShift clusters.
//!
//! Cluster endpoints and tokens are loaded once per entity from a
//! credential source. Requests name an environment and optionally a
//! cluster, az and region; they are resolved to one or many clusters and
//! each is queried with a fresh, uncached read.

pub mod bluegreen;
pub mod client;
pub mod clusters;
pub mod errors;
pub mod gateway;
pub mod kind;
pub mod resolver;
pub mod settings;
pub mod source;

pub use client::{OpenshiftClient, ResourceRequest};
pub use errors::{Error, Result};
pub use settings::Settings;
