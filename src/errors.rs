//! Error utilities

/// Errors surfaced by the facade.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or contradictory configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Some segment of the cluster coordinate is not configured.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unrecognized resource kind or otherwise unusable request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Target API answered with a non-success status.
    #[error("upstream returned {status} ({reason}) for {kind} in namespace {namespace}")]
    Upstream {
        kind: String,
        namespace: String,
        status: u16,
        reason: String,
    },

    /// Target API answered successfully but the body had an unexpected shape.
    #[error("unexpected response for {kind} in namespace {namespace}: {detail}")]
    Internal {
        kind: String,
        namespace: String,
        detail: String,
    },

    /// Request never produced an HTTP status.
    #[error("failed to reach {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// Failure while serving one target of a fan-out.
    #[error("target {identifier} failed: {source}")]
    Target {
        identifier: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Attaches the fan-out target identifier
    pub fn for_target(self, identifier: &str) -> Self {
        Error::Target {
            identifier: identifier.to_string(),
            source: Box::new(self),
        }
    }

    /// Classifies the error by upstream reason. Only `Upstream` errors
    /// (possibly wrapped in `Target`) carry a reason.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Upstream { reason, status, .. } => match classify(reason) {
                ErrorClass::Unknown => classify_status(*status),
                class => class,
            },
            Error::Target { source, .. } => source.class(),
            _ => ErrorClass::Unknown,
        }
    }
}

/// Describes error reason
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    AlreadyExists,
    Forbidden,
    Unauthorized,
    /// Catch-all variant. Since this enum is non-exhaustive,
    /// it should be handled with `_` pattern
    Unknown,
}

/// Tries to classify k8s error reason
pub fn classify(error_reason: &str) -> ErrorClass {
    match error_reason {
        "NotFound" => ErrorClass::NotFound,
        "Conflict" => ErrorClass::Conflict,
        "AlreadyExists" => ErrorClass::AlreadyExists,
        "Forbidden" => ErrorClass::Forbidden,
        "Unauthorized" => ErrorClass::Unauthorized,
        _ => ErrorClass::Unknown,
    }
}

// OpenShift routers in front of the API often answer with plain text,
// leaving only the status code to go by.
fn classify_status(status: u16) -> ErrorClass {
    match status {
        401 => ErrorClass::Unauthorized,
        403 => ErrorClass::Forbidden,
        404 => ErrorClass::NotFound,
        409 => ErrorClass::Conflict,
        _ => ErrorClass::Unknown,
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
