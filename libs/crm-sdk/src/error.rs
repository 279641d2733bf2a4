use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Failure reported by a [`Transport`](crate::Transport) or while reading
/// its answer.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// Connection, TLS or I/O failure.
    #[error("transport failure: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status; `message` is the service's error text.
    #[error("remote returned {status}: {message}")]
    Status {
        status: http::StatusCode,
        message: String,
    },

    /// The response could not be decoded.
    #[error("malformed payload: {0}")]
    Payload(String),
}

impl TransportError {
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

/// Kind of single-entity write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Errors returned by [`Context`](crate::Context) and
/// [`EntitySet`](crate::EntitySet).
///
/// Argument errors are raised before anything is sent. Remote errors keep
/// the transport failure as their source.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid descriptor for entity '{entity}': {reason}")]
    InvalidDescriptor { entity: String, reason: String },

    /// `set::<T>()` for a type that was never registered.
    #[error("entity type '{0}' is not registered with this context")]
    UnregisteredEntity(&'static str),

    /// Remote 404 under `throw_on_error = true`.
    #[error("{resource}({id}) not found")]
    NotFound { resource: String, id: Uuid },

    #[error("query on '{resource}' failed")]
    RemoteQuery {
        resource: String,
        #[source]
        source: TransportError,
    },

    #[error("{op} on '{resource}' failed")]
    RemoteMutation {
        resource: String,
        op: MutationOp,
        #[source]
        source: TransportError,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The transport failure behind a remote error.
    #[must_use]
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::RemoteQuery { source, .. } | Self::RemoteMutation { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<crm_query::Error> for Error {
    fn from(err: crm_query::Error) -> Self {
        match err {
            crm_query::Error::InvalidArgument(msg) => Self::InvalidArgument(msg),
            crm_query::Error::UnknownField { entity, field } => Self::UnknownField { entity, field },
            crm_query::Error::UnsupportedOperation(msg) => Self::UnsupportedOperation(msg),
            crm_query::Error::InvalidDescriptor { entity, reason } => {
                Self::InvalidDescriptor { entity, reason }
            }
        }
    }
}
