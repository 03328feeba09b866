use std::sync::Arc;

/// Represents a result type for operations in this crate.
///
/// Only construction APIs (contexts, configuration, sink initialization) return errors. Delivery
/// itself never does: see [`Sink::send`](crate::Sink::send).
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Delivery stream name was neither provided nor found in the environment.
    #[error("delivery stream name must be provided or set in FIREHOSE_STREAM_NAME")]
    MissingStreamName,

    /// Invalid endpoint URL override.
    #[error("invalid endpoint_url configuration")]
    InvalidEndpointUrl(#[source] url::ParseError),

    /// The evaluation context is malformed (empty key, invalid kind, duplicate kinds).
    #[error("invalid evaluation context: {0}")]
    InvalidContext(String),

    /// Failed to start the runtime driving the delivery client.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Runtime(Arc<std::io::Error>),

    /// The delivery stream could not be reached during initialization (missing stream, bad
    /// credentials, unreachable endpoint).
    #[error("delivery stream {stream_name} is unavailable: {message}")]
    StreamUnavailable {
        /// Name of the delivery stream.
        stream_name: String,
        /// Service error description.
        message: String,
    },

    /// The streaming service rejected or failed a put call.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// An event could not be serialized to JSON.
    #[error(transparent)]
    Serialization(Arc<serde_json::Error>),

    /// The sink was never initialized or its initialization failed.
    #[error("sink is unavailable")]
    SinkUnavailable,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Runtime(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(value))
    }
}
