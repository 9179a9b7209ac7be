use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to socket `{path}`: {source}")]
    SocketConnect {
        path: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("invalid namespace `{namespace}`: {source}")]
    InvalidNamespace {
        namespace: String,
        #[source]
        source: tonic::metadata::errors::InvalidMetadataValue,
    },
    #[error("call to `{method}` failed: {source}")]
    Rpc {
        method: &'static str,
        #[source]
        source: Box<tonic::Status>,
    },
    #[error("call to `{method}` timed out after {timeout:?}")]
    Timeout {
        method: &'static str,
        timeout: std::time::Duration,
    },
    #[error("{kind} not found for `{id}`")]
    NotFound { kind: &'static str, id: String },
    #[error("failed to receive event message: {0}")]
    EventMessage(#[source] Box<tonic::Status>),
    #[error("failed to parse blob `{digest}`: {source}")]
    Blob {
        digest: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported media type `{media_type}` for blob `{digest}`")]
    UnsupportedMediaType { digest: String, media_type: String },
    #[error("image size overflows at blob `{digest}`")]
    SizeOverflow { digest: String },
    #[error("invalid size {size} for blob `{digest}`")]
    InvalidSize { digest: String, size: i64 },
}

pub type Result<T> = std::result::Result<T, Error>;
