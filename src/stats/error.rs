#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("type with url {type_url}: not found")]
    TypeNotFound { type_url: String },
    #[error("failed to decode payload of type `{type_url}`: {source}")]
    Decode {
        type_url: String,
        #[source]
        source: prost::DecodeError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
