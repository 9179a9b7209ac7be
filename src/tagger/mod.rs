//! Entity tag lookup.
//!
//! Tags attached to a container by the [`Tagger`] come on top of the tags the check derives from
//! runtime metadata. [`Store`] is an in-process implementation refreshed from the runtime.

mod store;

pub use store::{EntityTags, Store};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no tags known for entity `{0}`")]
    UnknownEntity(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait Tagger: Send + Sync {
    /// Returns the tags of `entity_id`, including high cardinality ones if requested.
    fn tag(&self, entity_id: &str, high_cardinality: bool) -> Result<Vec<String>>;
}
