//! Decoding of the opaque resource usage payloads returned by containerd's task service.
//!
//! A task reports its usage as a `google.protobuf.Any`: a type URL plus the encoded message.
//! The [`Registry`] maps each known type URL to a decode function producing a [`Metrics`]
//! snapshot, so new payload kinds can be supported without touching call sites.
//!
//! # Example
//!
//! ```rust
//! use containerd_check::stats::{CGROUPS_V1_METRICS, Registry};
//!
//! let registry = Registry::with_defaults();
//! let payload = prost_types::Any {
//!     type_url: CGROUPS_V1_METRICS.to_owned(),
//!     value: Vec::new(),
//! };
//! let metrics = registry.decode(&payload).unwrap();
//! assert!(metrics.memory.is_none());
//! ```

pub mod cgroups;
mod error;
mod registry;

pub use cgroups::Metrics;
pub use error::{Error, Result};
pub use registry::{CGROUPS_V1_METRICS, DecodeFn, Registry};
