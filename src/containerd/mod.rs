//! Access to the containerd daemon.
//!
//! The check only talks to the runtime through the [`Runtime`] trait, so the poll cycle can be
//! driven against an in-memory runtime in tests. [`Client`] implements it over containerd's gRPC
//! API on a unix socket, and [`Connector`] produces a fresh [`Client`] for every poll cycle.

mod client;
mod error;
pub mod image;
pub mod proto;

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use prost_types::Any;

pub use client::{Client, Connector, EventSubscription};
pub use error::{Error, Result};

use crate::container::ContainerID;
use crate::events::RawEvent;

/// Namespace used when the configuration does not name one.
pub const DEFAULT_NAMESPACE: &str = "k8s.io";

/// Default location of the containerd socket on the host.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/containerd/containerd.sock";

/// Handle on a container known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: ContainerID,
}

/// The primary process of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub container_id: ContainerID,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub name: String,
    pub target: Option<proto::types::Descriptor>,
}

/// Container metadata as stored by containerd.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Name of the shim runtime, e.g. `io.containerd.runc.v2`.
    pub runtime: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Version {
    pub version: String,
    pub revision: String,
}

/// A live subscription to the runtime's event bus.
pub trait EventStream: Send + 'static {
    /// Waits for the next event.
    ///
    /// Returns `Ok(None)` once the runtime closed the stream.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<RawEvent>>> + Send;
}

/// Operations the check needs from a container runtime, scoped to one namespace.
pub trait Runtime: Send + Sync {
    type Events: EventStream;

    fn namespace(&self) -> &str;

    fn containers(&self) -> impl Future<Output = Result<Vec<Container>>> + Send;

    fn task(&self, container: &Container) -> impl Future<Output = Result<Task>> + Send;

    /// Returns the raw, type-tagged resource usage payload of `task`.
    fn task_metrics(&self, task: &Task) -> impl Future<Output = Result<Any>> + Send;

    fn image(&self, container: &Container) -> impl Future<Output = Result<Image>> + Send;

    /// Returns the size in bytes of `image`, including its config and layers.
    fn image_size(&self, image: &Image) -> impl Future<Output = Result<u64>> + Send;

    fn labels(
        &self,
        container: &Container,
    ) -> impl Future<Output = Result<HashMap<String, String>>> + Send;

    fn info(&self, container: &Container) -> impl Future<Output = Result<ContainerInfo>> + Send;

    /// Subscribes to every event published in `namespace`.
    fn subscribe_events(&self, namespace: &str) -> impl Future<Output = Result<Self::Events>> + Send;

    fn version(&self) -> impl Future<Output = Result<Version>> + Send;
}

/// Establishes connectivity with a runtime.
pub trait Connect: Send + Sync {
    type Runtime: Runtime;

    fn connect(
        &self,
        socket_path: &Path,
        namespace: &str,
    ) -> impl Future<Output = Result<Self::Runtime>> + Send;
}
