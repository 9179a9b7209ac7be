use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use prost_types::Any;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::Channel;

use super::image::{self, ContentStore};
use super::proto::containers::{
    Container as ContainerRecord, GetContainerRequest, GetContainerResponse, ListContainersRequest,
    ListContainersResponse,
};
use super::proto::content::{ReadContentRequest, ReadContentResponse};
use super::proto::events_service::{Envelope, SubscribeRequest};
use super::proto::images::{GetImageRequest, GetImageResponse};
use super::proto::tasks::{GetRequest, GetResponse, MetricsRequest, MetricsResponse};
use super::proto::version::VersionResponse;
use super::{
    Connect, Container, ContainerInfo, Error, EventStream, Image, Result, Runtime, Task, Version,
};
use crate::container::ContainerID;
use crate::events::RawEvent;

const NAMESPACE_HEADER: &str = "containerd-namespace";

const CONTAINERS_LIST: &str = "/containerd.services.containers.v1.Containers/List";
const CONTAINERS_GET: &str = "/containerd.services.containers.v1.Containers/Get";
const TASKS_GET: &str = "/containerd.services.tasks.v1.Tasks/Get";
const TASKS_METRICS: &str = "/containerd.services.tasks.v1.Tasks/Metrics";
const IMAGES_GET: &str = "/containerd.services.images.v1.Images/Get";
const CONTENT_READ: &str = "/containerd.services.content.v1.Content/Read";
const EVENTS_SUBSCRIBE: &str = "/containerd.services.events.v1.Events/Subscribe";
const VERSION: &str = "/containerd.services.version.v1.Version/Version";

/// Default time budget of a single unary call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// gRPC client for the containerd API, bound to a single namespace.
#[derive(Debug, Clone)]
pub struct Client {
    channel: Channel,
    namespace: String,
    namespace_value: MetadataValue<Ascii>,
    timeout: Duration,
}

impl Client {
    /// Connects to the containerd socket at `socket_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SocketConnect`] if the socket is unreachable and
    /// [`Error::InvalidNamespace`] if `namespace` cannot be sent as request metadata.
    pub async fn connect(socket_path: impl AsRef<Path>, namespace: &str) -> Result<Self> {
        let path = socket_path.as_ref();
        let channel = crate::grpc::channel_for_unix_socket(path, DEFAULT_REQUEST_TIMEOUT)
            .await
            .map_err(|source| Error::SocketConnect {
                path: path.to_path_buf(),
                source,
            })?;

        Self::new(channel, namespace)
    }

    pub fn new(channel: Channel, namespace: &str) -> Result<Self> {
        let namespace_value =
            MetadataValue::from_str(namespace).map_err(|source| Error::InvalidNamespace {
                namespace: namespace.to_owned(),
                source,
            })?;

        Ok(Self {
            channel,
            namespace: namespace.to_owned(),
            namespace_value,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request
            .metadata_mut()
            .insert(NAMESPACE_HEADER, self.namespace_value.clone());
        request
    }

    async fn ready(&self, method: &'static str) -> Result<Grpc<Channel>> {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready().await.map_err(|err| Error::Rpc {
            method,
            source: Box::new(tonic::Status::unknown(format!(
                "service was not ready: {err}"
            ))),
        })?;
        Ok(grpc)
    }

    async fn unary<Req, Resp>(&self, method: &'static str, message: Req) -> Result<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let call = async move {
            let mut grpc = self.ready(method).await?;
            grpc.unary(
                self.request(message),
                PathAndQuery::from_static(method),
                ProstCodec::<Req, Resp>::default(),
            )
            .await
            .map(tonic::Response::into_inner)
            .map_err(|status| Error::Rpc {
                method,
                source: Box::new(status),
            })
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| Error::Timeout {
                method,
                timeout: self.timeout,
            })?
    }

    async fn get_container(&self, id: &ContainerID) -> Result<ContainerRecord> {
        let response: GetContainerResponse = self
            .unary(
                CONTAINERS_GET,
                GetContainerRequest {
                    id: id.to_string(),
                },
            )
            .await?;

        response.container.ok_or_else(|| Error::NotFound {
            kind: "container",
            id: id.to_string(),
        })
    }
}

impl Runtime for Client {
    type Events = EventSubscription;

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn containers(&self) -> Result<Vec<Container>> {
        let response: ListContainersResponse = self
            .unary(
                CONTAINERS_LIST,
                ListContainersRequest {
                    filters: Vec::default(),
                },
            )
            .await?;

        let mut containers = Vec::with_capacity(response.containers.len());
        for container in response.containers {
            match ContainerID::new(&container.id) {
                Ok(id) => containers.push(Container { id }),
                Err(err) => log::warn!("skipping container with invalid id: {}", err),
            }
        }
        Ok(containers)
    }

    async fn task(&self, container: &Container) -> Result<Task> {
        let response: GetResponse = self
            .unary(
                TASKS_GET,
                GetRequest {
                    container_id: container.id.to_string(),
                    exec_id: String::new(),
                },
            )
            .await?;

        if response.process.is_none() {
            return Err(Error::NotFound {
                kind: "task",
                id: container.id.to_string(),
            });
        }

        Ok(Task {
            container_id: container.id.clone(),
        })
    }

    async fn task_metrics(&self, task: &Task) -> Result<Any> {
        let response: MetricsResponse = self
            .unary(
                TASKS_METRICS,
                MetricsRequest {
                    filters: vec![format!("id=={}", task.container_id)],
                },
            )
            .await?;

        response
            .metrics
            .into_iter()
            .find_map(|metric| metric.data)
            .ok_or_else(|| Error::NotFound {
                kind: "task metrics",
                id: task.container_id.to_string(),
            })
    }

    async fn image(&self, container: &Container) -> Result<Image> {
        let record = self.get_container(&container.id).await?;
        if record.image.is_empty() {
            return Err(Error::NotFound {
                kind: "image",
                id: container.id.to_string(),
            });
        }

        let response: GetImageResponse = self
            .unary(
                IMAGES_GET,
                GetImageRequest {
                    name: record.image.clone(),
                },
            )
            .await?;
        let image = response.image.ok_or(Error::NotFound {
            kind: "image",
            id: record.image,
        })?;

        Ok(Image {
            name: image.name,
            target: image.target,
        })
    }

    async fn image_size(&self, image: &Image) -> Result<u64> {
        let target = image.target.as_ref().ok_or_else(|| Error::NotFound {
            kind: "image target",
            id: image.name.clone(),
        })?;
        image::image_size(self, target).await
    }

    async fn labels(&self, container: &Container) -> Result<HashMap<String, String>> {
        Ok(self.get_container(&container.id).await?.labels)
    }

    async fn info(&self, container: &Container) -> Result<ContainerInfo> {
        let record = self.get_container(&container.id).await?;
        Ok(ContainerInfo {
            runtime: record.runtime.map(|r| r.name).unwrap_or_default(),
        })
    }

    async fn subscribe_events(&self, namespace: &str) -> Result<EventSubscription> {
        let filters = vec![format!("namespace==\"{namespace}\"")];

        let mut grpc = self.ready(EVENTS_SUBSCRIBE).await?;
        let request = self.request(SubscribeRequest { filters });
        // containerd only sends response headers along with the first event, so the call is
        // resolved by the first `next_event` rather than here.
        let pending: PendingStream = Box::pin(async move {
            grpc.server_streaming(
                request,
                PathAndQuery::from_static(EVENTS_SUBSCRIBE),
                ProstCodec::<SubscribeRequest, Envelope>::default(),
            )
            .await
            .map(tonic::Response::into_inner)
            .map_err(|status| Error::Rpc {
                method: EVENTS_SUBSCRIBE,
                source: Box::new(status),
            })
        });

        Ok(EventSubscription {
            pending: Some(pending),
            stream: None,
        })
    }

    async fn version(&self) -> Result<Version> {
        let response: VersionResponse = self.unary(VERSION, ()).await?;
        Ok(Version {
            version: response.version,
            revision: response.revision,
        })
    }
}

impl ContentStore for Client {
    async fn read_blob(&self, digest: &str) -> Result<Vec<u8>> {
        let read = async move {
            let mut grpc = self.ready(CONTENT_READ).await?;
            let mut stream = grpc
                .server_streaming(
                    self.request(ReadContentRequest {
                        digest: digest.to_owned(),
                        offset: 0,
                        size: 0,
                    }),
                    PathAndQuery::from_static(CONTENT_READ),
                    ProstCodec::<ReadContentRequest, ReadContentResponse>::default(),
                )
                .await
                .map_err(|status| Error::Rpc {
                    method: CONTENT_READ,
                    source: Box::new(status),
                })?
                .into_inner();

            let mut blob = Vec::new();
            while let Some(chunk) = stream.message().await.map_err(|status| Error::Rpc {
                method: CONTENT_READ,
                source: Box::new(status),
            })? {
                blob.extend_from_slice(&chunk.data);
            }
            Ok(blob)
        };

        tokio::time::timeout(self.timeout, read)
            .await
            .map_err(|_| Error::Timeout {
                method: CONTENT_READ,
                timeout: self.timeout,
            })?
    }
}

type PendingStream =
    Pin<Box<dyn Future<Output = Result<tonic::Streaming<Envelope>>> + Send + 'static>>;

/// Event stream of a containerd subscription.
pub struct EventSubscription {
    pending: Option<PendingStream>,
    stream: Option<tonic::Streaming<Envelope>>,
}

impl EventStream for EventSubscription {
    async fn next_event(&mut self) -> Result<Option<RawEvent>> {
        if let Some(pending) = self.pending.take() {
            self.stream = Some(pending.await?);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let envelope = stream
            .message()
            .await
            .map_err(|status| Error::EventMessage(Box::new(status)))?;
        Ok(envelope.map(RawEvent::from_envelope))
    }
}

/// Opens a new [`Client`] on every call.
#[derive(Debug, Clone, Default)]
pub struct Connector;

impl Connect for Connector {
    type Runtime = Client;

    async fn connect(&self, socket_path: &Path, namespace: &str) -> Result<Client> {
        Client::connect(socket_path, namespace).await
    }
}
