use std::collections::{BTreeMap, HashMap};

use prost::Message;
use prost_types::Any;

use super::RawEvent;
use crate::containerd::proto::events::{
    ContainerCreate, ContainerDelete, ContainerUpdate, ImageCreate, ImageDelete, ImageUpdate,
    TaskCreate, TaskDelete, TaskExit, TaskOom, TaskPaused, TaskResumed, TaskStart,
};
use crate::containerd::proto::events_service::Envelope;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("unknown event type `{type_url}`")]
    UnknownEvent { type_url: String },
    #[error("failed to decode event type `{type_url}`: {source}")]
    EventDecode {
        type_url: String,
        #[source]
        source: prost::DecodeError,
    },
}

/// Decoded payload of an event envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    ContainerCreate(ContainerCreate),
    ContainerUpdate(ContainerUpdate),
    ContainerDelete(ContainerDelete),
    ImageCreate(ImageCreate),
    ImageUpdate(ImageUpdate),
    ImageDelete(ImageDelete),
    TaskCreate(TaskCreate),
    TaskStart(TaskStart),
    TaskDelete(TaskDelete),
    TaskExit(TaskExit),
    TaskOom(TaskOom),
    TaskPaused(TaskPaused),
    TaskResumed(TaskResumed),
}

fn decode_as<M: Message + Default>(event: &Any) -> Result<M, PayloadError> {
    M::decode(event.value.as_slice()).map_err(|source| PayloadError::EventDecode {
        type_url: event.type_url.clone(),
        source,
    })
}

/// Decodes the payload of an event envelope based on its type URL.
pub fn decode_payload(event: &Any) -> Result<Payload, PayloadError> {
    // Type URLs may carry a `<host>/` prefix.
    let name = event
        .type_url
        .rsplit_once('/')
        .map_or(event.type_url.as_str(), |(_, name)| name);

    let payload = match name {
        "containerd.events.ContainerCreate" => Payload::ContainerCreate(decode_as(event)?),
        "containerd.events.ContainerUpdate" => Payload::ContainerUpdate(decode_as(event)?),
        "containerd.events.ContainerDelete" => Payload::ContainerDelete(decode_as(event)?),
        "containerd.events.ImageCreate" => Payload::ImageCreate(decode_as(event)?),
        "containerd.events.ImageUpdate" => Payload::ImageUpdate(decode_as(event)?),
        "containerd.events.ImageDelete" => Payload::ImageDelete(decode_as(event)?),
        "containerd.events.TaskCreate" => Payload::TaskCreate(decode_as(event)?),
        "containerd.events.TaskStart" => Payload::TaskStart(decode_as(event)?),
        "containerd.events.TaskDelete" => Payload::TaskDelete(decode_as(event)?),
        "containerd.events.TaskExit" => Payload::TaskExit(decode_as(event)?),
        "containerd.events.TaskOOM" => Payload::TaskOom(decode_as(event)?),
        "containerd.events.TaskPaused" => Payload::TaskPaused(decode_as(event)?),
        "containerd.events.TaskResumed" => Payload::TaskResumed(decode_as(event)?),
        _ => {
            return Err(PayloadError::UnknownEvent {
                type_url: event.type_url.clone(),
            });
        }
    };

    Ok(payload)
}

fn labels_to_extra(labels: HashMap<String, String>) -> BTreeMap<String, String> {
    labels.into_iter().collect()
}

impl Payload {
    /// Splits the payload into the subject ID, a readable message and extra attributes.
    fn describe(self) -> (String, String, BTreeMap<String, String>) {
        match self {
            Payload::ContainerCreate(e) => {
                let mut extra = BTreeMap::new();
                extra.insert("image".to_owned(), e.image.clone());
                if let Some(runtime) = e.runtime {
                    extra.insert("runtime".to_owned(), runtime.name);
                }
                let message = format!("Container {} created, running the image {}", e.id, e.image);
                (e.id, message, extra)
            }
            Payload::ContainerUpdate(e) => {
                let message = format!(
                    "Container {} updated, running the image {}. Snapshot key: {}",
                    e.id, e.image, e.snapshot_key
                );
                (e.id, message, labels_to_extra(e.labels))
            }
            Payload::ContainerDelete(e) => {
                let message = format!("Container {} deleted", e.id);
                (e.id, message, BTreeMap::new())
            }
            Payload::ImageCreate(e) => {
                let message = format!("Image {} created", e.name);
                (e.name, message, labels_to_extra(e.labels))
            }
            Payload::ImageUpdate(e) => {
                let message = format!("Image {} updated", e.name);
                (e.name, message, labels_to_extra(e.labels))
            }
            Payload::ImageDelete(e) => {
                let message = format!("Image {} deleted", e.name);
                (e.name, message, BTreeMap::new())
            }
            Payload::TaskCreate(e) => {
                let message = format!("Task {} created with PID {}", e.container_id, e.pid);
                (e.container_id, message, BTreeMap::new())
            }
            Payload::TaskStart(e) => {
                let message = format!("Task {} started with PID {}", e.container_id, e.pid);
                (e.container_id, message, BTreeMap::new())
            }
            Payload::TaskDelete(e) => {
                let mut extra = BTreeMap::new();
                extra.insert("exit_status".to_owned(), e.exit_status.to_string());
                if !e.id.is_empty() {
                    extra.insert("exec_id".to_owned(), e.id);
                }
                let message = format!(
                    "Task {} deleted with exit code {}",
                    e.container_id, e.exit_status
                );
                (e.container_id, message, extra)
            }
            Payload::TaskExit(e) => {
                let mut extra = BTreeMap::new();
                extra.insert("exit_status".to_owned(), e.exit_status.to_string());
                extra.insert("pid".to_owned(), e.pid.to_string());
                let message = format!(
                    "Task {} exited with exit code {}",
                    e.container_id, e.exit_status
                );
                (e.container_id, message, extra)
            }
            Payload::TaskOom(e) => {
                let message = format!("Task {} ran out of memory", e.container_id);
                (e.container_id, message, BTreeMap::new())
            }
            Payload::TaskPaused(e) => {
                let message = format!("Task {} was paused", e.container_id);
                (e.container_id, message, BTreeMap::new())
            }
            Payload::TaskResumed(e) => {
                let message = format!("Task {} was resumed", e.container_id);
                (e.container_id, message, BTreeMap::new())
            }
        }
    }
}

impl RawEvent {
    /// Converts an event envelope received from containerd.
    ///
    /// Envelopes whose payload cannot be decoded are kept with an empty subject, so that topic
    /// based filtering and normalization still see them.
    pub fn from_envelope(envelope: Envelope) -> Self {
        let timestamp = envelope
            .timestamp
            .map(|ts| ts.seconds)
            .unwrap_or_else(unix_now);

        let decoded = envelope.event.as_ref().map(decode_payload);
        let (subject_id, message, extra) = match decoded {
            Some(Ok(payload)) => payload.describe(),
            Some(Err(err)) => {
                log::debug!("{}", err);
                (
                    String::new(),
                    format!("Event on topic {}", envelope.topic),
                    BTreeMap::new(),
                )
            }
            None => {
                log::debug!("No event payload attached to topic {}", envelope.topic);
                (
                    String::new(),
                    format!("Event on topic {}", envelope.topic),
                    BTreeMap::new(),
                )
            }
        };

        Self {
            topic: envelope.topic,
            timestamp,
            namespace: envelope.namespace,
            subject_id,
            message,
            extra,
        }
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(topic: &str, type_url: &str, value: Vec<u8>) -> Envelope {
        Envelope {
            timestamp: Some(prost_types::Timestamp {
                seconds: 1_700_000_000,
                nanos: 0,
            }),
            namespace: "k8s.io".to_owned(),
            topic: topic.to_owned(),
            event: Some(Any {
                type_url: type_url.to_owned(),
                value,
            }),
        }
    }

    #[test]
    fn test_task_start_envelope() {
        let payload = TaskStart {
            container_id: "abc".to_owned(),
            pid: 42,
        };
        let event = RawEvent::from_envelope(envelope(
            "/tasks/start",
            "containerd.events.TaskStart",
            payload.encode_to_vec(),
        ));

        assert_eq!(event.topic, "/tasks/start");
        assert_eq!(event.timestamp, 1_700_000_000);
        assert_eq!(event.namespace, "k8s.io");
        assert_eq!(event.subject_id, "abc");
        assert_eq!(event.message, "Task abc started with PID 42");
        assert!(event.extra.is_empty());
    }

    #[test]
    fn test_container_create_extra() {
        let payload = ContainerCreate {
            id: "abc".to_owned(),
            image: "docker.io/library/redis:latest".to_owned(),
            runtime: Some(crate::containerd::proto::containers::Runtime {
                name: "io.containerd.runc.v2".to_owned(),
            }),
        };
        let event = RawEvent::from_envelope(envelope(
            "/containers/create",
            "types.containerd.io/containerd.events.ContainerCreate",
            payload.encode_to_vec(),
        ));

        assert_eq!(event.subject_id, "abc");
        assert_eq!(
            event.extra.get("image").map(String::as_str),
            Some("docker.io/library/redis:latest")
        );
        assert_eq!(
            event.extra.get("runtime").map(String::as_str),
            Some("io.containerd.runc.v2")
        );
    }

    #[test]
    fn test_image_update_labels_become_extra() {
        let payload = ImageUpdate {
            name: "redis".to_owned(),
            labels: HashMap::from([("foo".to_owned(), "baz".to_owned())]),
        };
        let event = RawEvent::from_envelope(envelope(
            "/images/update",
            "containerd.events.ImageUpdate",
            payload.encode_to_vec(),
        ));

        assert_eq!(event.subject_id, "redis");
        assert_eq!(event.message, "Image redis updated");
        assert_eq!(event.extra.get("foo").map(String::as_str), Some("baz"));
    }

    #[test]
    fn test_unknown_payload_is_kept() {
        let event = RawEvent::from_envelope(envelope(
            "/snapshot/prepare",
            "containerd.events.SnapshotPrepare",
            Vec::new(),
        ));

        assert_eq!(event.topic, "/snapshot/prepare");
        assert!(event.subject_id.is_empty());
        assert_eq!(event.message, "Event on topic /snapshot/prepare");
    }

    #[test]
    fn test_decode_errors() {
        let err = decode_payload(&Any {
            type_url: "containerd.events.Nope".to_owned(),
            value: Vec::new(),
        })
        .unwrap_err();
        assert!(matches!(err, PayloadError::UnknownEvent { .. }));

        let err = decode_payload(&Any {
            type_url: "containerd.events.TaskStart".to_owned(),
            value: vec![0xff, 0xff],
        })
        .unwrap_err();
        assert!(matches!(err, PayloadError::EventDecode { .. }));
    }
}
