//! In-memory runtime, sender and tagger used by the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use prost::Message;
use prost_types::Any;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::container::ContainerID;
use crate::containerd::{
    self, Connect, Container, ContainerInfo, EventStream, Image, Runtime, Task, Version,
};
use crate::events::RawEvent;
use crate::sender::{Event, Sender};
use crate::stats::{CGROUPS_V1_METRICS, Metrics};
use crate::tagger::{self, Tagger};

type EventResult = containerd::Result<RawEvent>;

fn not_found(kind: &'static str, id: &str) -> containerd::Error {
    containerd::Error::NotFound {
        kind,
        id: id.to_owned(),
    }
}

/// What the [`FakeRuntime`] knows about one container. `None` makes the matching lookup fail.
#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub image: Option<String>,
    pub image_size: Option<u64>,
    pub labels: Option<HashMap<String, String>>,
    pub runtime: Option<String>,
    pub metrics: Option<Any>,
}

impl Default for FakeContainer {
    fn default() -> Self {
        Self {
            image: Some("redis".to_owned()),
            image_size: Some(1024),
            labels: Some(HashMap::new()),
            runtime: Some("io.containerd.runc.v2".to_owned()),
            metrics: Some(metrics_payload(&Metrics::default())),
        }
    }
}

impl FakeContainer {
    pub fn with_labels(mut self, labels: &[(&str, &str)]) -> Self {
        self.labels = Some(
            labels
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        );
        self
    }

    pub fn without_labels(mut self) -> Self {
        self.labels = None;
        self
    }

    pub fn with_metrics(mut self, metrics: &Metrics) -> Self {
        self.metrics = Some(metrics_payload(metrics));
        self
    }
}

pub fn metrics_payload(metrics: &Metrics) -> Any {
    Any {
        type_url: CGROUPS_V1_METRICS.to_owned(),
        value: metrics.encode_to_vec(),
    }
}

#[derive(Debug, Default)]
struct State {
    containers: Mutex<BTreeMap<ContainerID, FakeContainer>>,
    fail_containers: AtomicBool,
    fail_subscribe: AtomicBool,
    subscriptions: AtomicUsize,
    subscribed_namespace: Mutex<Option<String>>,
    events: Mutex<Vec<UnboundedSender<EventResult>>>,
}

/// A [`Runtime`] backed by in-memory state. Clones share that state.
#[derive(Debug, Clone, Default)]
pub struct FakeRuntime {
    state: Arc<State>,
}

impl FakeRuntime {
    pub fn add_container(&self, id: &str, container: FakeContainer) {
        let id = ContainerID::new(id).unwrap();
        self.state.containers.lock().unwrap().insert(id, container);
    }

    pub fn fail_containers(&self, fail: bool) {
        self.state.fail_containers.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn subscriptions(&self) -> usize {
        self.state.subscriptions.load(Ordering::SeqCst)
    }

    /// Namespace passed to the most recent subscription.
    pub fn subscribed_namespace(&self) -> Option<String> {
        self.state.subscribed_namespace.lock().unwrap().clone()
    }

    /// Sender feeding the most recent subscription.
    pub fn events(&self) -> UnboundedSender<EventResult> {
        self.state
            .events
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no active subscription")
    }

    /// Ends every open subscription.
    pub fn close_events(&self) {
        self.state.events.lock().unwrap().clear();
    }

    fn container(&self, container: &Container) -> containerd::Result<FakeContainer> {
        self.state
            .containers
            .lock()
            .unwrap()
            .get(&container.id)
            .cloned()
            .ok_or_else(|| not_found("container", container.id.as_str()))
    }
}

#[derive(Debug)]
pub struct FakeEvents(UnboundedReceiver<EventResult>);

impl EventStream for FakeEvents {
    async fn next_event(&mut self) -> containerd::Result<Option<RawEvent>> {
        self.0.recv().await.transpose()
    }
}

impl Runtime for FakeRuntime {
    type Events = FakeEvents;

    fn namespace(&self) -> &str {
        containerd::DEFAULT_NAMESPACE
    }

    async fn containers(&self) -> containerd::Result<Vec<Container>> {
        if self.state.fail_containers.load(Ordering::SeqCst) {
            return Err(not_found("containers", "list"));
        }
        Ok(self
            .state
            .containers
            .lock()
            .unwrap()
            .keys()
            .map(|id| Container { id: id.clone() })
            .collect())
    }

    async fn task(&self, container: &Container) -> containerd::Result<Task> {
        let fake = self.container(container)?;
        if fake.metrics.is_none() {
            return Err(not_found("task", container.id.as_str()));
        }
        Ok(Task {
            container_id: container.id.clone(),
        })
    }

    async fn task_metrics(&self, task: &Task) -> containerd::Result<Any> {
        let container = Container {
            id: task.container_id.clone(),
        };
        self.container(&container)?
            .metrics
            .ok_or_else(|| not_found("task", task.container_id.as_str()))
    }

    async fn image(&self, container: &Container) -> containerd::Result<Image> {
        let name = self
            .container(container)?
            .image
            .ok_or_else(|| not_found("image", container.id.as_str()))?;
        Ok(Image { name, target: None })
    }

    async fn image_size(&self, image: &Image) -> containerd::Result<u64> {
        self.state
            .containers
            .lock()
            .unwrap()
            .values()
            .find(|c| c.image.as_deref() == Some(image.name.as_str()))
            .and_then(|c| c.image_size)
            .ok_or_else(|| not_found("image size", &image.name))
    }

    async fn labels(&self, container: &Container) -> containerd::Result<HashMap<String, String>> {
        self.container(container)?
            .labels
            .ok_or_else(|| not_found("labels", container.id.as_str()))
    }

    async fn info(&self, container: &Container) -> containerd::Result<ContainerInfo> {
        let runtime = self
            .container(container)?
            .runtime
            .ok_or_else(|| not_found("container info", container.id.as_str()))?;
        Ok(ContainerInfo { runtime })
    }

    async fn subscribe_events(&self, namespace: &str) -> containerd::Result<FakeEvents> {
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(not_found("event service", "subscribe"));
        }
        self.state.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self.state.subscribed_namespace.lock().unwrap() = Some(namespace.to_owned());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.state.events.lock().unwrap().push(tx);
        Ok(FakeEvents(rx))
    }

    async fn version(&self) -> containerd::Result<Version> {
        Ok(Version {
            version: "v1.7.27".to_owned(),
            revision: "05044ec0a9a75232cad458027ca83437aae3f4da".to_owned(),
        })
    }
}

/// Hands out clones of one [`FakeRuntime`], or fails when told to.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub runtime: FakeRuntime,
    fail: Arc<AtomicBool>,
}

impl FakeConnector {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Connect for FakeConnector {
    type Runtime = FakeRuntime;

    async fn connect(&self, socket_path: &Path, _namespace: &str) -> containerd::Result<FakeRuntime> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(not_found("socket", &socket_path.display().to_string()));
        }
        Ok(self.runtime.clone())
    }
}

/// A [`Sender`] recording everything it receives.
#[derive(Debug, Default)]
pub struct RecordingSender {
    pub gauges: Vec<(String, f64, Vec<String>)>,
    pub events: Vec<Event>,
    pub commits: usize,
}

impl RecordingSender {
    pub fn gauge_names(&self) -> Vec<&str> {
        self.gauges.iter().map(|(name, _, _)| name.as_str()).collect()
    }

    pub fn find_gauge(&self, name: &str) -> Option<&(String, f64, Vec<String>)> {
        self.gauges.iter().find(|(n, _, _)| n == name)
    }
}

impl Sender for RecordingSender {
    fn gauge(&mut self, name: &str, value: f64, tags: &[String]) {
        self.gauges.push((name.to_owned(), value, tags.to_vec()));
    }

    fn event(&mut self, event: Event) {
        self.events.push(event);
    }

    fn commit(&mut self) {
        self.commits += 1;
    }
}

/// A [`Tagger`] answering from a fixed map; unknown entities fail.
#[derive(Debug, Default)]
pub struct FakeTagger {
    tags: HashMap<String, Vec<String>>,
}

impl FakeTagger {
    pub fn with(mut self, entity_id: &str, tags: &[&str]) -> Self {
        self.tags.insert(
            entity_id.to_owned(),
            tags.iter().map(|t| (*t).to_owned()).collect(),
        );
        self
    }
}

impl Tagger for FakeTagger {
    fn tag(&self, entity_id: &str, high_cardinality: bool) -> tagger::Result<Vec<String>> {
        let mut tags = self
            .tags
            .get(entity_id)
            .cloned()
            .ok_or_else(|| tagger::Error::UnknownEntity(entity_id.to_owned()))?;
        if high_cardinality {
            tags.push(format!("container_id:{entity_id}"));
        }
        Ok(tags)
    }
}

pub fn raw_event(topic: &str) -> RawEvent {
    RawEvent {
        topic: topic.to_owned(),
        timestamp: 1_700_000_000,
        namespace: containerd::DEFAULT_NAMESPACE.to_owned(),
        ..Default::default()
    }
}

/// Polls `cond` until it holds, failing the test after a few seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
