use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use super::RawEvent;
use crate::containerd::{self, EventStream, Runtime};

/// Connection state of a [`Subscriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// No subscription was attempted yet.
    #[default]
    Idle,
    /// A listener task is consuming the event stream.
    Streaming,
    /// The last subscription attempt or the stream itself failed.
    Failed,
}

#[derive(Debug, Default)]
struct Inner {
    state: State,
    buffer: Vec<RawEvent>,
}

/// State shared between the poll cycle and the listener task.
#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Buffers runtime events between two poll cycles.
///
/// The subscription is owned by a background task that appends every event whose topic passes
/// the filters. [`Subscriber::flush`] drains everything buffered so far. A failed stream is not
/// retried by the task itself; the next [`Subscriber::ensure_streaming`] call subscribes again.
#[derive(Debug)]
pub struct Subscriber {
    name: String,
    namespace: String,
    filters: Arc<[String]>,
    shared: Arc<Shared>,
    listener: Option<JoinHandle<()>>,
    last_flush: Option<i64>,
}

impl Subscriber {
    /// Creates an idle subscriber for `namespace`.
    ///
    /// An event is kept if its topic contains at least one of `filters`, or always if `filters`
    /// is empty.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, filters: Vec<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            filters: filters.into(),
            shared: Arc::default(),
            listener: None,
            last_flush: None,
        }
    }

    pub fn state(&self) -> State {
        self.shared.lock().state
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == State::Streaming
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of events buffered since the last flush.
    pub fn pending(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    /// UNIX timestamp passed to the most recent [`Subscriber::flush`].
    pub fn last_flush(&self) -> Option<i64> {
        self.last_flush
    }

    /// Subscribes to the runtime's event bus unless a listener is already streaming.
    ///
    /// # Errors
    ///
    /// Returns the runtime error if the subscription cannot be established. The subscriber is
    /// then [`State::Failed`] and the next call tries again.
    pub async fn ensure_streaming<R: Runtime>(&mut self, runtime: &R) -> containerd::Result<()> {
        if self.is_streaming() {
            return Ok(());
        }

        let stream = match runtime.subscribe_events(&self.namespace).await {
            Ok(stream) => stream,
            Err(err) => {
                self.shared.lock().state = State::Failed;
                return Err(err);
            }
        };

        if let Some(previous) = self.listener.take() {
            previous.abort();
        }
        self.shared.lock().state = State::Streaming;
        log::debug!(
            "{}: subscribed to events of namespace `{}`",
            self.name,
            self.namespace
        );

        self.listener = Some(tokio::spawn(listen(
            self.name.clone(),
            stream,
            Arc::clone(&self.filters),
            Arc::clone(&self.shared),
        )));

        Ok(())
    }

    /// Drains the buffer, returning events in arrival order.
    pub fn flush(&mut self, now: i64) -> Vec<RawEvent> {
        let events = std::mem::take(&mut self.shared.lock().buffer);
        if let Some(previous) = self.last_flush {
            log::trace!(
                "{}: flushed {} events received over the last {}s",
                self.name,
                events.len(),
                now - previous
            );
        }
        self.last_flush = Some(now);
        events
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn matches_filters(filters: &[String], topic: &str) -> bool {
    filters.is_empty() || filters.iter().any(|filter| topic.contains(filter.as_str()))
}

async fn listen<S: EventStream>(
    name: String,
    mut stream: S,
    filters: Arc<[String]>,
    shared: Arc<Shared>,
) {
    loop {
        match stream.next_event().await {
            Ok(Some(event)) => {
                if matches_filters(&filters, &event.topic) {
                    shared.lock().buffer.push(event);
                } else {
                    log::trace!("{}: ignoring event on topic {}", name, event.topic);
                }
            }
            Ok(None) => {
                log::info!("{}: event stream closed by the runtime", name);
                break;
            }
            Err(err) => {
                log::error!("{}: event stream failed: {}", name, err);
                break;
            }
        }
    }

    shared.lock().state = State::Failed;
}
