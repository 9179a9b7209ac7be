use std::sync::{Arc, PoisonError, RwLock};

use super::{Event, Gauge, Sender, Snapshot};

/// Read handle on the latest committed [`Snapshot`].
#[derive(Debug, Clone, Default)]
pub struct Published(Arc<RwLock<Snapshot>>);

impl Published {
    pub fn latest(&self) -> Snapshot {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// [`Sender`] buffering a run's output and publishing it on commit.
#[derive(Debug, Default)]
pub struct Aggregator {
    pending: Snapshot,
    published: Published,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Published {
        self.published.clone()
    }
}

impl Sender for Aggregator {
    fn gauge(&mut self, name: &str, value: f64, tags: &[String]) {
        self.pending.gauges.push(Gauge {
            name: name.to_owned(),
            value,
            tags: tags.to_vec(),
        });
    }

    fn event(&mut self, event: Event) {
        self.pending.events.push(event);
    }

    fn commit(&mut self) {
        let mut snapshot = std::mem::take(&mut self.pending);
        snapshot.committed_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        log::debug!(
            "Committing {} gauges and {} events",
            snapshot.gauges.len(),
            snapshot.events.len()
        );
        *self
            .published
            .0
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}
