//! Emission of gauges and events towards the monitoring backend.
//!
//! Checks only see the [`Sender`] trait. The [`Aggregator`] implementation keeps everything
//! submitted since the previous commit and publishes it as the latest [`Snapshot`] on commit.

mod aggregator;
mod event;

pub use aggregator::{Aggregator, Published};
pub use event::{Event, Gauge, Priority, Snapshot};

/// Sink for the output of a check run.
pub trait Sender: Send {
    fn gauge(&mut self, name: &str, value: f64, tags: &[String]);

    fn event(&mut self, event: Event);

    /// Marks the end of a check run; everything submitted since the last commit becomes visible.
    fn commit(&mut self);
}
