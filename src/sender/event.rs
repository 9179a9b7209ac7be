#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
}

/// A structured event record.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Event {
    pub priority: Priority,
    pub host: String,
    pub source_type: String,
    pub event_type: String,
    pub aggregation_key: String,
    pub title: String,
    pub text: String,
    pub tags: Vec<String>,
    /// UNIX epoch seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Gauge {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
}

/// Everything committed by one check run.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Snapshot {
    /// UNIX epoch seconds of the commit, `0` before the first one.
    pub committed_at: u64,
    pub gauges: Vec<Gauge>,
    pub events: Vec<Event>,
}
