use super::CHECK_NAME;
use crate::events::RawEvent;
use crate::sender::{Event, Priority, Sender};
use crate::tagger::Tagger;

/// Categories whose events are about a container, and get that container's tags.
const CONTAINER_CATEGORIES: [&str; 2] = ["containers", "tasks"];

/// Turns a raw runtime event into an event record.
///
/// Returns `None` unless the topic has the `/<category>/<action>` shape. Container and task
/// events are enriched with the high cardinality tags of their container; if those cannot be
/// looked up the record is still produced without them.
pub fn normalize(
    hostname: &str,
    event: &RawEvent,
    user_tags: &[String],
    tagger: &dyn Tagger,
) -> Option<Event> {
    let segments: Vec<&str> = event.topic.split('/').collect();
    let [_, category, _] = segments.as_slice() else {
        log::trace!("Event topic {} does not have the expected format", event.topic);
        return None;
    };

    let mut tags: Vec<String> = event
        .extra
        .iter()
        .map(|(key, value)| format!("{key}:{value}"))
        .collect();
    tags.extend_from_slice(user_tags);

    if CONTAINER_CATEGORIES.contains(category) {
        match tagger.tag(&event.subject_id, true) {
            Ok(tagger_tags) => tags.extend(tagger_tags),
            Err(err) => log::error!(
                "Could not retrieve tags for the container {}: {}",
                event.subject_id,
                err
            ),
        }
    }

    Some(Event {
        priority: Priority::Normal,
        host: hostname.to_owned(),
        source_type: CHECK_NAME.to_owned(),
        event_type: CHECK_NAME.to_owned(),
        aggregation_key: format!("containerd:{}", event.topic),
        title: format!("Event on {category} from Containerd"),
        text: event.message.clone(),
        tags,
        timestamp: event.timestamp,
    })
}

/// Submits a record for every well formed event in `events`.
pub fn compute_events(
    hostname: &str,
    events: &[RawEvent],
    sender: &mut dyn Sender,
    user_tags: &[String],
    tagger: &dyn Tagger,
) {
    for event in events {
        if let Some(record) = normalize(hostname, event, user_tags, tagger) {
            sender.event(record);
        }
    }
}
