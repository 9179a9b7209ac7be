use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

use super::{Error, Result, Tagger};
use crate::container::ContainerID;
use crate::containerd::{self, Runtime};

/// Kubernetes labels set by the CRI plugin, and the tag name each one maps to.
const LABEL_TAGS: [(&str, &str); 3] = [
    ("io.kubernetes.pod.namespace", "kube_namespace"),
    ("io.kubernetes.pod.name", "pod_name"),
    ("io.kubernetes.container.name", "kube_container_name"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityTags {
    pub low: Vec<String>,
    pub high: Vec<String>,
}

impl EntityTags {
    fn from_labels(container_id: &ContainerID, labels: &HashMap<String, String>) -> Self {
        let low = LABEL_TAGS
            .iter()
            .filter_map(|(label, tag)| labels.get(*label).map(|value| format!("{tag}:{value}")))
            .collect();

        Self {
            low,
            high: vec![format!("container_id:{container_id}")],
        }
    }
}

/// Tags of the containers currently known to the runtime.
#[derive(Debug, Default)]
pub struct Store {
    entities: DashMap<ContainerID, EntityTags>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, container_id: ContainerID, tags: EntityTags) {
        self.entities.insert(container_id, tags);
    }

    pub fn size(&self) -> usize {
        self.entities.len()
    }

    /// Re-reads the labels of every container and forgets containers that are gone.
    ///
    /// A container whose labels cannot be read keeps its previous tags.
    ///
    /// # Errors
    ///
    /// Returns the runtime error if the containers cannot be listed; the store is left untouched.
    pub async fn refresh<R: Runtime>(&self, runtime: &R) -> containerd::Result<()> {
        let containers = runtime.containers().await?;
        let mut seen = HashSet::with_capacity(containers.len());

        for container in containers {
            match runtime.labels(&container).await {
                Ok(labels) => {
                    let tags = EntityTags::from_labels(&container.id, &labels);
                    self.set(container.id.clone(), tags);
                }
                Err(err) => log::warn!(
                    "failed to refresh tags of container {}: {}",
                    container.id.short(),
                    err
                ),
            }
            seen.insert(container.id);
        }

        self.entities.retain(|container_id, _| {
            let keep = seen.contains(container_id);
            if !keep {
                log::debug!("Forgetting tags of container {}", container_id.short());
            }
            keep
        });

        Ok(())
    }
}

impl Tagger for Store {
    fn tag(&self, entity_id: &str, high_cardinality: bool) -> Result<Vec<String>> {
        let tags = self
            .entities
            .get(entity_id)
            .ok_or_else(|| Error::UnknownEntity(entity_id.to_owned()))?;

        let mut out = tags.low.clone();
        if high_cardinality {
            out.extend(tags.high.iter().cloned());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeContainer, FakeRuntime};

    fn id(raw: &str) -> ContainerID {
        ContainerID::new(raw).unwrap()
    }

    #[test]
    fn test_tag_cardinality() {
        let store = Store::new();
        store.set(
            id("abc"),
            EntityTags {
                low: vec!["kube_namespace:default".to_owned()],
                high: vec!["container_id:abc".to_owned()],
            },
        );

        assert_eq!(
            store.tag("abc", false).unwrap(),
            vec!["kube_namespace:default"]
        );
        assert_eq!(
            store.tag("abc", true).unwrap(),
            vec!["kube_namespace:default", "container_id:abc"]
        );
        assert!(matches!(
            store.tag("missing", true),
            Err(Error::UnknownEntity(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_adds_and_forgets_containers() {
        let runtime = FakeRuntime::default();
        runtime.add_container(
            "abc",
            FakeContainer::default().with_labels(&[
                ("io.kubernetes.pod.namespace", "default"),
                ("io.kubernetes.pod.name", "redis-0"),
                ("unrelated", "label"),
            ]),
        );

        let store = Store::new();
        store.set(id("gone"), EntityTags::default());
        store.refresh(&runtime).await.unwrap();

        assert_eq!(store.size(), 1);
        assert_eq!(
            store.tag("abc", true).unwrap(),
            vec![
                "kube_namespace:default",
                "pod_name:redis-0",
                "container_id:abc"
            ]
        );
        assert!(store.tag("gone", false).is_err());
    }

    #[tokio::test]
    async fn test_refresh_keeps_tags_when_labels_fail() {
        let runtime = FakeRuntime::default();
        runtime.add_container("abc", FakeContainer::default().with_labels(&[]));

        let store = Store::new();
        store.refresh(&runtime).await.unwrap();
        assert_eq!(store.tag("abc", true).unwrap(), vec!["container_id:abc"]);

        runtime.add_container("abc", FakeContainer::default().without_labels());
        store.refresh(&runtime).await.unwrap();
        assert_eq!(store.tag("abc", true).unwrap(), vec!["container_id:abc"]);
    }

    #[tokio::test]
    async fn test_refresh_listing_failure_leaves_store() {
        let runtime = FakeRuntime::default();
        runtime.fail_containers(true);

        let store = Store::new();
        store.set(id("abc"), EntityTags::default());
        assert!(store.refresh(&runtime).await.is_err());
        assert_eq!(store.size(), 1);
    }
}
