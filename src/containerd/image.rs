//! Image size computation.
//!
//! An image's size is the size of its target descriptor plus, for a manifest, the sizes of the
//! config and layer blobs it references. An index (multi-platform image) contributes its own
//! size plus the size of the manifest matching the running platform.

use std::future::Future;

use super::proto::types::Descriptor;
use super::{Error, Result};

const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Read access to content-addressed blobs.
pub trait ContentStore: Send + Sync {
    fn read_blob(&self, digest: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

#[derive(Debug, serde::Deserialize)]
struct BlobDescriptor {
    #[serde(rename = "mediaType", default)]
    media_type: String,
    digest: String,
    size: i64,
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Debug, serde::Deserialize)]
struct Platform {
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    os: String,
}

#[derive(Debug, serde::Deserialize)]
struct Index {
    #[serde(default)]
    manifests: Vec<BlobDescriptor>,
}

#[derive(Debug, serde::Deserialize)]
struct Manifest {
    config: BlobDescriptor,
    #[serde(default)]
    layers: Vec<BlobDescriptor>,
}

/// Computes the total size of the image whose root is `target`.
///
/// # Errors
///
/// Fails if a blob cannot be read or parsed, a size is negative, the total does not fit in a
/// `u64`, or the target has a media type that is neither an index nor a manifest.
pub async fn image_size<S: ContentStore>(store: &S, target: &Descriptor) -> Result<u64> {
    let mut total = checked_size(&target.digest, target.size)?;

    let manifest = match target.media_type.as_str() {
        OCI_INDEX | DOCKER_MANIFEST_LIST => {
            let index: Index = read_json(store, &target.digest).await?;
            let Some(manifest) = select_platform(&index.manifests) else {
                return Ok(total);
            };
            total = add_size(total, &manifest.digest, manifest.size)?;
            read_json::<_, Manifest>(store, &manifest.digest).await?
        }
        OCI_MANIFEST | DOCKER_MANIFEST => read_json(store, &target.digest).await?,
        other => {
            return Err(Error::UnsupportedMediaType {
                digest: target.digest.clone(),
                media_type: other.to_owned(),
            });
        }
    };

    total = add_size(total, &manifest.config.digest, manifest.config.size)?;
    for layer in &manifest.layers {
        total = add_size(total, &layer.digest, layer.size)?;
    }

    Ok(total)
}

async fn read_json<S, T>(store: &S, digest: &str) -> Result<T>
where
    S: ContentStore,
    T: serde::de::DeserializeOwned,
{
    let blob = store.read_blob(digest).await?;
    serde_json::from_slice(&blob).map_err(|source| Error::Blob {
        digest: digest.to_owned(),
        source,
    })
}

fn checked_size(digest: &str, size: i64) -> Result<u64> {
    u64::try_from(size).map_err(|_| Error::InvalidSize {
        digest: digest.to_owned(),
        size,
    })
}

fn add_size(total: u64, digest: &str, size: i64) -> Result<u64> {
    total
        .checked_add(checked_size(digest, size)?)
        .ok_or_else(|| Error::SizeOverflow {
            digest: digest.to_owned(),
        })
}

/// Picks the manifest built for the running platform, falling back to the first one listed.
fn select_platform(manifests: &[BlobDescriptor]) -> Option<&BlobDescriptor> {
    let arch = go_arch();
    manifests
        .iter()
        .find(|m| {
            m.platform
                .as_ref()
                .is_some_and(|p| p.os == "linux" && p.architecture == arch)
        })
        .or_else(|| manifests.first())
}

fn go_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        blobs: HashMap<String, Vec<u8>>,
    }

    impl MemoryStore {
        fn with(mut self, digest: &str, json: &str) -> Self {
            self.blobs.insert(digest.to_owned(), json.as_bytes().to_vec());
            self
        }
    }

    impl ContentStore for MemoryStore {
        async fn read_blob(&self, digest: &str) -> Result<Vec<u8>> {
            self.blobs.get(digest).cloned().ok_or(Error::NotFound {
                kind: "blob",
                id: digest.to_owned(),
            })
        }
    }

    fn descriptor(media_type: &str, digest: &str, size: i64) -> Descriptor {
        Descriptor {
            media_type: media_type.to_owned(),
            digest: digest.to_owned(),
            size,
            ..Default::default()
        }
    }

    const MANIFEST: &str = r#"{
        "schemaVersion": 2,
        "config": {"mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:c", "size": 100},
        "layers": [
            {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:l1", "size": 1000},
            {"mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:l2", "size": 2000}
        ]
    }"#;

    #[tokio::test]
    async fn test_manifest_size() {
        let store = MemoryStore::default().with("sha256:m", MANIFEST);
        let size = image_size(&store, &descriptor(OCI_MANIFEST, "sha256:m", 10))
            .await
            .unwrap();
        assert_eq!(size, 10 + 100 + 1000 + 2000);
    }

    #[tokio::test]
    async fn test_index_size_uses_single_manifest() {
        let index = format!(
            r#"{{"manifests": [
                {{"mediaType": "{OCI_MANIFEST}", "digest": "sha256:other", "size": 7,
                  "platform": {{"architecture": "not-an-arch", "os": "linux"}}}},
                {{"mediaType": "{OCI_MANIFEST}", "digest": "sha256:m", "size": 10,
                  "platform": {{"architecture": "{}", "os": "linux"}}}}
            ]}}"#,
            go_arch()
        );
        let store = MemoryStore::default()
            .with("sha256:i", &index)
            .with("sha256:m", MANIFEST);
        let size = image_size(&store, &descriptor(OCI_INDEX, "sha256:i", 5))
            .await
            .unwrap();
        assert_eq!(size, 5 + 10 + 100 + 1000 + 2000);
    }

    #[tokio::test]
    async fn test_empty_index_counts_only_itself() {
        let store = MemoryStore::default().with("sha256:i", r#"{"manifests": []}"#);
        let size = image_size(&store, &descriptor(DOCKER_MANIFEST_LIST, "sha256:i", 5))
            .await
            .unwrap();
        assert_eq!(size, 5);
    }

    #[tokio::test]
    async fn test_unsupported_media_type() {
        let store = MemoryStore::default();
        let err = image_size(&store, &descriptor("text/plain", "sha256:x", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaType { .. }));
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = MemoryStore::default();
        let err = image_size(&store, &descriptor(OCI_MANIFEST, "sha256:m", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_total_overflow_is_an_error() {
        let huge = i64::MAX;
        let manifest = format!(
            r#"{{
                "config": {{"digest": "sha256:c", "size": {huge}}},
                "layers": [
                    {{"digest": "sha256:l1", "size": {huge}}},
                    {{"digest": "sha256:l2", "size": {huge}}}
                ]
            }}"#
        );
        let store = MemoryStore::default().with("sha256:m", &manifest);
        let err = image_size(&store, &descriptor(OCI_MANIFEST, "sha256:m", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SizeOverflow { ref digest } if digest == "sha256:l2"));
    }
}
