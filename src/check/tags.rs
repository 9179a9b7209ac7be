use crate::containerd::{self, Container, Runtime};

/// Builds the tags describing `container` from its runtime metadata.
///
/// Tags come in the order image, labels, runtime. The first failing lookup stops the assembly:
/// its error is returned alongside the tags gathered up to that point.
pub async fn collect_tags<R: Runtime>(
    runtime: &R,
    container: &Container,
) -> (Vec<String>, Option<containerd::Error>) {
    let mut tags = Vec::new();

    let image = match runtime.image(container).await {
        Ok(image) => image,
        Err(err) => return (tags, Some(err)),
    };
    tags.push(format!("image:{}", image.name));

    let labels = match runtime.labels(container).await {
        Ok(labels) => labels,
        Err(err) => return (tags, Some(err)),
    };
    tags.extend(labels.iter().map(|(key, value)| format!("{key}:{value}")));

    match runtime.info(container).await {
        Ok(info) => tags.push(format!("runtime:{}", info.runtime)),
        Err(err) => return (tags, Some(err)),
    }

    (tags, None)
}
