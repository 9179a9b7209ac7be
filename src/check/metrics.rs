use prost::Message;

use super::tags::collect_tags;
use crate::containerd::{self, Container, Runtime};
use crate::sender::Sender;
use crate::stats::cgroups::{BlkIoEntry, BlkIoStat, CpuStat, HugetlbStat, MemoryEntry, MemoryStat};
use crate::stats::{self, Metrics};
use crate::tagger::Tagger;

#[derive(Debug, thiserror::Error)]
enum SnapshotError {
    #[error(transparent)]
    Runtime(#[from] containerd::Error),
    #[error(transparent)]
    Decode(#[from] stats::Error),
}

/// Emits the resource usage gauges of every running container.
///
/// Failures are scoped to the container they occur on: it is logged and skipped, the other
/// containers are still processed.
pub async fn compute_metrics<R: Runtime>(
    sender: &mut dyn Sender,
    runtime: &R,
    registry: &stats::Registry,
    user_tags: &[String],
    tagger: &dyn Tagger,
) {
    let containers = match runtime.containers().await {
        Ok(containers) => containers,
        Err(err) => {
            log::error!("{err}");
            return;
        }
    };

    for container in &containers {
        let short_id = container.id.short();
        let task = match runtime.task(container).await {
            Ok(task) => task,
            Err(err) => {
                log::trace!("Could not retrieve metrics from task {short_id}: {err}");
                continue;
            }
        };

        let (mut tags, err) = collect_tags(runtime, container).await;
        if let Some(err) = err {
            log::error!("Could not collect tags for container {short_id}: {err}");
        }
        tags.extend_from_slice(user_tags);

        match tagger.tag(container.id.as_str(), false) {
            Ok(tagger_tags) => tags.extend(tagger_tags),
            Err(err) => {
                log::error!("{err}");
                continue;
            }
        }

        let snapshot = match runtime
            .task_metrics(&task)
            .await
            .map_err(SnapshotError::from)
            .and_then(|payload| registry.decode(&payload).map_err(SnapshotError::from))
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::error!("Could not process the metrics from {}: {err}", container.id);
                continue;
            }
        };

        if let Err(err) = compute_image_size(sender, runtime, container, &tags).await {
            log::error!("Could not process metadata related metrics for {short_id}: {err}");
        }

        compute_snapshot(sender, &snapshot, &tags);
    }
}

async fn compute_image_size<R: Runtime>(
    sender: &mut dyn Sender,
    runtime: &R,
    container: &Container,
    tags: &[String],
) -> containerd::Result<()> {
    let image = runtime.image(container).await?;
    let size = runtime.image_size(&image).await?;
    sender.gauge("containerd.image.size", size as f64, tags);
    Ok(())
}

/// Emits the gauges of every sub-structure present in `metrics`.
pub fn compute_snapshot(sender: &mut dyn Sender, metrics: &Metrics, tags: &[String]) {
    if let Some(mem) = metrics.memory.as_ref().filter(|m| m.encoded_len() > 0) {
        compute_mem(sender, mem, tags);
    }

    if let Some(cpu) = &metrics.cpu {
        compute_cpu(sender, cpu, tags);
    }

    if let Some(blkio) = metrics.blkio.as_ref().filter(|b| b.encoded_len() > 0) {
        compute_blkio(sender, blkio, tags);
    }

    compute_hugetlb(sender, &metrics.hugetlb, tags);
}

pub fn compute_mem(sender: &mut dyn Sender, mem: &MemoryStat, tags: &[String]) {
    let entries = [
        ("containerd.mem.current", &mem.usage),
        ("containerd.mem.kernel_tcp", &mem.kernel_tcp),
        ("containerd.mem.kernel", &mem.kernel),
        ("containerd.mem.swap", &mem.swap),
    ];
    for (name, entry) in entries {
        if let Some(entry) = entry {
            submit_mem_entry(sender, name, entry, tags);
        }
    }

    let usage = |entry: &Option<MemoryEntry>| entry.as_ref().map_or(0, |e| e.usage);
    sender.gauge("containerd.mem.cache", mem.cache as f64, tags);
    sender.gauge("containerd.mem.rss", mem.rss as f64, tags);
    sender.gauge("containerd.mem.rsshuge", mem.rss_huge as f64, tags);
    sender.gauge("containerd.mem.usage", usage(&mem.usage) as f64, tags);
    sender.gauge("containerd.mem.kernel.usage", usage(&mem.kernel) as f64, tags);
    sender.gauge("containerd.mem.dirty", mem.dirty as f64, tags);
}

fn submit_mem_entry(sender: &mut dyn Sender, name: &str, entry: &MemoryEntry, tags: &[String]) {
    if entry.encoded_len() == 0 {
        return;
    }
    sender.gauge(&format!("{name}.usage"), entry.usage as f64, tags);
    sender.gauge(&format!("{name}.failcnt"), entry.failcnt as f64, tags);
    sender.gauge(&format!("{name}.limit"), entry.limit as f64, tags);
    sender.gauge(&format!("{name}.max"), entry.max as f64, tags);
}

/// Emits CPU gauges; nothing is emitted unless both usage and throttling are reported.
pub fn compute_cpu(sender: &mut dyn Sender, cpu: &CpuStat, tags: &[String]) {
    let (Some(usage), Some(throttling)) = (&cpu.usage, &cpu.throttling) else {
        return;
    };
    sender.gauge("containerd.cpu.system", usage.kernel as f64, tags);
    sender.gauge("containerd.cpu.total", usage.total as f64, tags);
    sender.gauge("containerd.cpu.user", usage.user as f64, tags);
    sender.gauge(
        "containerd.cpu.throttle.periods",
        throttling.periods as f64,
        tags,
    );
}

pub fn compute_blkio(sender: &mut dyn Sender, blkio: &BlkIoStat, tags: &[String]) {
    let lists = [
        ("containerd.blkio.merged_recursive", &blkio.io_merged_recursive),
        ("containerd.blkio.queued_recursive", &blkio.io_queued_recursive),
        ("containerd.blkio.sectors_recursive", &blkio.sectors_recursive),
        (
            "containerd.blkio.service_recursive_bytes",
            &blkio.io_service_bytes_recursive,
        ),
        ("containerd.blkio.time_recursive", &blkio.io_time_recursive),
        ("containerd.blkio.serviced_recursive", &blkio.io_serviced_recursive),
        ("containerd.blkio.wait_time_recursive", &blkio.io_wait_time_recursive),
        (
            "containerd.blkio.service_time_recursive",
            &blkio.io_service_time_recursive,
        ),
    ];
    for (name, entries) in lists {
        submit_blkio_entries(sender, name, entries, tags);
    }
}

fn submit_blkio_entries(sender: &mut dyn Sender, name: &str, entries: &[BlkIoEntry], tags: &[String]) {
    for entry in entries.iter().filter(|e| e.encoded_len() > 0) {
        let mut entry_tags = Vec::with_capacity(tags.len() + 2);
        entry_tags.extend_from_slice(tags);
        entry_tags.push(format!("dev:{}", entry.device));
        if !entry.op.is_empty() {
            entry_tags.push(format!("operation:{}", entry.op));
        }
        sender.gauge(name, entry.value as f64, &entry_tags);
    }
}

pub fn compute_hugetlb(sender: &mut dyn Sender, hugetlb: &[HugetlbStat], tags: &[String]) {
    for stat in hugetlb {
        sender.gauge("containerd.hugetlb.max", stat.max as f64, tags);
        sender.gauge("containerd.hugetlb.failcount", stat.failcnt as f64, tags);
        sender.gauge("containerd.hugetlb.usage", stat.usage as f64, tags);
    }
}
