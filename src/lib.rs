//! containerd check: periodically samples per-container resource usage and lifecycle events
//! from containerd and normalizes them into tagged gauges and event records.
//!
//! The latest committed batch and the result of the health probes are served over HTTP.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use containerd::Connect;
use error::ResultOkLogExt;

pub mod api;
pub mod check;
pub mod config;
pub mod container;
pub mod containerd;
pub mod diagnose;
pub mod error;
pub mod events;
pub mod grpc;
pub mod sender;
pub mod stats;
pub mod tagger;

#[cfg(test)]
pub(crate) mod testutil;

/// A boxed future, used where trait objects need async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs the containerd check until the process is stopped.
///
/// Every interval the tag store is refreshed from containerd, then the check runs and commits its
/// output to the aggregator served by the API.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid environment variables (e.g., `CHECK_INTERVAL_SECS`).
/// - An unreadable or invalid check configuration file.
/// - A hostname that can neither be configured nor read from the host.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = config::Settings::from_env()?;
    let raw_config = settings.check_config()?;
    let instance = config::CheckConfig::parse(&raw_config)?;

    let tags = Arc::new(tagger::Store::new());
    let checks = check::init(Arc::clone(&tags) as Arc<dyn tagger::Tagger>);
    let mut check = checks
        .create(check::CHECK_NAME)
        .ok_or("containerd check is not registered")?;
    check.configure(&raw_config)?;

    let mut diagnoses = diagnose::Registry::default();
    diagnoses.register(diagnose::ContainerdAvailability::new(
        containerd::Connector,
        instance.socket_path.clone(),
        instance.namespace.clone(),
    ));

    let mut aggregator = sender::Aggregator::new();
    {
        let state = api::AppState::new(aggregator.published(), Arc::new(diagnoses));
        let addr = settings.listen_addr;
        tokio::spawn(async move {
            api::APIServer::new(state).listen(addr).await.ok_log();
        });
    }

    let mut interval = tokio::time::interval(settings.interval);
    loop {
        interval.tick().await;

        match containerd::Connector
            .connect(&instance.socket_path, &instance.namespace)
            .await
        {
            Ok(runtime) => {
                tags.refresh(&runtime)
                    .await
                    .ok_log_at(log::Level::Warn, "Could not refresh container tags");
                log::trace!("Tag store holds {} containers", tags.size());
            }
            Err(err) => log::debug!("Skipping tag refresh: {err}"),
        }

        let before = std::time::Instant::now();
        check.run(&mut aggregator).await.ok_log();
        log::trace!("{} check took {:?}", check.name(), before.elapsed());
    }
}
