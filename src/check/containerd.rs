use std::sync::Arc;

use super::events::compute_events;
use super::metrics::compute_metrics;
use super::{CHECK_NAME, Check, Error, Result};
use crate::BoxFuture;
use crate::config::CheckConfig;
use crate::containerd::{Connect, Runtime};
use crate::error::ResultOkLogExt;
use crate::events::Subscriber;
use crate::sender::Sender;
use crate::stats;
use crate::tagger::Tagger;

/// Collects per-container resource usage and lifecycle events from containerd.
///
/// Connectivity is established anew on every run. The event [`Subscriber`] is created on the
/// first successful connection and lives as long as the check.
pub struct ContainerdCheck<C> {
    connector: C,
    tagger: Arc<dyn Tagger>,
    registry: stats::Registry,
    config: CheckConfig,
    hostname: String,
    subscriber: Option<Subscriber>,
}

impl<C: Connect> ContainerdCheck<C> {
    pub fn new(connector: C, tagger: Arc<dyn Tagger>) -> Self {
        Self {
            connector,
            tagger,
            registry: stats::Registry::with_defaults(),
            config: CheckConfig::default(),
            hostname: String::new(),
            subscriber: None,
        }
    }

    async fn collect(&mut self, sender: &mut dyn Sender) -> Result<()> {
        let runtime = match self
            .connector
            .connect(&self.config.socket_path, &self.config.namespace)
            .await
        {
            Ok(runtime) => runtime,
            Err(err) => {
                log::info!("Error ensuring connectivity with containerd daemon: {err}");
                return Err(Error::Connectivity(err));
            }
        };

        let filters = &self.config.filters;
        let subscriber = self.subscriber.get_or_insert_with(|| {
            Subscriber::new(CHECK_NAME, runtime.namespace(), filters.clone())
        });
        if !subscriber.is_streaming() {
            subscriber
                .ensure_streaming(&runtime)
                .await
                .ok_log_at(log::Level::Info, "Could not subscribe to containerd events");
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
        let events = subscriber.flush(now);
        compute_events(
            &self.hostname,
            &events,
            sender,
            &self.config.tags,
            self.tagger.as_ref(),
        );

        compute_metrics(
            sender,
            &runtime,
            &self.registry,
            &self.config.tags,
            self.tagger.as_ref(),
        )
        .await;

        Ok(())
    }
}

impl<C: Connect + 'static> Check for ContainerdCheck<C> {
    fn name(&self) -> &str {
        CHECK_NAME
    }

    fn configure(&mut self, raw: &[u8]) -> Result<()> {
        let config = CheckConfig::parse(raw)?;
        self.hostname = config.resolve_hostname()?;
        log::debug!(
            "Configured {} check for namespace `{}` on host {}",
            CHECK_NAME,
            config.namespace,
            self.hostname
        );
        self.config = config;
        Ok(())
    }

    fn run<'a>(&'a mut self, sender: &'a mut dyn Sender) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let result = self.collect(sender).await;
            sender.commit();
            result
        })
    }
}
