//! Health probes exposed next to the checks.

use std::path::PathBuf;

use crate::BoxFuture;
use crate::containerd::{Connect, Runtime, Version};

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnosis {
    pub name: String,
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

pub trait Diagnose: Send + Sync {
    fn name(&self) -> &str;

    fn diagnose(&self) -> BoxFuture<'_, Diagnosis>;
}

/// Probes run on demand, in registration order.
#[derive(Default)]
pub struct Registry {
    probes: Vec<Box<dyn Diagnose>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.probes.iter().map(|p| p.name()))
            .finish()
    }
}

impl Registry {
    pub fn register(&mut self, probe: impl Diagnose + 'static) {
        self.probes.push(Box::new(probe));
    }

    pub async fn run_all(&self) -> Vec<Diagnosis> {
        let mut out = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            out.push(probe.diagnose().await);
        }
        out
    }
}

/// Checks that the containerd socket answers, reporting the daemon's version.
#[derive(Debug)]
pub struct ContainerdAvailability<C> {
    connector: C,
    socket_path: PathBuf,
    namespace: String,
}

impl<C: Connect> ContainerdAvailability<C> {
    pub const NAME: &'static str = "Containerd availability";

    pub fn new(connector: C, socket_path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            connector,
            socket_path: socket_path.into(),
            namespace: namespace.into(),
        }
    }

    async fn probe(&self) -> crate::containerd::Result<Version> {
        let runtime = self
            .connector
            .connect(&self.socket_path, &self.namespace)
            .await?;
        runtime.version().await
    }
}

impl<C: Connect> Diagnose for ContainerdAvailability<C> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn diagnose(&self) -> BoxFuture<'_, Diagnosis> {
        Box::pin(async move {
            match self.probe().await {
                Ok(version) => {
                    let message = format!(
                        "Connected to containerd - Version {}/{}",
                        version.version, version.revision
                    );
                    log::info!("{message}");
                    Diagnosis {
                        name: Self::NAME.to_owned(),
                        ok: true,
                        message,
                        version: Some(version),
                    }
                }
                Err(err) => Diagnosis {
                    name: Self::NAME.to_owned(),
                    ok: false,
                    message: err.to_string(),
                    version: None,
                },
            }
        })
    }
}
