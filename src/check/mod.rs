//! Checks run on every collection cycle.
//!
//! A check is configured once from a YAML document and then run periodically, submitting its
//! output to a [`Sender`]. Checks are instantiated by name from a [`Registry`] built by
//! [`init`].

mod containerd;
pub mod events;
pub mod metrics;
pub mod tags;

use std::collections::HashMap;
use std::sync::Arc;

pub use containerd::ContainerdCheck;

use crate::BoxFuture;
use crate::config;
use crate::sender::Sender;
use crate::tagger::Tagger;

/// Name under which the containerd check is registered, also used as its event source.
pub const CHECK_NAME: &str = "containerd";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error("failed to connect to containerd: {0}")]
    Connectivity(#[source] crate::containerd::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait Check: Send {
    fn name(&self) -> &str;

    /// Applies the check's YAML configuration.
    fn configure(&mut self, raw: &[u8]) -> Result<()>;

    /// Runs one collection cycle. The sender is committed whether the cycle succeeds or not.
    fn run<'a>(&'a mut self, sender: &'a mut dyn Sender) -> BoxFuture<'a, Result<()>>;
}

type Factory = Box<dyn Fn() -> Box<dyn Check> + Send + Sync>;

/// Check factories by name.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<&'static str, Factory>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("checks", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn register(
        &mut self,
        name: &'static str,
        factory: impl Fn() -> Box<dyn Check> + Send + Sync + 'static,
    ) {
        self.factories.insert(name, Box::new(factory));
    }

    /// Instantiates a fresh, unconfigured check.
    pub fn create(&self, name: &str) -> Option<Box<dyn Check>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

/// Builds the registry of every check shipped with the crate.
pub fn init(tagger: Arc<dyn Tagger>) -> Registry {
    let mut registry = Registry::default();
    registry.register(CHECK_NAME, move || {
        Box::new(ContainerdCheck::new(
            crate::containerd::Connector,
            Arc::clone(&tagger),
        ))
    });
    registry
}
