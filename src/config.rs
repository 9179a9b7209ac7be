use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::containerd::{DEFAULT_NAMESPACE, DEFAULT_SOCKET_PATH};

/// Files consulted, in order, when no hostname is configured.
const HOSTNAME_FILES: [&str; 2] = ["/etc/hostname", "/proc/sys/kernel/hostname"];

const DEFAULT_INTERVAL_SECS: u64 = 15;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid check configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("could not determine the hostname")]
    Hostname,
    #[error("invalid value `{value}` for environment variable `{name}`")]
    InvalidEnv { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration of one check instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Tags added to every gauge and event.
    pub tags: Vec<String>,
    /// Topic filters; an event is kept if its topic contains one of them.
    pub filters: Vec<String>,
    pub namespace: String,
    pub socket_path: PathBuf,
    pub hostname: Option<String>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            filters: Vec::new(),
            namespace: DEFAULT_NAMESPACE.to_owned(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            hostname: None,
        }
    }
}

impl CheckConfig {
    /// Parses a YAML document. An empty document yields the defaults.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_slice(raw)?)
    }

    /// Returns the configured hostname, or the host's one.
    pub fn resolve_hostname(&self) -> Result<String> {
        match &self.hostname {
            Some(hostname) if !hostname.trim().is_empty() => Ok(hostname.trim().to_owned()),
            _ => hostname_from(&HOSTNAME_FILES),
        }
    }
}

fn hostname_from(paths: &[impl AsRef<Path>]) -> Result<String> {
    paths
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .map(|content| content.trim().to_owned())
        .find(|hostname| !hostname.is_empty())
        .ok_or(Error::Hostname)
}

/// Process level settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `CONTAINERD_CHECK_CONFIG`: YAML file configuring the check.
    pub config_path: Option<PathBuf>,
    /// `CHECK_INTERVAL_SECS`: time between two check runs.
    pub interval: Duration,
    /// `API_LISTEN_ADDR`: address the HTTP API binds to.
    pub listen_addr: SocketAddr,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let interval = match lookup("CHECK_INTERVAL_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(Error::InvalidEnv {
                        name: "CHECK_INTERVAL_SECS",
                        value,
                    });
                }
            },
            None => DEFAULT_INTERVAL_SECS,
        };

        let listen_addr = lookup("API_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned());
        let listen_addr = listen_addr.parse().map_err(|_| Error::InvalidEnv {
            name: "API_LISTEN_ADDR",
            value: listen_addr.clone(),
        })?;

        Ok(Self {
            config_path: lookup("CONTAINERD_CHECK_CONFIG").map(PathBuf::from),
            interval: Duration::from_secs(interval),
            listen_addr,
        })
    }

    /// Reads the check configuration file, or an empty document if none is set.
    pub fn check_config(&self) -> Result<Vec<u8>> {
        match &self.config_path {
            Some(path) => std::fs::read(path).map_err(|source| Error::Read {
                path: path.clone(),
                source,
            }),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_defaults() {
        assert_eq!(CheckConfig::parse(b"").unwrap(), CheckConfig::default());
        assert_eq!(CheckConfig::parse(b"\n  \n").unwrap(), CheckConfig::default());

        let config = CheckConfig::parse(b"tags: [\"env:prod\"]\n").unwrap();
        assert_eq!(config.tags, ["env:prod"]);
        assert_eq!(config.namespace, "k8s.io");
        assert_eq!(
            config.socket_path,
            PathBuf::from("/var/run/containerd/containerd.sock")
        );
    }

    #[test]
    fn test_parse_full() {
        let raw = b"
tags:
  - env:test
filters:
  - /tasks/
  - delete
namespace: default
socket_path: /run/containerd/containerd.sock
hostname: node-1
";
        let config = CheckConfig::parse(raw).unwrap();
        assert_eq!(config.filters, ["/tasks/", "delete"]);
        assert_eq!(config.namespace, "default");
        assert_eq!(config.hostname.as_deref(), Some("node-1"));
        assert_eq!(config.resolve_hostname().unwrap(), "node-1");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            CheckConfig::parse(b"tags: 42"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_hostname_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("hostname");
        std::fs::File::create(&empty).unwrap();
        let kernel = dir.path().join("kernel");
        let mut file = std::fs::File::create(&kernel).unwrap();
        writeln!(file, "node-2").unwrap();

        let missing = dir.path().join("missing");
        assert_eq!(hostname_from(&[&missing, &empty, &kernel]).unwrap(), "node-2");
        assert!(matches!(
            hostname_from(&[&missing, &empty]),
            Err(Error::Hostname)
        ));
    }

    #[test]
    fn test_settings_from_env() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.interval, Duration::from_secs(15));
        assert_eq!(settings.listen_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(settings.config_path, None);
        assert!(settings.check_config().unwrap().is_empty());

        let env = HashMap::from([
            ("CHECK_INTERVAL_SECS", "30"),
            ("API_LISTEN_ADDR", "127.0.0.1:8080"),
        ]);
        let settings = Settings::from_lookup(|name| env.get(name).map(|v| (*v).to_owned())).unwrap();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.listen_addr.port(), 8080);

        assert!(matches!(
            Settings::from_lookup(|name| (name == "CHECK_INTERVAL_SECS").then(|| "0".to_owned())),
            Err(Error::InvalidEnv { name: "CHECK_INTERVAL_SECS", .. })
        ));
    }

    #[test]
    fn test_check_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"namespace: moby\n").unwrap();

        let settings = Settings {
            config_path: Some(file.path().to_owned()),
            interval: Duration::from_secs(1),
            listen_addr: "127.0.0.1:0".parse().unwrap(),
        };
        let config = CheckConfig::parse(&settings.check_config().unwrap()).unwrap();
        assert_eq!(config.namespace, "moby");
    }
}
