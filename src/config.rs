use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

fn default_listen_addr() -> String {
    "127.0.0.1:9390".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_max_packet_bytes() -> usize {
    64 * 1024
}

/// Read-only inputs consumed by the proxy core. Loaded once at startup;
/// never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Upper bound on a single upstream connect attempt. No retries.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Largest chunk read from either socket in one event.
    #[serde(default = "default_max_packet_bytes")]
    pub max_packet_bytes: usize,

    /// SO_RCVBUF / SO_SNDBUF hint for upstream sockets. Kernel default
    /// when unset.
    #[serde(default)]
    pub socket_buffer_bytes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_packet_bytes: default_max_packet_bytes(),
            socket_buffer_bytes: None,
        }
    }
}

impl Config {
    /// Loads configuration from the YAML file named by `PORTWAY_CONFIG`
    /// (default `portway.yaml`), falling back to defaults when the file is
    /// absent. A `LISTEN` env var overrides the listen address either way.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("PORTWAY_CONFIG").unwrap_or_else(|_| "portway.yaml".to_string());

        let mut cfg = if Path::new(&path).exists() {
            Self::from_yaml(&std::fs::read_to_string(&path)?)?
        } else {
            Self::default()
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.listen_addr = listen;
        }

        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
