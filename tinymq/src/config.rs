use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 1505;
pub const DEFAULT_WORKER_THREADS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Broker configuration, loadable from a TOML file. Every field has a
/// default, so an empty file (or none at all) yields a working broker.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// TCP port clients connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Worker threads driving the async runtime.
    #[serde(default = "default_threads")]
    pub threads: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Number acknowledgements with a wrapping packet id instead of sending
    /// empty ack payloads.
    #[serde(default)]
    pub ack_packet_ids: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            threads: DEFAULT_WORKER_THREADS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

impl Config {
    /// Reads configuration from a TOML file. Synchronous because the worker
    /// pool size comes from here and the runtime is built afterwards.
    pub fn from_path(path: &str) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.broker.port, 1505);
        assert_eq!(cfg.broker.threads, 4);
        assert!(!cfg.session.ack_packet_ids);
    }

    #[test]
    fn parse_full_file() {
        let cfg: Config = toml::from_str(
            r#"
            [broker]
            port = 1883
            threads = 8

            [session]
            ack_packet_ids = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.broker.port, 1883);
        assert_eq!(cfg.broker.threads, 8);
        assert!(cfg.session.ack_packet_ids);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("[broker]\nport = 9000\n").unwrap();
        assert_eq!(cfg.broker.port, 9000);
        assert_eq!(cfg.broker.threads, 4);
        assert!(!cfg.session.ack_packet_ids);
    }
}
