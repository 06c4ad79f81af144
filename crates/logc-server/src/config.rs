use logc_ring::RingConfig;
use serde::Deserialize;
use std::path::Path;

/// Server configuration, loadable from a TOML file.
///
/// Every field has a reference default, so an empty file (or no file at
/// all) yields a working server.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    /// Well-known Unix stream socket path clients dial.
    #[serde(default = "defaults::socket_path")]
    pub socket_path: String,
    /// Per-client shared-region size in bytes, ring header included.
    #[serde(default = "defaults::region_bytes")]
    pub region_bytes: usize,
    /// Fraction of the ring payload at which clients notify.
    #[serde(default = "defaults::threshold_fraction")]
    pub threshold_fraction: f64,
    /// Listen backlog.
    #[serde(default = "defaults::backlog")]
    pub backlog: u32,
    /// Accept-loop liveness tick in milliseconds. No semantic effect.
    #[serde(default = "defaults::liveness_tick_ms")]
    pub liveness_tick_ms: u64,
}

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        /// Config file path.
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn socket_path() -> String {
        logc_proto::SOCKET_PATH.into()
    }

    pub fn region_bytes() -> usize {
        logc_ring::DEFAULT_REGION_BYTES
    }

    pub fn threshold_fraction() -> f64 {
        logc_ring::DEFAULT_THRESHOLD_FRACTION
    }

    pub fn backlog() -> u32 {
        10
    }

    pub fn liveness_tick_ms() -> u64 {
        1000
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: ServerConfig = toml::from_str(&text)?;
        Ok(config)
    }

    /// Ring geometry for regions provisioned under this configuration.
    pub fn ring_config(&self) -> RingConfig {
        RingConfig::new(self.region_bytes, self.threshold_fraction)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: defaults::socket_path(),
            region_bytes: defaults::region_bytes(),
            threshold_fraction: defaults::threshold_fraction(),
            backlog: defaults::backlog(),
            liveness_tick_ms: defaults::liveness_tick_ms(),
        }
    }
}
