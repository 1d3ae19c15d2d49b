//! Probe configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via RESPIPE_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags

use respipe_client::{ConnectionConfig, DecoderConfig, PipelineConfig, TlsClientConfig};
use respipe_protocol::{DEFAULT_BATCH_LIMIT, DEFAULT_MAX_BULK_LEN, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Probe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSection,
    pub pipeline: PipelineSection,
    pub tls: TlsSection,
}

impl Config {
    /// Loads the file named by `path` or `RESPIPE_CONFIG`, if any, then
    /// applies environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("RESPIPE_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Applies `RESPIPE_*` overrides looked up through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.connection.apply_overrides(&var);
        self.pipeline.apply_overrides(&var);
        self.tls.apply_overrides(&var);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.addr.is_empty() {
            return Err(ConfigError::Validation("connection.addr is empty".to_string()));
        }
        if self.pipeline.batch_limit == 0 {
            return Err(ConfigError::Validation(
                "pipeline.batch_limit must be at least 1".to_string(),
            ));
        }
        self.tls.validate()
    }

    /// Client-side connection settings built from this configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.connection.addr.clone())
            .with_connect_timeout(Duration::from_millis(self.connection.connect_timeout_ms))
            .with_nodelay(self.connection.nodelay)
            .with_pipeline(self.pipeline.to_pipeline_config());
        if self.tls.enabled {
            config = config.with_tls(self.tls.to_client_config());
        }
        config
    }
}

/// Parses boolean environment values the way the CLI flags read them.
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    /// Server address, `host:port`.
    pub addr: String,
    pub connect_timeout_ms: u64,
    pub nodelay: bool,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            connect_timeout_ms: 10_000,
            nodelay: true,
        }
    }
}

impl ConnectionSection {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("RESPIPE_ADDR") {
            self.addr = addr;
        }
        if let Some(ms) = var("RESPIPE_CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.connect_timeout_ms = ms;
        }
        if let Some(nodelay) = var("RESPIPE_NODELAY") {
            self.nodelay = parse_bool(&nodelay);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Maximum commands per write batch.
    pub batch_limit: usize,
    pub read_buffer_size: usize,
    /// Keep RESP3 maps and sets; otherwise they are flattened to arrays.
    pub use_maps: bool,
    /// Decode bulk strings to text when they are valid UTF-8.
    pub decode_bulk: bool,
    pub use_attributes: bool,
    pub max_bulk_len: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let decoder = DecoderConfig::default();
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            read_buffer_size: PipelineConfig::default().read_buffer_size,
            use_maps: decoder.use_maps,
            decode_bulk: decoder.decode_bulk,
            use_attributes: decoder.use_attributes,
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
        }
    }
}

impl PipelineSection {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(limit) = var("RESPIPE_BATCH_LIMIT").and_then(|v| v.parse().ok()) {
            self.batch_limit = limit;
        }
        if let Some(size) = var("RESPIPE_READ_BUFFER_SIZE").and_then(|v| v.parse().ok()) {
            self.read_buffer_size = size;
        }
        if let Some(maps) = var("RESPIPE_USE_MAPS") {
            self.use_maps = parse_bool(&maps);
        }
        if let Some(decode) = var("RESPIPE_DECODE_BULK") {
            self.decode_bulk = parse_bool(&decode);
        }
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_batch_limit(self.batch_limit)
            .with_read_buffer_size(self.read_buffer_size)
            .with_decoder(
                DecoderConfig::new()
                    .with_maps(self.use_maps)
                    .with_decode_bulk(self.decode_bulk)
                    .with_attributes(self.use_attributes)
                    .with_max_bulk_len(self.max_bulk_len),
            )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub enabled: bool,
    pub ca_cert_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE).
    pub insecure: bool,
    pub server_name: Option<String>,
}

impl TlsSection {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(enabled) = var("RESPIPE_TLS_ENABLED") {
            self.enabled = parse_bool(&enabled);
        }
        if let Some(path) = var("RESPIPE_TLS_CA") {
            self.ca_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("RESPIPE_TLS_CERT") {
            self.client_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("RESPIPE_TLS_KEY") {
            self.client_key_path = Some(PathBuf::from(path));
        }
        if let Some(insecure) = var("RESPIPE_TLS_INSECURE") {
            self.insecure = parse_bool(&insecure);
        }
        if let Some(name) = var("RESPIPE_TLS_SERVER_NAME") {
            self.server_name = Some(name);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.client_cert_path.is_some() != self.client_key_path.is_some() {
            return Err(ConfigError::Validation(
                "tls.client_cert_path and tls.client_key_path must be set together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_client_config(&self) -> TlsClientConfig {
        TlsClientConfig {
            enabled: self.enabled,
            ca_cert_path: self.ca_cert_path.clone(),
            client_cert_path: self.client_cert_path.clone(),
            client_key_path: self.client_key_path.clone(),
            insecure: self.insecure,
            server_name: self.server_name.clone(),
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
