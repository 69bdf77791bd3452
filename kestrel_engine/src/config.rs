//! Configuration types: network identities, engine settings, and the logging
//! schema used by [`tracing_config`](crate::tracing_config).

use crate::id::NetworkId;

use rustls::{Certificate, PrivateKey};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing_core::LevelFilter;

use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    time::Duration,
};

/// Errors that could happen when loading or processing a config
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {1}: {0}")]
    IoError(std::io::Error, PathBuf),
    #[error("Parse error in {1}: {0}")]
    ParseError(json5::Error, PathBuf),
    #[error("{1}: {0}")]
    FormatError(String, PathBuf),
}

/// One candidate server address for a network
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    /// Lower values are tried first
    #[serde(default)]
    pub priority: i32,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            tls: false,
            priority: 0,
        }
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)?;
        if self.tls {
            f.write_str(" (tls)")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum SaslMechanismName {
    #[default]
    #[serde(rename = "PLAIN")]
    #[strum(serialize = "PLAIN")]
    Plain,
    #[serde(rename = "EXTERNAL")]
    #[strum(serialize = "EXTERNAL")]
    External,
    #[serde(rename = "SCRAM-SHA-256")]
    #[strum(serialize = "SCRAM-SHA-256")]
    ScramSha256,
    #[serde(rename = "SCRAM-SHA-512")]
    #[strum(serialize = "SCRAM-SHA-512")]
    ScramSha512,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaslConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mechanism: SaslMechanismName,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// PEM file holding the client certificate chain and private key presented
    /// for EXTERNAL authentication
    #[serde(default)]
    pub external_cert: Option<PathBuf>,
}

impl SaslConfig {
    /// Load the client certificate chain and private key referenced by
    /// `external_cert`, if one is configured
    pub fn load_client_cert(&self) -> Result<Option<(Vec<Certificate>, PrivateKey)>, ConfigError> {
        let Some(path) = &self.external_cert else {
            return Ok(None);
        };

        let file = File::open(path).map_err(|e| ConfigError::IoError(e, path.clone()))?;
        let mut reader = BufReader::new(file);
        let cert_chain: Vec<Certificate> = rustls_pemfile::certs(&mut reader)
            .map_err(|e| ConfigError::IoError(e, path.clone()))?
            .into_iter()
            .map(Certificate)
            .collect();

        if cert_chain.is_empty() {
            return Err(ConfigError::FormatError(
                "No certificate in client certificate file".to_string(),
                path.clone(),
            ));
        }

        let file = File::open(path).map_err(|e| ConfigError::IoError(e, path.clone()))?;
        let mut reader = BufReader::new(file);
        let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
            .map_err(|e| ConfigError::IoError(e, path.clone()))?;

        if keys.is_empty() {
            let file = File::open(path).map_err(|e| ConfigError::IoError(e, path.clone()))?;
            let mut reader = BufReader::new(file);
            keys = rustls_pemfile::rsa_private_keys(&mut reader)
                .map_err(|e| ConfigError::IoError(e, path.clone()))?;
        }

        let key = keys.pop().ok_or_else(|| {
            ConfigError::FormatError("No private key in client certificate file".to_string(), path.clone())
        })?;

        Ok(Some((cert_chain, PrivateKey(key))))
    }
}

/// A logical network: where to connect, and who to be once connected
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub id: NetworkId,
    pub name: String,
    pub endpoints: Vec<Endpoint>,
    pub nickname: String,
    pub username: String,
    pub realname: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub sasl: SaslConfig,
    #[serde(default)]
    pub auto_connect: bool,
}

impl NetworkIdentity {
    /// Endpoints in the order they should be attempted. Equal priorities keep
    /// their configured order.
    pub fn endpoints_by_priority(&self) -> Vec<Endpoint> {
        let mut endpoints = self.endpoints.clone();
        endpoints.sort_by_key(|e| e.priority);
        endpoints
    }
}

const fn default_connect_timeout_ms() -> u64 {
    30_000
}

const fn default_auto_connect_stagger_ms() -> u64 {
    500
}

fn default_ctcp_version() -> String {
    format!("kestrel {}", env!("CARGO_PKG_VERSION"))
}

/// Tunables for the session engine
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineSettings {
    /// Upper bound on a single endpoint connection attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Delay between successive networks during auto-connect
    #[serde(default = "default_auto_connect_stagger_ms")]
    pub auto_connect_stagger_ms: u64,
    /// Reply sent to CTCP VERSION requests
    #[serde(default = "default_ctcp_version")]
    pub ctcp_version: String,
}

impl EngineSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn auto_connect_stagger(&self) -> Duration {
        Duration::from_millis(self.auto_connect_stagger_ms)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            auto_connect_stagger_ms: default_auto_connect_stagger_ms(),
            ctcp_version: default_ctcp_version(),
        }
    }
}

/// A network as it appears in the configuration file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(flatten)]
    pub identity: NetworkIdentity,
    /// Channels to mark for auto-join when the network is first seen
    #[serde(default)]
    pub autojoin: Vec<String>,
}

/// Top-level configuration for the daemon
#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub log: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn load_file<P: AsRef<Path>>(filename: P) -> Result<Self, ConfigError> {
        let path = filename.as_ref();
        let mut file = File::open(path).map_err(|e| ConfigError::IoError(e, path.to_owned()))?;
        let mut config = String::new();
        file.read_to_string(&mut config)
            .map_err(|e| ConfigError::IoError(e, path.to_owned()))?;

        json5::from_str(&config).map_err(|e| ConfigError::ParseError(e, path.to_owned()))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinLogTarget {
    Stdout,
    Stderr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogTarget {
    File { filename: PathBuf },
    Builtin(BuiltinLogTarget),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LogEntry {
    pub target: LogTarget,
    #[serde(default)]
    pub modules: Vec<String>,
    pub level: Option<LogLevel>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    pub default_level: Option<LogLevel>,
    #[serde(default)]
    pub module_levels: HashMap<String, LogLevel>,
    #[serde(default)]
    pub targets: Vec<LogEntry>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            default_level: Some(LogLevel::Info),
            module_levels: HashMap::new(),
            targets: vec![LogEntry {
                target: LogTarget::Builtin(BuiltinLogTarget::Stderr),
                modules: Vec::new(),
                level: None,
            }],
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(arg: LogLevel) -> LevelFilter {
        match arg {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}
