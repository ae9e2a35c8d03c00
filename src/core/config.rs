/// Server Configuration
///
/// All settings come from environment variables. Unset variables fall back to
/// defaults; set-but-invalid values are reported as `ConfigError` instead of
/// being silently replaced.
///
/// Environment Variables:
/// - SERVER_NAME: Name reported in `initialize` (default: "mcp-stream-server")
/// - SERVER_VERSION: Version reported in `initialize` (default: crate version)
/// - MCP_TRANSPORT_MODE: "stdio", "http", or "both" (default: "stdio")
/// - HOST: Bind address for HTTP mode (default: "127.0.0.1")
/// - PORT: Port number for HTTP mode (default: 3000)
/// - WORKER_THREADS: HTTP worker count (default: CPU count, at most 16)
/// - MCP_MAX_FRAME_BYTES: Largest accepted message in bytes (default: 64 MiB)

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::core::codec::DEFAULT_MAX_FRAME_BYTES;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MCP_TRANSPORT_MODE must be 'stdio', 'http', or 'both', got '{0}'")]
    InvalidTransportMode(String),
    #[error("PORT must be a valid u16, got '{0}'")]
    InvalidPort(String),
    #[error("WORKER_THREADS must be a positive integer, got '{0}'")]
    InvalidWorkerThreads(String),
    #[error("MCP_MAX_FRAME_BYTES must be a positive integer, got '{0}'")]
    InvalidMaxFrameBytes(String),
}

/// Which transports the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Read from stdin, write to stdout
    Stdio,
    /// HTTP server only
    Http,
    /// STDIO and HTTP concurrently
    Both,
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            "both" => Ok(Self::Both),
            _ => Err(ConfigError::InvalidTransportMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub server_name: String,
    pub server_version: String,
    pub transport: TransportMode,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: env!("CARGO_PKG_NAME").to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            transport: TransportMode::Stdio,
            host: "127.0.0.1".to_string(),
            port: 3000,
            workers: default_workers(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let transport = var("MCP_TRANSPORT_MODE")
            .map(|value| value.parse::<TransportMode>())
            .transpose()?
            .unwrap_or(defaults.transport);
        let port = var("PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort(value)))
            .transpose()?
            .unwrap_or(defaults.port);
        let workers = var("WORKER_THREADS")
            .map(|value| match value.parse::<usize>() {
                Ok(workers) if workers > 0 => Ok(workers),
                _ => Err(ConfigError::InvalidWorkerThreads(value)),
            })
            .transpose()?
            .unwrap_or(defaults.workers);
        let max_frame_bytes = var("MCP_MAX_FRAME_BYTES")
            .map(|value| match value.parse::<usize>() {
                Ok(limit) if limit > 0 => Ok(limit),
                _ => Err(ConfigError::InvalidMaxFrameBytes(value)),
            })
            .transpose()?
            .unwrap_or(defaults.max_frame_bytes);

        Ok(Self {
            server_name: var("SERVER_NAME").unwrap_or(defaults.server_name),
            server_version: var("SERVER_VERSION").unwrap_or(defaults.server_version),
            transport,
            host: var("HOST").unwrap_or(defaults.host),
            port,
            workers,
            max_frame_bytes,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// CPU count, capped at 16 to avoid excessive context switching.
fn default_workers() -> usize {
    num_cpus::get().clamp(1, 16)
}
