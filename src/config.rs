//! Layered configuration.
//!
//! Precedence, lowest first: built-in defaults, TOML file, `MUNINN_*`
//! environment variables, command-line flags.
//!
//! The file is `--config <path>` when given (must exist), otherwise the first
//! of `./muninn.toml` and `$HOME/.muninn/muninn.toml` that exists.
//!
//! ```toml
//! [http]
//! address = "127.0.0.1:3001"
//!
//! [client]
//! origin = "http://localhost:3001"
//! relay_path = "/api/connect"
//!
//! [gateway]
//! default_upstream = "mud.example.org:4201"
//!
//! [logging]
//! filter = "info"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::endpoint::{derive_endpoint, DEFAULT_RELAY_PATH};
use crate::error::{MuninnError, Result};

pub const ENV_PREFIX: &str = "MUNINN";
pub const CONFIG_FILE_NAME: &str = "muninn.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub client: ClientConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub address: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3001".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub origin: String,
    pub relay_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3001".to_string(),
            relay_path: DEFAULT_RELAY_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Dialed for `/api/connect` requests that name no address.
    pub default_upstream: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Build the effective config for a command line.
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = match Self::locate(args.config.as_deref())? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Resolve which file to read, if any.
    pub fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(MuninnError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Ok(Some(local));
        }
        let home = std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".muninn").join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file());
        Ok(home)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| MuninnError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| MuninnError::Config(e.to_string()))
    }

    /// Overlay `MUNINN_*` variables; `lookup` is `std::env::var` in
    /// production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));
        if let Some(v) = var("HTTP_ADDRESS") {
            self.http.address = v;
        }
        if let Some(v) = var("CLIENT_ORIGIN") {
            self.client.origin = v;
        }
        if let Some(v) = var("CLIENT_RELAY_PATH") {
            self.client.relay_path = v;
        }
        if let Some(v) = var("GATEWAY_DEFAULT_UPSTREAM") {
            self.gateway.default_upstream = Some(v).filter(|v| !v.is_empty());
        }
        if let Some(v) = var("LOG") {
            self.logging.filter = v;
        }
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(address) = &args.address {
            self.http.address = address.clone();
        }
        if let Some(origin) = &args.origin {
            self.client.origin = origin.clone();
        }
        if let Some(relay_path) = &args.relay_path {
            self.client.relay_path = relay_path.clone();
        }
        if let Some(upstream) = &args.upstream {
            self.gateway.default_upstream = Some(upstream.clone());
        }
        if let Some(log) = &args.log {
            self.logging.filter = log.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.http.address.trim().is_empty() {
            return Err(MuninnError::Config("http.address must not be empty".into()));
        }
        derive_endpoint(&self.client.origin, &self.client.relay_path)
            .map_err(|e| MuninnError::Config(e.to_string()))?;
        Ok(())
    }

    /// Relay path for the client, with the world appended when one is named.
    pub fn relay_path_for(&self, world: Option<&str>) -> String {
        match world {
            Some(world) if !world.is_empty() => {
                format!("{}/{}", self.client.relay_path.trim_end_matches('/'), world)
            }
            _ => self.client.relay_path.clone(),
        }
    }
}
