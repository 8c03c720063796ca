use std::path::{Path, PathBuf};

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::registry::{store::USERS_FILE, RegistrySettings};

/// Command line flags. Every value flag is optional so that only flags the
/// user actually passed override the TOML file and the environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "chatroom-server", version, about = "Private chatroom server")]
pub struct Cli {
    /// Port for the HTTPS/WebSocket API [default: 8421]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Port for the CA bootstrap listener [default: port + 1]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, env = "CHATROOM_CONFIG", default_value = "./chatroom.toml")]
    #[serde(skip)]
    pub config: PathBuf,

    /// Enable structured JSON logging
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Data directory for the user table [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Directory holding the CA and server certificates [default: <data_dir>/certs]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_dir: Option<String>,

    /// Domain (or IP) the server certificate is issued for [default: localhost]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Shared password every login must present
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_password: Option<String>,

    /// Maximum number of simultaneously connected users [default: 10]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_clients: Option<usize>,
}

/// Effective server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,

    /// Defaults to `port + 1`
    #[serde(default)]
    pub bootstrap_port: Option<u16>,

    pub bind_address: String,

    #[serde(default)]
    pub json_logs: bool,

    pub data_dir: String,

    /// Defaults to `<data_dir>/certs`
    #[serde(default)]
    pub cert_dir: Option<String>,

    pub domain: String,

    #[serde(default)]
    pub server_password: Option<String>,

    pub max_clients: usize,

    /// Capacity of each subscriber's event channel
    pub subscriber_buffer: usize,

    /// Usernames that are admins (promoted on registration and at startup)
    #[serde(default)]
    pub admins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8421,
            bootstrap_port: None,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            data_dir: "./data".to_string(),
            cert_dir: None,
            domain: "localhost".to_string(),
            server_password: None,
            max_clients: 10,
            subscriber_buffer: 256,
            admins: Vec::new(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CHATROOM_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    pub fn figment(cli: &Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("CHATROOM_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn bootstrap_port(&self) -> u16 {
        self.bootstrap_port
            .unwrap_or_else(|| self.port.saturating_add(1))
    }

    pub fn cert_dir(&self) -> PathBuf {
        match &self.cert_dir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.data_dir).join("certs"),
        }
    }

    pub fn users_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(USERS_FILE)
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            max_clients: self.max_clients,
            server_password: self
                .server_password
                .clone()
                .filter(|password| !password.is_empty()),
        }
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Chatroom Server Configuration
# Place this file at ./chatroom.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHATROOM_PORT, etc.)
# or CLI flags (--port, etc.)

# HTTPS / WebSocket API port (default: 8421)
# port = 8421

# Plain TCP port that hands out the CA certificate (default: port + 1)
# bootstrap_port = 8422

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging
# json_logs = false

# Data directory for users-data.json
# data_dir = "./data"

# Certificate directory (default: <data_dir>/certs)
# Holds ca_cert.pem, ca_key.pem, server_cert.pem and server_key.pem.
# Keep ca_key.pem private; clients only ever need ca_cert.pem.
# cert_dir = "./data/certs"

# Domain or IP address the server certificate is issued for.
# Changing it reissues the server certificate on the next start.
# domain = "localhost"

# Shared password required at login (default: none)
# server_password = ""

# Maximum number of simultaneously connected users (default: 10)
# max_clients = 10

# Events buffered per subscriber before it is considered lagging (default: 256)
# subscriber_buffer = 256

# Usernames with admin rights
# admins = ["alice"]
"#
    .to_string()
}
