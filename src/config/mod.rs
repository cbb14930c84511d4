use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::DEFAULT_WINDOW;
use crate::model::{self, Settings, SettingsUpdate, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config: {0}")]
    Io(#[from] io::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid settings in config: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Root {
    /// Effect server to send to.
    pub server: Server,
    /// Tag sent with every packet.
    pub tag: String,
    /// Number of lights to control.
    pub num_lights: i64,
    /// Quiet period before edits are sent, in milliseconds.
    pub debounce_ms: u64,
    /// Packet monitor configuration.
    pub monitor: Monitor,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Server {
    /// Host name or IP address.
    pub addr: String,
    pub port: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Monitor {
    /// UDP address to listen on.
    pub udp_addr: String,
}

impl Default for Root {
    fn default() -> Root {
        Root {
            server: Server::default(),
            tag: model::DEFAULT_TAG.to_string(),
            num_lights: model::DEFAULT_NUM_LIGHTS as i64,
            debounce_ms: DEFAULT_WINDOW.as_millis() as u64,
            monitor: Monitor::default(),
        }
    }
}

impl Default for Server {
    fn default() -> Server {
        Server {
            addr: model::DEFAULT_SERVER_IP.to_string(),
            port: i64::from(model::DEFAULT_SERVER_PORT),
        }
    }
}

impl Default for Monitor {
    fn default() -> Monitor {
        Monitor {
            udp_addr: format!("0.0.0.0:{}", model::DEFAULT_SERVER_PORT),
        }
    }
}

impl Root {
    pub fn settings_update(&self) -> SettingsUpdate {
        SettingsUpdate {
            server_ip: self.server.addr.clone(),
            server_port: self.server.port,
            tag: self.tag.clone(),
            num_lights: self.num_lights,
        }
    }

    /// Startup settings, checked the same way as operator edits.
    pub fn settings(&self) -> Result<Settings, ValidationError> {
        self.settings_update().validate()
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn checked(root: Root) -> Result<Root, ConfigError> {
    // Quick sanity check for the configuration
    root.settings()?;
    Ok(root)
}

pub fn parse_config_yaml(text: &str) -> Result<Root, ConfigError> {
    checked(serde_yaml::from_str(text)?)
}

pub fn read_config_yaml<T: AsRef<Path>>(path: T) -> Result<Root, ConfigError> {
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    checked(serde_yaml::from_reader(reader)?)
}

pub fn read_config_json<T: AsRef<Path>>(path: T) -> Result<Root, ConfigError> {
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    checked(serde_json::from_reader(reader)?)
}

/// Read a config file, picking the format from the extension.
pub fn read_config<T: AsRef<Path>>(path: T) -> Result<Root, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => read_config_json(path),
        _ => read_config_yaml(path),
    }
}
