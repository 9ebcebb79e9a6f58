pub mod profile;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use profile::SessionProfile;

#[derive(Debug, Clone, Deserialize)]
pub struct SessiondConfig {
    #[serde(default)]
    pub profile_path: Option<String>,
    #[serde(default)]
    pub probe: ProbeCommandConfig,
}

/// Command prefix used by the service probe; the endpoint name is appended
/// as the final argument.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeCommandConfig {
    pub command: Vec<String>,
}

impl Default for ProbeCommandConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "systemctl".to_string(),
                "--user".to_string(),
                "is-active".to_string(),
            ],
        }
    }
}

impl SessiondConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("SESSIOND").separator("__"))
            .build()?
            .try_deserialize()
    }
}
