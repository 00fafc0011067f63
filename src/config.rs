use crate::cycle::{Sequence, DEFAULT_INTERVAL};
use crate::server::modbus::ServerConfig;
use crate::server::Identity;
use eva_common::{EResult, Error};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub identity: Identity,
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct CycleConfig {
    #[serde(
        default = "default_interval",
        deserialize_with = "crate::interval::deserialize_interval"
    )]
    pub interval: Duration,
    #[serde(default)]
    pub sequence: Sequence,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            sequence: Sequence::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> EResult<Self> {
        let path = path.as_ref();
        let buf = fs::read_to_string(path).map_err(|e| {
            Error::io(format!("unable to read config {}: {}", path.display(), e))
        })?;
        buf.parse()
    }
    pub fn validate(&self) -> EResult<()> {
        self.server.validate()?;
        if self.cycle.interval.is_zero() {
            return Err(Error::invalid_params("cycle interval can not be zero"));
        }
        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = serde_yaml::from_str(s)
            .map_err(|e| Error::invalid_data(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
