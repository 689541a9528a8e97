use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};

use crate::{
    api::{PlcBuilder, DEFAULT_CYCLE_TIME_MS},
    protocol::DeviceClient,
    Plc,
};

/// One row of the variable table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub addr: String,
}

/// Root configuration of the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlcConfig {
    /// Serial port handed to the device client
    #[serde(default)]
    pub serial_port: Option<String>,
    /// Cycle time in milliseconds (0 disables periodic polling)
    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time_ms: u64,
    /// Variable table; incomplete rows are ignored
    #[serde(default)]
    pub variables: Vec<VariableEntry>,
}

fn default_cycle_time_ms() -> u64 {
    DEFAULT_CYCLE_TIME_MS
}

impl Default for PlcConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            cycle_time_ms: DEFAULT_CYCLE_TIME_MS,
            variables: Vec::new(),
        }
    }
}

impl PlcConfig {
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|err| anyhow!("Invalid JSON config: {err}"))
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|err| anyhow!("Invalid TOML config: {err}"))
    }

    /// Read a configuration file; `.toml` files are parsed as TOML, anything
    /// else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|err| anyhow!("Failed to read config {}: {err}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn builder(&self) -> PlcBuilder {
        let mut builder = PlcBuilder::new().with_cycle_time(self.cycle_time_ms);
        if let Some(port) = self.serial_port.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.with_port(port);
        }
        builder.with_variables(
            self.variables
                .iter()
                .map(|entry| (entry.name.as_str(), entry.addr.as_str())),
        )
    }

    /// Start a PLC runtime for this configuration.
    pub fn start(&self, client: Arc<dyn DeviceClient>) -> Plc {
        self.builder().build(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_round_trip() -> Result<()> {
        let config = PlcConfig {
            serial_port: Some("/dev/ttyUSB0".into()),
            cycle_time_ms: 2000,
            variables: vec![VariableEntry {
                name: "level".into(),
                addr: "DB1,W0".into(),
            }],
        };
        let parsed = PlcConfig::from_json(&config.to_json()?)?;
        assert_eq!(parsed, config);
        Ok(())
    }

    #[test]
    fn test_toml_defaults() -> Result<()> {
        let config = PlcConfig::from_toml(
            r#"
serial_port = "COM3"

[[variables]]
name = "pump"
addr = "A4.0"
"#,
        )?;
        assert_eq!(config.serial_port.as_deref(), Some("COM3"));
        assert_eq!(config.cycle_time_ms, DEFAULT_CYCLE_TIME_MS);
        assert_eq!(config.variables.len(), 1);
        Ok(())
    }

    #[test]
    fn test_incomplete_variables_are_skipped() -> Result<()> {
        let config = PlcConfig::from_json(
            r#"{
                "serial_port": "COM1",
                "variables": [
                    {"name": "ok", "addr": "E0.0"},
                    {"name": "", "addr": "E0.1"},
                    {"name": "no_addr"}
                ]
            }"#,
        )?;
        let builder = config.builder();
        assert_eq!(builder.variables().len(), 1);
        assert_eq!(
            builder.variables().get("ok").map(String::as_str),
            Some("E0.0")
        );
        Ok(())
    }

    #[test]
    fn test_invalid_json_is_reported() {
        assert!(PlcConfig::from_json("{ not json").is_err());
    }
}
