//! Link and fleet configuration.
//!
//! All fields have defaults matching the peripheral firmware's timing, so an
//! empty YAML document is a valid configuration:
//!
//! ```rust
//! use sensorlink::DeviceId;
//! use sensorlink::config::{Backoff, FleetConfig};
//!
//! let yaml = r#"
//! link:
//!   listen_timeout_ms: 1500
//!   reconnect:
//!     max_attempts: 5
//!     backoff: exponential
//! devices:
//!   - address: "B0:B1:13:2D:B4:01"
//!     name: left-arm
//! "#;
//!
//! let fleet = FleetConfig::from_yaml_str(yaml).unwrap();
//! assert_eq!(fleet.link.handshake_timeout_ms, 3000);
//! assert_eq!(fleet.link.reconnect.backoff, Backoff::Exponential);
//! assert_eq!(fleet.devices[0].address.as_str(), "B0:B1:13:2D:B4:01");
//! assert_eq!(fleet.devices[0].address, DeviceId::new("b0:b1:13:2d:b4:01"));
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::DeviceId;
use crate::{LinkError, Result};

/// Delay growth between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every attempt
    #[default]
    Fixed,
    /// Delay doubles per attempt up to `max_delay_ms`
    Exponential,
}

/// Bounded reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Attempts before the device is declared unreachable
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_attempts: 10, base_delay_ms: 5_000, max_delay_ms: 60_000, backoff: Backoff::Fixed }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let millis = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Exponential => {
                let shift = attempt.saturating_sub(1).min(16);
                self.base_delay_ms.saturating_mul(1 << shift).min(self.max_delay_ms)
            }
        };
        Duration::from_millis(millis)
    }
}

/// Per-device link configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Notification wait per HELLO
    pub handshake_timeout_ms: u64,
    /// Notification wait per listen cycle
    pub listen_timeout_ms: u64,
    /// Unanswered HELLOs before a forced reset
    pub max_handshake_attempts: u32,
    /// Validate the handshake trailing byte as a CRC-8
    pub verify_handshake_checksum: bool,
    pub reconnect: ReconnectPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 3_000,
            listen_timeout_ms: 2_000,
            max_handshake_attempts: 30,
            verify_handshake_checksum: true,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl LinkConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }

    /// Reject values that would stall or spin a supervisor.
    pub fn validate(&self) -> Result<()> {
        let context = "LinkConfig";
        if self.handshake_timeout_ms == 0 {
            return Err(LinkError::config_error(context, "handshake_timeout_ms must be non-zero"));
        }
        if self.listen_timeout_ms == 0 {
            return Err(LinkError::config_error(context, "listen_timeout_ms must be non-zero"));
        }
        if self.max_handshake_attempts == 0 {
            return Err(LinkError::config_error(context, "max_handshake_attempts must be non-zero"));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(LinkError::config_error(context, "reconnect.max_attempts must be non-zero"));
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(LinkError::config_error(
                context,
                format!(
                    "reconnect.max_delay_ms ({}) is below base_delay_ms ({})",
                    self.reconnect.max_delay_ms, self.reconnect.base_delay_ms
                ),
            ));
        }
        Ok(())
    }

    /// Parse and validate a link configuration from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = parse_yaml(yaml, "LinkConfig")?;
        config.validate()?;
        Ok(config)
    }
}

/// A known peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub address: DeviceId,
    #[serde(default)]
    pub name: Option<String>,
}

/// Link configuration plus the list of peripherals to supervise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub link: LinkConfig,
    pub devices: Vec<DeviceEntry>,
}

impl FleetConfig {
    /// Parse and validate a fleet configuration from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: FleetConfig = parse_yaml(yaml, "FleetConfig")?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a fleet configuration file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| LinkError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Validate link settings and reject duplicate device addresses.
    pub fn validate(&self) -> Result<()> {
        self.link.validate()?;
        let mut seen = std::collections::HashSet::new();
        for entry in &self.devices {
            if !seen.insert(&entry.address) {
                return Err(LinkError::config_error(
                    "FleetConfig",
                    format!("device {} listed twice", entry.address),
                ));
            }
        }
        Ok(())
    }
}

fn parse_yaml<T: serde::de::DeserializeOwned>(yaml: &str, context: &str) -> Result<T> {
    // An empty document deserializes as unit, not as an empty mapping
    let yaml = if yaml.trim().is_empty() { "{}" } else { yaml };
    serde_yaml_ng::from_str(yaml).map_err(|e| LinkError::config_error(context, e.to_string()))
}
