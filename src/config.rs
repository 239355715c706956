use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    pub lan_gateway: String,
    pub wan_gateway: String,
    #[serde(default)]
    pub modem_address: String,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_sick_timeout")]
    pub sick_timeout_secs: u64,
    pub webhook_url: Option<String>,
    pub modem_plug: Option<PlugConfig>,
}

/// Smart plug powering the modem, used to power-cycle it once the WAN is down.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlugConfig {
    pub address: String,
    #[serde(default = "default_off_seconds")]
    pub off_seconds: u64,
}

// Keeps the grace window representable as a `TimeDelta`.
const MAX_SICK_TIMEOUT_SECS: u64 = i64::MAX as u64 / 1000;

fn default_state_path() -> PathBuf { PathBuf::from("/tmp/modem_status.json") }
fn default_check_interval() -> u64 { 3 }
fn default_probe_timeout() -> u64 { 100 }
fn default_sick_timeout() -> u64 { 9 }
fn default_off_seconds() -> u64 { 10 }

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: MonitorConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lan_gateway.trim().is_empty() {
            bail!("lan_gateway must not be empty");
        }
        if self.wan_gateway.trim().is_empty() {
            bail!("wan_gateway must not be empty");
        }
        if self.check_interval == 0 {
            bail!("check_interval must be at least one second");
        }
        if self.sick_timeout_secs > MAX_SICK_TIMEOUT_SECS {
            bail!("sick_timeout_secs must not exceed {}", MAX_SICK_TIMEOUT_SECS);
        }
        if let Some(plug) = &self.modem_plug {
            if plug.address.trim().is_empty() {
                bail!("modem_plug.address must not be empty");
            }
            // Without an auto-on timer the modem would stay unpowered.
            if plug.off_seconds == 0 {
                bail!("modem_plug.off_seconds must be at least one second");
            }
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn sick_timeout(&self) -> chrono::TimeDelta {
        i64::try_from(self.sick_timeout_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }
}
