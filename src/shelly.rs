//! Client for a Gen1 Shelly plug relay.
//!
//! See <https://shelly-api-docs.shelly.cloud/gen1/#shelly-plug-plugs-relay-0>.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayStatus {
    pub ison: bool,
    #[serde(default)]
    pub has_timer: bool,
}

pub struct ShellyPlug {
    url: String,
    http_client: reqwest::Client,
}

impl ShellyPlug {
    pub fn new(address: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            url: format!("http://{}/relay/0", address),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Switches the relay on; with a non-zero duration it flips back off after that many seconds.
    pub async fn turn_on(&self, duration_secs: u64) -> Result<RelayStatus> {
        self.get(&relay_params("on", duration_secs)).await
    }

    /// Switches the relay off; with a non-zero duration it flips back on after that many seconds.
    pub async fn turn_off(&self, duration_secs: u64) -> Result<RelayStatus> {
        self.get(&relay_params("off", duration_secs)).await
    }

    pub async fn toggle(&self) -> Result<RelayStatus> {
        self.get(&relay_params("toggle", 0)).await
    }

    async fn get(&self, params: &[(&'static str, String)]) -> Result<RelayStatus> {
        let response = self
            .http_client
            .get(&self.url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("HTTP GET {} failed", self.url))?;

        let status = response.status();
        info!(url = %self.url, ?params, %status, "relay command sent");

        let relay = response
            .error_for_status()
            .with_context(|| format!("{} rejected relay command", self.url))?
            .json::<RelayStatus>()
            .await
            .context("unexpected relay response body")?;
        info!(ison = relay.ison, has_timer = relay.has_timer, "relay state");
        Ok(relay)
    }
}

fn relay_params(turn: &str, duration_secs: u64) -> Vec<(&'static str, String)> {
    let mut params = vec![("turn", turn.to_string())];
    if duration_secs > 0 {
        params.push(("timer", duration_secs.to_string()));
    }
    params
}
