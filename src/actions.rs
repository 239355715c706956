use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeDelta, TimeZone};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::models::ConnectivityState;
use crate::shelly::ShellyPlug;

/// Receives WAN state changes from the tick driver.
///
/// Each hook gets the evaluation time and how long the link spent in the state it just left.
pub trait TransitionHandler {
    async fn on_wan_up(&self, now: NaiveDateTime, downtime: TimeDelta);
    async fn on_wan_sick(&self, now: NaiveDateTime, uptime: TimeDelta);
    async fn on_wan_down(&self, now: NaiveDateTime, sicktime: TimeDelta);
}

pub fn format_dwell(dwell: TimeDelta) -> String {
    let secs = dwell.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

struct ModemPlug {
    plug: ShellyPlug,
    off_seconds: u64,
}

/// Production handler: logs every change, optionally posts a webhook and
/// power-cycles the modem once the WAN is declared down.
pub struct Actions {
    webhook_url: Option<String>,
    http_client: reqwest::Client,
    modem_plug: Option<ModemPlug>,
}

impl Actions {
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let modem_plug = match &config.modem_plug {
            Some(p) => Some(ModemPlug {
                plug: ShellyPlug::new(&p.address)?,
                off_seconds: p.off_seconds,
            }),
            None => None,
        };
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            webhook_url: config.webhook_url.clone(),
            http_client,
            modem_plug,
        })
    }

    async fn send_webhook(&self, state: ConnectivityState, now: NaiveDateTime, dwell: TimeDelta) {
        if let Some(url) = &self.webhook_url {
            let payload = webhook_payload(state, now, dwell);
            let res = self
                .http_client
                .post(url)
                .json(&payload)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = res {
                warn!(error = %e, "webhook delivery failed");
            }
        }
    }

    async fn power_cycle_modem(&self) {
        if let Some(modem) = &self.modem_plug {
            info!(plug = %modem.plug.url(), off_seconds = modem.off_seconds, "power cycling modem");
            if let Err(e) = modem.plug.turn_off(modem.off_seconds).await {
                error!("modem power cycle failed: {:#}", e);
            }
        }
    }
}

/// Local evaluation time as RFC 3339, the form embed receivers expect.
fn embed_timestamp(now: NaiveDateTime) -> String {
    Local
        .from_local_datetime(&now)
        .earliest()
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| now.and_utc().to_rfc3339())
}

fn webhook_payload(state: ConnectivityState, now: NaiveDateTime, dwell: TimeDelta) -> serde_json::Value {
    let (color, previous) = match state {
        ConnectivityState::Up => (0x2ECC71, "Downtime"),
        ConnectivityState::Sick => (0xF1C40F, "Uptime"),
        _ => (0xE74C3C, "Sick for"),
    };
    serde_json::json!({
        "username": "WAN Monitor",
        "embeds": [{
            "title": "WAN State Transition",
            "color": color,
            "fields": [
                { "name": "State", "value": state.to_string(), "inline": true },
                { "name": previous, "value": format_dwell(dwell), "inline": true },
            ],
            "timestamp": embed_timestamp(now),
        }]
    })
}

impl TransitionHandler for Actions {
    async fn on_wan_up(&self, now: NaiveDateTime, downtime: TimeDelta) {
        info!(at = %now, downtime = %format_dwell(downtime), "WAN is back up");
        self.send_webhook(ConnectivityState::Up, now, downtime).await;
    }

    async fn on_wan_sick(&self, now: NaiveDateTime, uptime: TimeDelta) {
        warn!(at = %now, uptime = %format_dwell(uptime), "WAN went sick");
        self.send_webhook(ConnectivityState::Sick, now, uptime).await;
    }

    async fn on_wan_down(&self, now: NaiveDateTime, sicktime: TimeDelta) {
        error!(at = %now, sicktime = %format_dwell(sicktime), "WAN is down");
        self.send_webhook(ConnectivityState::Down, now, sicktime).await;
        self.power_cycle_modem().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn dwell_is_humanized() {
        assert_eq!(format_dwell(TimeDelta::zero()), "0s");
        assert_eq!(format_dwell(TimeDelta::seconds(9)), "9s");
        assert_eq!(format_dwell(TimeDelta::seconds(125)), "2m 5s");
        assert_eq!(format_dwell(TimeDelta::seconds(3 * 3600 + 61)), "3h 1m 1s");
        assert_eq!(format_dwell(TimeDelta::seconds(-4)), "0s");
    }

    #[test]
    fn payload_names_the_dwell_being_left() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(14, 0, 0).unwrap();
        let payload = webhook_payload(ConnectivityState::Up, now, TimeDelta::seconds(75));
        let embed = &payload["embeds"][0];

        assert_eq!(embed["fields"][0]["value"], "up");
        assert_eq!(embed["fields"][1]["name"], "Downtime");
        assert_eq!(embed["fields"][1]["value"], "1m 15s");
        let sent = chrono::DateTime::parse_from_rfc3339(embed["timestamp"].as_str().unwrap()).unwrap();
        assert_eq!(sent.with_timezone(&Local).naive_local(), now);
    }

    #[test]
    fn actions_without_collaborators() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{ "lan_gateway": "192.168.10.1", "wan_gateway": "73.93.94.1" }"#,
        )
        .unwrap();
        let actions = Actions::from_config(&config).unwrap();
        assert!(actions.webhook_url.is_none());
        assert!(actions.modem_plug.is_none());
    }
}
