use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::probe::Prober;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
// `%.f` also accepts timestamps written without a fractional part.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_PARSE_FORMAT).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectivityState {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "down")]
    Down,
    #[serde(rename = "sick")]
    Sick,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectivityState::None => "none",
            ConnectivityState::Up => "up",
            ConnectivityState::Down => "down",
            ConnectivityState::Sick => "sick",
        };
        f.write_str(s)
    }
}

/// Shape discriminator written into every persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordKind {
    #[default]
    #[serde(rename = "connectivity_status")]
    ConnectivityStatus,
}

/// Snapshot of gateway reachability plus the debounced link state.
///
/// Latency fields hold a human readable round-trip time such as `"7.445 ms"`,
/// or an empty string when the address did not answer this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    kind: RecordKind,
    lan_gateway_address: String,
    wan_gateway_address: String,
    modem_address: String,
    pub lan_latency: String,
    pub wan_latency: String,
    pub modem_latency: String,
    pub state: ConnectivityState,
    pub last_transition_time: String,
}

impl StateRecord {
    pub fn new(lan_gateway: &str, wan_gateway: &str, modem: &str) -> Self {
        Self {
            kind: RecordKind::ConnectivityStatus,
            lan_gateway_address: lan_gateway.to_string(),
            wan_gateway_address: wan_gateway.to_string(),
            modem_address: modem.to_string(),
            lan_latency: String::new(),
            wan_latency: String::new(),
            modem_latency: String::new(),
            state: ConnectivityState::None,
            last_transition_time: String::new(),
        }
    }

    pub fn lan_gateway_address(&self) -> &str {
        &self.lan_gateway_address
    }

    pub fn wan_gateway_address(&self) -> &str {
        &self.wan_gateway_address
    }

    pub fn modem_address(&self) -> &str {
        &self.modem_address
    }

    /// A record without a LAN gateway never came from a successful load.
    pub fn is_loaded(&self) -> bool {
        !self.lan_gateway_address.is_empty()
    }

    pub fn lan_reachable(&self) -> bool {
        !self.lan_latency.is_empty()
    }

    pub fn wan_reachable(&self) -> bool {
        !self.wan_latency.is_empty()
    }

    /// Probes LAN gateway, modem and WAN gateway, in that order.
    pub async fn probe<P: Prober>(&mut self, prober: &P, timeout: Duration) {
        self.lan_latency = prober.probe(&self.lan_gateway_address, timeout).await;
        self.modem_latency = prober.probe(&self.modem_address, timeout).await;
        self.wan_latency = prober.probe(&self.wan_gateway_address, timeout).await;
    }
}

/// Result of one state machine evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectivityState,
    pub to: ConnectivityState,
    pub at: NaiveDateTime,
    /// Time spent in `from`; zero when the state did not change.
    pub dwell: TimeDelta,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}
