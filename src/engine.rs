use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info};

use crate::actions::TransitionHandler;
use crate::config::MonitorConfig;
use crate::models::{ConnectivityState, StateRecord, Transition};
use crate::probe::Prober;
use crate::{store, transition};

/// What a single tick ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No usable previous record; a fresh baseline was written.
    Initialized,
    /// LAN gateway did not answer, nothing was evaluated or saved.
    LanUnreachable,
    Unchanged(ConnectivityState),
    Transitioned(Transition),
}

pub struct Monitor<P, H> {
    pub config: MonitorConfig,
    prober: P,
    handler: H,
}

impl<P: Prober, H: TransitionHandler> Monitor<P, H> {
    pub fn new(config: MonitorConfig, prober: P, handler: H) -> Self {
        Self { config, prober, handler }
    }

    /// Polls until the surrounding future is dropped. Ticks never overlap.
    pub async fn run(&self) {
        info!(
            lan = %self.config.lan_gateway,
            wan = %self.config.wan_gateway,
            modem = %self.config.modem_address,
            interval = self.config.check_interval,
            "WAN monitor active"
        );
        loop {
            let outcome = self.tick().await;
            debug!(?outcome, "tick finished");
            tokio::time::sleep(self.config.interval()).await;
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Local::now().naive_local()).await
    }

    /// One evaluation cycle: load the previous record, probe, classify,
    /// persist, then dispatch at most one transition hook.
    pub async fn tick_at(&self, now: NaiveDateTime) -> TickOutcome {
        let path = &self.config.state_path;
        let previous = self.load_baseline();

        let mut current = StateRecord::new(
            &self.config.lan_gateway,
            &self.config.wan_gateway,
            &self.config.modem_address,
        );
        current.probe(&self.prober, self.config.probe_timeout()).await;

        let Some(previous) = previous else {
            self.persist(&current);
            info!(path = %path.display(), "baseline written");
            return TickOutcome::Initialized;
        };

        if !current.lan_reachable() {
            info!(lan = %self.config.lan_gateway, "LAN inaccessible");
            return TickOutcome::LanUnreachable;
        }

        let change = transition::evaluate(&previous, &mut current, now, self.config.sick_timeout());
        self.persist(&current);

        if !change.changed() {
            return TickOutcome::Unchanged(change.to);
        }

        match change.to {
            ConnectivityState::Up => {
                debug!(since = %current.last_transition_time, "wan going up");
                self.handler.on_wan_up(change.at, change.dwell).await;
            }
            ConnectivityState::Sick => {
                debug!(since = %current.last_transition_time, "wan going sick");
                self.handler.on_wan_sick(change.at, change.dwell).await;
            }
            ConnectivityState::Down => {
                debug!(since = %current.last_transition_time, "wan going down");
                self.handler.on_wan_down(change.at, change.dwell).await;
            }
            ConnectivityState::None => {
                error!(from = %change.from, to = %change.to, "unhandled transition");
            }
        }
        TickOutcome::Transitioned(change)
    }

    fn load_baseline(&self) -> Option<StateRecord> {
        let record = match store::load(&self.config.state_path) {
            Ok(record) => record,
            Err(e) => {
                info!("no previous state: {:#}", e);
                return None;
            }
        };
        if !record.is_loaded() {
            info!("previous state has no LAN gateway, ignoring it");
            return None;
        }
        // Latencies of other gateways are no baseline for these ones.
        if record.lan_gateway_address() != self.config.lan_gateway
            || record.wan_gateway_address() != self.config.wan_gateway
            || record.modem_address() != self.config.modem_address
        {
            info!(
                stored_lan = %record.lan_gateway_address(),
                stored_wan = %record.wan_gateway_address(),
                "previous state was recorded for other addresses, ignoring it"
            );
            return None;
        }
        Some(record)
    }

    fn persist(&self, record: &StateRecord) {
        if let Err(e) = store::save(record, &self.config.state_path) {
            error!("failed to save state: {:#}", e);
        }
    }
}
