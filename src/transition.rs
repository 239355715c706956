//! Debounced WAN state machine.
//!
//! Losing the WAN gateway flags `sick` on the first missed probe; `sick`
//! escalates to `down` only once the sick timeout has elapsed since sick
//! onset. `down` is sticky. Any answered probe is an instant return to `up`.

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info, warn};

use crate::models::{format_timestamp, parse_timestamp, ConnectivityState, StateRecord, Transition};

/// Classifies `new` against the previous record `old`.
///
/// Sets `new.state` and `new.last_transition_time`; the caller persists `new`.
pub fn evaluate(
    old: &StateRecord,
    new: &mut StateRecord,
    now: NaiveDateTime,
    sick_timeout: TimeDelta,
) -> Transition {
    let since = match parse_timestamp(&old.last_transition_time) {
        Some(ts) => ts,
        None => {
            if !old.last_transition_time.is_empty() {
                warn!(stored = %old.last_transition_time, "unreadable transition time, restarting the clock");
            }
            now
        }
    };
    new.last_transition_time = format_timestamp(since);

    let state = if new.wan_reachable() {
        if old.wan_reachable() {
            debug!(lan = %new.lan_latency, wan = %new.wan_latency, since = %new.last_transition_time, "WAN up");
        } else {
            new.last_transition_time = format_timestamp(now);
            debug!(at = %new.last_transition_time, "WAN going up");
        }
        ConnectivityState::Up
    } else if old.wan_reachable() {
        new.last_transition_time = format_timestamp(now);
        debug!(at = %new.last_transition_time, "WAN going sick");
        ConnectivityState::Sick
    } else if old.state == ConnectivityState::Down {
        debug!(since = %new.last_transition_time, "WAN still down");
        ConnectivityState::Down
    } else if since.checked_add_signed(sick_timeout).map_or(true, |deadline| now < deadline) {
        info!(since = %new.last_transition_time, "WAN still sick");
        ConnectivityState::Sick
    } else {
        new.last_transition_time = format_timestamp(now);
        debug!(at = %new.last_transition_time, "WAN going down");
        ConnectivityState::Down
    };
    new.state = state;

    let dwell = if old.state != state { now - since } else { TimeDelta::zero() };

    Transition { from: old.state, to: state, at: now, dwell }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const LAN: &str = "192.168.10.1";
    const WAN: &str = "192.168.100.1";
    const MODEM: &str = "192.168.100.10";

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(14, 0, 0, 250_000)
            .unwrap()
    }

    fn sick_timeout() -> TimeDelta {
        TimeDelta::seconds(9)
    }

    fn record(state: ConnectivityState, wan: &str, since: Option<NaiveDateTime>) -> StateRecord {
        let mut r = StateRecord::new(LAN, WAN, MODEM);
        r.lan_latency = "0.400 ms".into();
        r.wan_latency = wan.into();
        r.state = state;
        r.last_transition_time = since.map(format_timestamp).unwrap_or_default();
        r
    }

    fn probed(wan: &str) -> StateRecord {
        record(ConnectivityState::None, wan, None)
    }

    #[test]
    fn first_sample_up_starts_clock_now() {
        let old = StateRecord::new(LAN, WAN, MODEM);
        let mut new = probed("5.000 ms");
        let now = t0();

        let tr = evaluate(&old, &mut new, now, sick_timeout());

        assert_eq!(tr.from, ConnectivityState::None);
        assert_eq!(tr.to, ConnectivityState::Up);
        assert_eq!(tr.dwell, TimeDelta::zero());
        assert_eq!(new.last_transition_time, format_timestamp(now));
    }

    #[test]
    fn first_sample_unreachable_is_sick() {
        let old = StateRecord::new(LAN, WAN, MODEM);
        let mut new = probed("");

        let tr = evaluate(&old, &mut new, t0(), sick_timeout());

        assert_eq!(tr.to, ConnectivityState::Sick);
        assert_eq!(new.last_transition_time, format_timestamp(t0()));
    }

    #[test]
    fn staying_up_keeps_timestamp() {
        let since = t0();
        let old = record(ConnectivityState::Up, "5.000 ms", Some(since));
        let mut new = probed("6.000 ms");
        let now = since + TimeDelta::hours(3);

        let tr = evaluate(&old, &mut new, now, sick_timeout());

        assert!(!tr.changed());
        assert_eq!(new.state, ConnectivityState::Up);
        assert_eq!(new.last_transition_time, format_timestamp(since));
        assert_eq!(tr.dwell, TimeDelta::zero());
    }

    #[test]
    fn lost_probe_goes_sick_immediately() {
        let since = t0();
        let old = record(ConnectivityState::Up, "5 ms", Some(since));
        let now = since + TimeDelta::minutes(10);

        for timeout in [TimeDelta::seconds(1), sick_timeout(), TimeDelta::hours(1)] {
            let mut new = probed("");
            let tr = evaluate(&old, &mut new, now, timeout);
            assert_eq!(new.state, ConnectivityState::Sick);
            assert_eq!(new.last_transition_time, format_timestamp(now));
            assert_eq!(tr.dwell, TimeDelta::minutes(10));
        }
    }

    #[test]
    fn down_is_sticky() {
        let since = t0();
        let old = record(ConnectivityState::Down, "", Some(since));
        let mut new = probed("");

        let tr = evaluate(&old, &mut new, since + TimeDelta::hours(2), sick_timeout());

        assert_eq!(new.state, ConnectivityState::Down);
        assert_eq!(new.last_transition_time, old.last_transition_time);
        assert!(!tr.changed());
        assert_eq!(tr.dwell, TimeDelta::zero());
    }

    #[test]
    fn sick_within_grace_window_stays_sick() {
        let since = t0();
        let old = record(ConnectivityState::Sick, "", Some(since));
        let mut new = probed("");
        let now = since + sick_timeout() - TimeDelta::seconds(1);

        let tr = evaluate(&old, &mut new, now, sick_timeout());

        assert_eq!(new.state, ConnectivityState::Sick);
        assert_eq!(new.last_transition_time, format_timestamp(since));
        assert!(!tr.changed());
    }

    #[test]
    fn sick_past_grace_window_goes_down() {
        let since = t0();
        let old = record(ConnectivityState::Sick, "", Some(since));
        let mut new = probed("");
        let now = since + sick_timeout() + TimeDelta::seconds(1);

        let tr = evaluate(&old, &mut new, now, sick_timeout());

        assert_eq!(new.state, ConnectivityState::Down);
        assert_eq!(new.last_transition_time, format_timestamp(now));
        assert_eq!(tr.from, ConnectivityState::Sick);
        assert_eq!(tr.dwell, TimeDelta::seconds(10));
    }

    #[test]
    fn grace_window_boundary_goes_down() {
        let since = t0();
        let old = record(ConnectivityState::Sick, "", Some(since));
        let mut new = probed("");

        evaluate(&old, &mut new, since + sick_timeout(), sick_timeout());

        assert_eq!(new.state, ConnectivityState::Down);
    }

    #[test]
    fn recovery_is_instant() {
        let since = t0();
        let now = since + TimeDelta::seconds(42);

        for state in [ConnectivityState::Sick, ConnectivityState::Down] {
            let old = record(state, "", Some(since));
            let mut new = probed("3 ms");

            let tr = evaluate(&old, &mut new, now, sick_timeout());

            assert_eq!(new.state, ConnectivityState::Up);
            assert_eq!(new.last_transition_time, format_timestamp(now));
            assert_eq!(tr.from, state);
            assert_eq!(tr.dwell, TimeDelta::seconds(42));
        }
    }

    #[test]
    fn unreadable_timestamp_restarts_clock() {
        let mut old = record(ConnectivityState::Sick, "", None);
        old.last_transition_time = "last tuesday".into();
        let mut new = probed("");

        let tr = evaluate(&old, &mut new, t0(), sick_timeout());

        assert_eq!(new.state, ConnectivityState::Sick);
        assert_eq!(new.last_transition_time, format_timestamp(t0()));
        assert!(!tr.changed());
    }

    #[test]
    fn timestamp_never_moves_backwards_across_ticks() {
        let mut old = record(ConnectivityState::Up, "5 ms", Some(t0()));
        let samples = ["5 ms", "", "", "", "", "4 ms", "4 ms"];
        let mut now = t0();

        for wan in samples {
            now += TimeDelta::seconds(3);
            let mut new = probed(wan);
            evaluate(&old, &mut new, now, sick_timeout());
            assert!(
                parse_timestamp(&new.last_transition_time) >= parse_timestamp(&old.last_transition_time)
            );
            old = new;
        }
        assert_eq!(old.state, ConnectivityState::Up);
    }

    #[test]
    fn unbounded_grace_window_stays_sick() {
        let since = t0();
        let old = record(ConnectivityState::Sick, "", Some(since));
        let mut new = probed("");

        let tr = evaluate(&old, &mut new, since + TimeDelta::days(3650), TimeDelta::MAX);

        assert_eq!(new.state, ConnectivityState::Sick);
        assert!(!tr.changed());
    }
}
