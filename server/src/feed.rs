//! Deterministic mock feed.
//!
//! Publishes one synthetic `debt_update` per interval so a dashboard has
//! something to show without a real data source. The n-th update is a pure
//! function of `n` and the clock, which keeps tests exact.

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::AppState;
use shared::types::{Impact, RealTimeUpdate};

const COUNTRIES: &[&str] = &[
    "United States",
    "Japan",
    "Italy",
    "United Kingdom",
    "France",
    "Germany",
    "China",
    "Brazil",
    "India",
    "Canada",
    "Argentina",
    "South Africa",
];

fn describe(n: u64, impact: Impact) -> String {
    let bp = 5 + (n * 13) % 40;
    let billions = 10 + (n * 7) % 90;
    match (impact, (n / 3) % 3) {
        (Impact::Negative, 0) => format!("10Y bond yield up {} bp after weak auction", bp),
        (Impact::Negative, 1) => format!("Deficit widens by ${}B over forecast", billions),
        (Impact::Negative, _) => "Outlook cut to negative by rating agency".to_string(),
        (Impact::Positive, 0) => format!("Debt-to-GDP ratio revised down {} bp", bp),
        (Impact::Positive, 1) => format!("${}B early repayment of external debt", billions),
        (Impact::Positive, _) => "Credit rating upgraded one notch".to_string(),
        (Impact::Neutral, 0) => format!("Treasury announces ${}B refinancing", billions),
        (Impact::Neutral, 1) => "Debt ceiling talks continue".to_string(),
        (Impact::Neutral, _) => format!("Auction sizes unchanged, yields flat within {} bp", bp % 5 + 1),
    }
}

/// The n-th synthetic update, stamped with `now`.
pub fn mock_update(n: u64, now: DateTime<Utc>) -> RealTimeUpdate {
    let country = COUNTRIES[(n as usize * 7) % COUNTRIES.len()];
    let impact = match n % 3 {
        0 => Impact::Negative,
        1 => Impact::Positive,
        _ => Impact::Neutral,
    };

    RealTimeUpdate::new(
        country,
        describe(n, impact),
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
        impact,
    )
}

/// Publish mock updates forever. `feed.enabled` and `feed.interval_secs` are
/// re-read on every tick so a config reload takes effect without a restart.
pub async fn run_feed(state: AppState) {
    info!("Mock feed started");
    let mut n: u64 = 0;

    loop {
        let interval = state.config.read().await.feed.interval();
        sleep(interval).await;

        // read after the sleep so a reload mid-interval takes effect this tick
        if !state.config.read().await.feed.enabled {
            debug!("Mock feed disabled, skipping tick");
            continue;
        }

        state.hub.publish(mock_update(n, Utc::now())).await;
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::types::{AppConfig, DEBT_UPDATE};
    use std::time::Duration;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 28, 10, 0, 0).unwrap()
    }

    #[test]
    fn same_index_same_update() {
        assert_eq!(mock_update(4, fixed_now()), mock_update(4, fixed_now()));
        assert_ne!(mock_update(4, fixed_now()), mock_update(5, fixed_now()));
    }

    #[test]
    fn impact_cycles_every_three() {
        let impacts: Vec<Impact> = (0..6).map(|n| mock_update(n, fixed_now()).impact).collect();
        assert_eq!(
            impacts,
            vec![
                Impact::Negative,
                Impact::Positive,
                Impact::Neutral,
                Impact::Negative,
                Impact::Positive,
                Impact::Neutral,
            ]
        );
    }

    #[test]
    fn updates_are_well_formed() {
        for n in 0..50 {
            let u = mock_update(n, fixed_now());
            assert_eq!(u.kind, DEBT_UPDATE);
            assert_eq!(u.timestamp, "2025-06-28T10:00:00Z");
            assert!(u.parsed_timestamp().is_some());
            assert!(!u.description.is_empty());
        }
    }

    #[test]
    fn countries_rotate_through_the_table() {
        let seen: std::collections::HashSet<String> = (0..COUNTRIES.len() as u64)
            .map(|n| mock_update(n, fixed_now()).country)
            .collect();
        assert_eq!(seen.len(), COUNTRIES.len());
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_once_per_interval() {
        let state = AppState::new(AppConfig::default());
        let feed = tokio::spawn(run_feed(state.clone()));

        sleep(Duration::from_millis(4_900)).await;
        assert_eq!(state.hub.published_total(), 0);

        sleep(Duration::from_millis(6_000)).await;
        assert_eq!(state.hub.published_total(), 2);

        feed.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_feed_publishes_nothing() {
        let mut cfg = AppConfig::default();
        cfg.feed.enabled = false;
        let state = AppState::new(cfg);
        let feed = tokio::spawn(run_feed(state.clone()));

        sleep(Duration::from_secs(30)).await;
        assert_eq!(state.hub.published_total(), 0);

        feed.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_mid_interval_skips_the_pending_tick() {
        let state = AppState::new(AppConfig::default());
        let feed = tokio::spawn(run_feed(state.clone()));

        sleep(Duration::from_secs(2)).await;
        let mut cfg = AppConfig::default();
        cfg.feed.enabled = false;
        state.config.reload(cfg).await;

        sleep(Duration::from_secs(20)).await;
        assert_eq!(state.hub.published_total(), 0);

        feed.abort();
    }
}
