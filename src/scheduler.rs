//! Trading scheduler
//!
//! Wall-clock triggers in the exchange's zone (IST) drive the daily cycle:
//!
//!   08:45 Mon-Fri  data refresh
//!   09:15 Mon-Fri  signal cycle (waits on a still-running refresh)
//!   09:30-15:30    position monitor + approval expiry, every 15 minutes
//!   15:30 Mon-Fri  end-of-day summary
//!   00:00 daily    instrument registry reload
//!   1st 07:00      monthly learning review
//!
//! The Telegram long-poll loop runs separately (telegram::poller).

use crate::approval;
use crate::database;
use crate::ingestion;
use crate::logger::{self, LogTag};
use crate::monitor;
use crate::risk::{self, RiskContext};
use crate::signal;
use crate::telegram;
use crate::utils::{check_shutdown_or_delay, ist_now};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Timelike, Utc, Weekday};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How often the trigger loop re-checks the wall clock
const CLOCK_CHECK_SECS: u64 = 20;

/// Position-monitor cadence during market hours
const MONITOR_INTERVAL_SECS: u64 = 15 * 60;

/// How long the 09:15 cycle waits for a still-running refresh
const REFRESH_WAIT_SECS: u64 = 600;

/// Tracks which calendar day each trigger last fired on
#[derive(Default)]
struct FiredDates {
    pre_market: Option<NaiveDate>,
    market_open: Option<NaiveDate>,
    end_of_day: Option<NaiveDate>,
    registry_reload: Option<NaiveDate>,
    monthly_review: Option<NaiveDate>,
}

fn is_trading_day(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Main wall-clock trigger loop. Each trigger fires once per day, as soon
/// as the clock passes its time; long-running work is spawned so triggers
/// never delay each other.
pub async fn run_trigger_loop(shutdown: Arc<Notify>) {
    logger::info(LogTag::Scheduler, "Starting wall-clock trigger loop (IST)");
    let mut fired = FiredDates::default();

    loop {
        if check_shutdown_or_delay(&shutdown, Duration::from_secs(CLOCK_CHECK_SECS)).await {
            logger::info(LogTag::Scheduler, "Trigger loop shutting down");
            break;
        }

        let now = ist_now();
        let today = now.date_naive();
        let minutes = now.hour() * 60 + now.minute();
        let trading_day = is_trading_day(now.weekday());

        // 00:00 daily: registry reload
        if fired.registry_reload != Some(today) {
            fired.registry_reload = Some(today);
            // Skip the reload right after process start; startup already loaded it
            if minutes < 8 * 60 {
                tokio::spawn(crate::broker::reload_instruments());
            }
        }

        // 08:45 Mon-Fri: pre-market data refresh
        if trading_day && minutes >= 8 * 60 + 45 && fired.pre_market != Some(today) {
            fired.pre_market = Some(today);
            logger::info(LogTag::Scheduler, "=== PRE-MARKET (08:45) — refreshing data ===");
            tokio::spawn(ingestion::refresh_all());
        }

        // 09:15 Mon-Fri: analysis pipeline
        if trading_day && minutes >= 9 * 60 + 15 && fired.market_open != Some(today) {
            fired.market_open = Some(today);
            logger::info(LogTag::Scheduler, "=== MARKET OPEN (09:15) — signal cycle ===");
            tokio::spawn(run_signal_cycle());
        }

        // 15:30 Mon-Fri: end-of-day summary
        if trading_day && minutes >= 15 * 60 + 30 && fired.end_of_day != Some(today) {
            fired.end_of_day = Some(today);
            logger::info(LogTag::Scheduler, "=== END OF DAY (15:30) ===");
            tokio::spawn(monitor::send_daily_summary());
        }

        // 1st of the month, 07:00: learning review
        if now.day() == 1 && minutes >= 7 * 60 && fired.monthly_review != Some(today) {
            fired.monthly_review = Some(today);
            logger::info(LogTag::Scheduler, "=== MONTHLY LEARNING REVIEW ===");
            tokio::spawn(crate::learning::run_monthly_review());
        }
    }
}

/// Intraday loop: position monitor tick plus approval expiry sweep, every
/// 15 minutes inside 09:30-15:30 IST. Ticks are sequential and never
/// overlap.
pub async fn run_monitor_loop(shutdown: Arc<Notify>) {
    logger::info(LogTag::Scheduler, "Starting intraday monitor loop");
    loop {
        if check_shutdown_or_delay(&shutdown, Duration::from_secs(1)).await {
            logger::info(LogTag::Scheduler, "Monitor loop shutting down");
            break;
        }

        let now = ist_now();
        let minutes = now.hour() * 60 + now.minute();
        let in_market_hours =
            is_trading_day(now.weekday()) && (9 * 60 + 30..=15 * 60 + 30).contains(&minutes);

        if in_market_hours {
            monitor::monitor_tick().await;
            approval::expire_timed_out().await;
        }

        if check_shutdown_or_delay(&shutdown, Duration::from_secs(MONITOR_INTERVAL_SECS)).await {
            logger::info(LogTag::Scheduler, "Monitor loop shutting down");
            break;
        }
    }
}

// =============================================================================
// SIGNAL CYCLE
// =============================================================================

/// The 09:15 pipeline: wait for the refresh, generate, validate, submit.
pub async fn run_signal_cycle() {
    // The pre-market refresh may still be running; wait, then go partial
    if ingestion::is_refresh_in_progress() {
        logger::warning(
            LogTag::Scheduler,
            "Data refresh still in progress at 09:15, waiting up to 10 minutes",
        );
        let deadline = std::time::Instant::now() + Duration::from_secs(REFRESH_WAIT_SECS);
        while ingestion::is_refresh_in_progress() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_secs(15)).await;
        }
        if ingestion::is_refresh_in_progress() {
            logger::error(
                LogTag::Scheduler,
                "Refresh did not finish in time, proceeding with partial universe",
            );
            let _ = telegram::send_alert(
                "⚠️ PARTIAL DATA WARNING",
                "Pre-market refresh was still running at 09:15. Signals may be based on an incomplete universe.",
            )
            .await;
        }
    }

    // Degraded mode: registry and refresh both failed leaves nothing to
    // analyse. Emit zero proposals and exactly one operator alert.
    if ingestion::cached_symbol_count().await == 0 {
        logger::error(LogTag::Scheduler, "Snapshot store is empty, skipping signal cycle");
        let _ = telegram::send_alert(
            "⚠️ UNIVERSE UNAVAILABLE",
            "No market data could be fetched this morning. No signals will be generated today.",
        )
        .await;
        return;
    }

    let proposals = signal::generate_signals().await;
    if proposals.is_empty() {
        logger::info(LogTag::Scheduler, "No signals above the confidence threshold");
        return;
    }

    let portfolio_value = crate::portfolio::portfolio_value();
    let cfg = crate::config::with_config(|c| c.clone());

    for proposal in proposals {
        // Open positions and the weekly buy count move as earlier proposals
        // in this same cycle get submitted, so both are re-read per proposal.
        let open_positions = database::store()
            .and_then(|s| s.open_positions())
            .unwrap_or_default();
        let new_buys_this_week = database::store()
            .and_then(|s| s.count_new_buys_since(Utc::now() - ChronoDuration::days(7)))
            .unwrap_or(0);

        let ctx = RiskContext {
            open_positions: &open_positions,
            portfolio_value,
            new_buys_this_week,
        };
        let validation = risk::validate(&proposal, &ctx, &cfg);
        if !validation.passed {
            logger::info(
                LogTag::Scheduler,
                &format!(
                    "Signal for {} dropped by risk validation: {}",
                    proposal.symbol,
                    validation.failures.join("; ")
                ),
            );
            continue;
        }

        approval::submit(proposal, &validation).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_day() {
        assert!(is_trading_day(Weekday::Mon));
        assert!(is_trading_day(Weekday::Fri));
        assert!(!is_trading_day(Weekday::Sat));
        assert!(!is_trading_day(Weekday::Sun));
    }
}
