//! Position monitor
//!
//! Ticks over every open position during market hours: autonomous stop-loss
//! and drawdown exits, target-reached notifications (profit booking stays
//! with the operator), and trailing stops that only ever move up.

use crate::broker::{self, broker};
use crate::config::with_config;
use crate::database;
use crate::execution;
use crate::logger::{self, LogTag};
use crate::telegram;
use crate::types::TradeRecord;
use chrono::Utc;

/// One monitoring pass over all open positions. Ticks never overlap: the
/// scheduler awaits each pass before starting the next.
pub async fn monitor_tick() {
    let positions = match database::store().and_then(|s| s.open_positions()) {
        Ok(positions) => positions,
        Err(e) => {
            logger::error(LogTag::Monitor, &format!("Could not load open positions: {}", e));
            return;
        }
    };

    if positions.is_empty() {
        logger::debug(LogTag::Monitor, "No open positions to monitor");
        return;
    }

    logger::info(
        LogTag::Monitor,
        &format!("Monitoring {} open positions", positions.len()),
    );

    for position in positions {
        let Some(current_price) = fetch_live_price(&position.symbol).await else {
            logger::warning(
                LogTag::Monitor,
                &format!("Could not fetch price for {}, skipping this tick", position.symbol),
            );
            continue;
        };

        check_position(&position, current_price).await;
    }
}

/// Applies the exit/trailing rules to one position at one observed price.
async fn check_position(position: &TradeRecord, current_price: f64) {
    // 1. Stop-loss breach: exit without approval
    if current_price <= position.stop_loss_price {
        logger::warning(
            LogTag::Monitor,
            &format!(
                "STOP-LOSS HIT for {}: ₹{:.2} <= SL ₹{:.2}",
                position.symbol, current_price, position.stop_loss_price
            ),
        );
        exit_position(position, current_price, "STOP_LOSS_HIT").await;
        return;
    }

    // 2. Max single-trade drawdown: exit without approval
    let drawdown = drawdown_pct(position.entry_price, current_price);
    let max_drawdown = with_config(|c| c.risk.max_single_trade_drawdown_pct);
    if drawdown >= max_drawdown {
        logger::warning(
            LogTag::Monitor,
            &format!("MAX DRAWDOWN for {}: {:.1}%", position.symbol, drawdown),
        );
        exit_position(position, current_price, "MAX_DRAWDOWN").await;
        return;
    }

    // 3. Target reached: recommend booking, never auto-sell
    if current_price >= position.target_price {
        let quantity = position.quantity();
        let gain = (current_price - position.entry_price) * quantity as f64;
        let _ = telegram::send_alert(
            "🎯 TARGET HIT",
            &format!(
                "{} @ ₹{:.2} — target ₹{:.2} reached!\nEstimated gain: ₹{:.0}\nReply APPROVE {} to book profits.",
                position.symbol, current_price, position.target_price, gain, position.trade_id
            ),
        )
        .await;
    } else if !position.partial_alert_sent
        && current_price >= halfway_to_target(position.entry_price, position.target_price)
    {
        // One-time partial-profit suggestion at the 50% midpoint
        let _ = telegram::send_alert(
            "💰 PARTIAL PROFIT OPPORTUNITY",
            &format!(
                "{} at 50% of target.\nConsider selling half the position.\nCurrent: ₹{:.2} | Target: ₹{:.2}",
                position.symbol, current_price, position.target_price
            ),
        )
        .await;
        if let Ok(store) = database::store() {
            let _ = store.mark_partial_alert_sent(&position.trade_id);
        }
    }

    // 4. Trailing stop, monotone non-decreasing
    let activate_pct = with_config(|c| c.risk.trailing_stop_activate_pct);
    if let Some(new_stop) = compute_trailing_stop(
        position.entry_price,
        position.initial_stop_price,
        position.stop_loss_price,
        current_price,
        activate_pct,
    ) {
        if let Ok(store) = database::store() {
            let _ = store.update_stop(&position.trade_id, new_stop);
        }
        let profit = gain_pct(position.entry_price, current_price);
        logger::info(
            LogTag::Monitor,
            &format!(
                "Trailing stop for {}: ₹{:.2} -> ₹{:.2}",
                position.symbol, position.stop_loss_price, new_stop
            ),
        );
        let _ = telegram::send_message(&format!(
            "📈 <b>TRAILING STOP UPDATED</b>\n{} — P&L: +{:.1}%\nStop-loss raised: ₹{:.2} → ₹{:.2}",
            position.symbol, profit, position.stop_loss_price, new_stop
        ))
        .await;
    }
}

/// Sells at the observed price and closes the record.
/// The position stays open when the sell cannot be placed; the next tick
/// retries.
async fn exit_position(position: &TradeRecord, exit_price: f64, reason: &str) {
    let quantity = position.quantity();
    let order_id =
        execution::place_sell(&position.symbol, &position.exchange, quantity, exit_price, reason)
            .await;
    if order_id.is_none() {
        logger::error(
            LogTag::Monitor,
            &format!("Exit order failed for {}, will retry next tick", position.symbol),
        );
        return;
    }

    let pnl = (exit_price - position.entry_price) * quantity as f64;
    let pnl_pct = gain_pct(position.entry_price, exit_price);
    if let Ok(store) = database::store() {
        let _ = store.close_trade(&position.trade_id, exit_price, reason, pnl, pnl_pct, false);
    }

    logger::info(
        LogTag::Monitor,
        &format!(
            "Position closed: {} @ ₹{:.2} | P&L ₹{:.0} ({:.1}%) | {}",
            position.symbol, exit_price, pnl, pnl_pct, reason
        ),
    );
    let _ = telegram::send_alert(
        if reason == "STOP_LOSS_HIT" {
            "🔴 STOP-LOSS TRIGGERED"
        } else {
            "🔻 MAX DRAWDOWN EXIT"
        },
        &format!("{} sold @ ₹{:.2} | P&L: ₹{:.0}", position.symbol, exit_price, pnl),
    )
    .await;
}

// =============================================================================
// PURE RULE HELPERS
// =============================================================================

/// New trailing stop keeping the original stop distance below price.
/// Returns Some only when activated AND strictly above the current stop;
/// downward moves are silently ignored.
pub fn compute_trailing_stop(
    entry: f64,
    initial_stop: f64,
    current_stop: f64,
    current_price: f64,
    activate_pct: f64,
) -> Option<f64> {
    if entry <= 0.0 {
        return None;
    }
    if gain_pct(entry, current_price) <= activate_pct {
        return None;
    }
    let stop_distance = entry - initial_stop;
    let new_stop = current_price - stop_distance;
    if new_stop > current_stop {
        Some(new_stop)
    } else {
        None
    }
}

pub fn drawdown_pct(entry: f64, current_price: f64) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    (entry - current_price) / entry * 100.0
}

pub fn gain_pct(entry: f64, current_price: f64) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    (current_price - entry) / entry * 100.0
}

pub fn halfway_to_target(entry: f64, target: f64) -> f64 {
    entry + (target - entry) * 0.5
}

// =============================================================================
// LIVE PRICE
// =============================================================================

/// Live price via batch quote; primary exchange first, then secondary.
async fn fetch_live_price(symbol: &str) -> Option<f64> {
    let (token, exchange) = broker::resolve_token_any(symbol).await?;
    match broker().get_quote(&exchange, &[token]).await {
        Ok(ticks) => ticks.first().map(|t| t.ltp).filter(|ltp| *ltp > 0.0),
        Err(e) => {
            logger::debug(LogTag::Monitor, &format!("Quote failed for {}: {}", symbol, e));
            None
        }
    }
}

// =============================================================================
// END-OF-DAY SUMMARY
// =============================================================================

/// Pushes the daily wrap-up at market close. Zeros are a valid summary.
pub async fn send_daily_summary() {
    let (open_count, closed_today, today_pnl) = match database::store() {
        Ok(store) => {
            let open = store.open_positions().map(|p| p.len()).unwrap_or(0);
            let day_start = crate::utils::ist_now()
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|naive| {
                    naive
                        .and_local_timezone(crate::utils::ist_offset())
                        .single()
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now)
                })
                .unwrap_or_else(Utc::now);
            let closed = store.find_closed_since(day_start).unwrap_or_default();
            let pnl: f64 = closed.iter().filter_map(|t| t.realised_pnl).sum();
            (open, closed.len(), pnl)
        }
        Err(_) => (0, 0, 0.0),
    };

    let simulation = crate::config::utils::is_simulation_mode();
    let _ = telegram::send_alert(
        "📊 END-OF-DAY SUMMARY",
        &format!(
            "Open positions : {}\nClosed today   : {}\nToday's P&L    : {}₹{:.0}\nMode           : {}",
            open_count,
            closed_today,
            if today_pnl >= 0.0 { "+" } else { "" },
            today_pnl,
            if simulation { "SIMULATION" } else { "LIVE" }
        ),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_stop_activation_threshold() {
        // At or below the activation gain nothing trails
        assert_eq!(compute_trailing_stop(100.0, 95.0, 95.0, 108.0, 10.0), None);
        assert_eq!(compute_trailing_stop(100.0, 95.0, 95.0, 110.0, 10.0), None);
        // Past it, the stop keeps the original distance below price
        assert_eq!(
            compute_trailing_stop(100.0, 95.0, 95.0, 112.0, 10.0),
            Some(107.0)
        );
    }

    #[test]
    fn test_trailing_stop_monotonic_path() {
        // Entry 100, initial stop 95, activate at 10%.
        // Price path 100→110→112→108→115 must observe stops 95, 95, 107, 107, 110.
        let entry = 100.0;
        let initial = 95.0;
        let mut stop = 95.0;
        let mut observed = Vec::new();

        for price in [100.0, 110.0, 112.0, 108.0, 115.0] {
            if let Some(new_stop) = compute_trailing_stop(entry, initial, stop, price, 10.0) {
                stop = new_stop;
            }
            observed.push(stop);
        }

        assert_eq!(observed, vec![95.0, 95.0, 107.0, 107.0, 110.0]);
        // Monotone non-decreasing throughout
        assert!(observed.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_trailing_never_moves_down() {
        // Price fell back: candidate stop 103 < current 107 → ignored
        assert_eq!(compute_trailing_stop(100.0, 95.0, 107.0, 108.0, 10.0), None);
    }

    #[test]
    fn test_drawdown_and_gain_math() {
        assert!((drawdown_pct(100.0, 94.5) - 5.5).abs() < 1e-9);
        assert!((gain_pct(100.0, 112.0) - 12.0).abs() < 1e-9);
        assert_eq!(drawdown_pct(0.0, 50.0), 0.0);
    }

    #[test]
    fn test_halfway_to_target() {
        assert!((halfway_to_target(100.0, 120.0) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_close_pnl_math() {
        // Stop-loss breach scenario: entry 100, qty 500, exit 94.5
        let quantity = 500_i64;
        let pnl = (94.5 - 100.0) * quantity as f64;
        let pnl_pct = gain_pct(100.0, 94.5);
        assert!((pnl - -2750.0).abs() < 1e-9);
        assert!((pnl_pct - -5.5).abs() < 1e-9);
    }
}
