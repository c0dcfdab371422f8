//! Execution engine
//!
//! Places LIMIT orders after approval and handles the follow-ups: broker
//! rejections become FAILED, acceptances become EXECUTED with a fill-timeout
//! probe. MARKET orders never exist here; simulation mode produces synthetic
//! fills without touching the network.

use crate::broker::{self, broker};
use crate::database;
use crate::logger::{self, LogTag};
use crate::telegram::{self, report};
use crate::types::TradeProposal;
use chrono::Utc;
use std::time::Duration;

/// Places the buy order for an approved proposal (live mode).
pub async fn execute(proposal: TradeProposal) {
    logger::info(
        LogTag::Execution,
        &format!(
            "Executing {}: BUY {} @ ₹{:.2}",
            proposal.trade_id, proposal.symbol, proposal.entry_price
        ),
    );

    let quantity = compute_quantity(proposal.capital_allocation, proposal.entry_price);
    if quantity <= 0 {
        logger::error(
            LogTag::Execution,
            &format!("Computed quantity is 0 for {}, abandoning order", proposal.trade_id),
        );
        mark_failed(&proposal.trade_id).await;
        let _ = telegram::send_message(&format!(
            "❌ Order failed: quantity computed as 0 for {}",
            proposal.symbol
        ))
        .await;
        return;
    }

    let Some((token, exchange)) = broker::resolve_token_any(&proposal.symbol).await else {
        logger::error(
            LogTag::Execution,
            &format!("No instrument token for {}, abandoning order", proposal.symbol),
        );
        mark_failed(&proposal.trade_id).await;
        let _ = telegram::send_message(&format!(
            "❌ Order failed: no instrument token for {}",
            proposal.symbol
        ))
        .await;
        return;
    };

    let order_id = broker()
        .place_order(
            &token,
            &exchange,
            &proposal.symbol,
            "BUY",
            quantity,
            proposal.entry_price,
        )
        .await;

    let Some(order_id) = order_id else {
        mark_failed(&proposal.trade_id).await;
        let _ = telegram::send_message(&format!(
            "❌ Order placement FAILED for {} — broker rejected the order",
            proposal.symbol
        ))
        .await;
        return;
    };

    mark_executed(&proposal.trade_id, &order_id).await;
    let _ = telegram::send_message(&report::execution_confirmation(
        &proposal, &order_id, quantity,
    ))
    .await;

    schedule_fill_timeout_probe(proposal, order_id);
}

/// Simulation-mode fill: no network call, synthetic broker id.
pub async fn execute_paper(proposal: &TradeProposal) {
    let paper_id = format!("PAPER-{}", Utc::now().timestamp_millis());
    logger::info(
        LogTag::Execution,
        &format!("[PAPER] Simulated fill for {} as {}", proposal.trade_id, paper_id),
    );
    mark_executed(&proposal.trade_id, &paper_id).await;
    let _ = telegram::send_message(&report::paper_fill_notice(proposal, &paper_id)).await;
}

/// Places a LIMIT sell (stop-loss hits, drawdown exits, profit booking).
/// Returns the broker order id, or None when the order could not be placed.
pub async fn place_sell(
    symbol: &str,
    exchange: &str,
    quantity: i64,
    price: f64,
    reason: &str,
) -> Option<String> {
    if crate::config::utils::is_simulation_mode() {
        let paper_id = format!("PAPER-{}", Utc::now().timestamp_millis());
        logger::info(
            LogTag::Execution,
            &format!("[PAPER] Simulated sell: {} {} @ ₹{:.2} ({})", quantity, symbol, price, reason),
        );
        let _ = telegram::send_message(&format!(
            "📄 <b>PAPER SELL EXECUTED</b>\n{} @ ₹{:.2} × {}\nReason: {}",
            symbol, price, quantity, reason
        ))
        .await;
        return Some(paper_id);
    }

    let Some((token, sell_exchange)) = broker::resolve_token_any(symbol).await else {
        logger::error(LogTag::Execution, &format!("No instrument token for {}", symbol));
        return None;
    };
    let exchange = if exchange.is_empty() {
        sell_exchange
    } else {
        exchange.to_string()
    };

    let order_id = broker()
        .place_order(&token, &exchange, symbol, "SELL", quantity, price)
        .await;

    match &order_id {
        Some(order_id) => {
            let _ = telegram::send_message(&format!(
                "📤 <b>SELL ORDER PLACED</b>\n{} @ ₹{:.2} × {}\nReason: {}\nOrder ID: {}",
                symbol, price, quantity, reason, order_id
            ))
            .await;
        }
        None => {
            let _ = telegram::send_alert(
                "⚠️ SELL ORDER FAILED",
                &format!("{} @ ₹{:.2} — {}", symbol, price, reason),
            )
            .await;
        }
    }
    order_id
}

/// Shares bought for a given allocation at the limit price
pub fn compute_quantity(capital_allocation: f64, entry_price: f64) -> i64 {
    if entry_price > 0.0 {
        (capital_allocation / entry_price).floor() as i64
    } else {
        0
    }
}

// =============================================================================
// FILL-TIMEOUT PROBE
// =============================================================================

/// After `order_fill_timeout_minutes`, remind the operator to verify the
/// fill manually. The agent does not cancel unfilled orders on its own.
fn schedule_fill_timeout_probe(proposal: TradeProposal, order_id: String) {
    let timeout_minutes = crate::config::with_config(|c| c.execution.order_fill_timeout_minutes);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_minutes * 60)).await;
        logger::info(
            LogTag::Execution,
            &format!(
                "Fill-timeout probe for {} (order {})",
                proposal.trade_id, order_id
            ),
        );
        let _ = telegram::send_message(&report::fill_timeout_reminder(
            &proposal.trade_id,
            &proposal.symbol,
            &order_id,
        ))
        .await;
    });
}

// =============================================================================
// STATUS HELPERS
// =============================================================================

async fn mark_executed(trade_id: &str, order_id: &str) {
    if let Ok(store) = database::store() {
        let _ = store.set_status(trade_id, "EXECUTED");
        let _ = store.set_broker_order_id(trade_id, order_id);
    }
}

async fn mark_failed(trade_id: &str) {
    if let Ok(store) = database::store() {
        let _ = store.set_status(trade_id, "FAILED");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_floor() {
        assert_eq!(compute_quantity(50_000.0, 100.0), 500);
        assert_eq!(compute_quantity(50_000.0, 333.0), 150);
        assert_eq!(compute_quantity(99.0, 100.0), 0);
        assert_eq!(compute_quantity(50_000.0, 0.0), 0);
    }
}
