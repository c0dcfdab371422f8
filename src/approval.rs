//! Approval gateway
//!
//! Owns the pending-proposal map and drives the status machine:
//! PENDING_APPROVAL → APPROVED → EXECUTED/FAILED, or REJECTED/EXPIRED.
//! Removing a proposal from the map is the synchronization point: whoever
//! removes it drives the transition, so duplicate replies and concurrent
//! expiry sweeps cannot double-fire.

use crate::config::{self, with_config};
use crate::database;
use crate::execution;
use crate::logger::{self, LogTag};
use crate::telegram::{self, commands::OperatorCommand, report};
use crate::types::{SignalStatus, TradeProposal, TradeRecord, ValidationResult};
use chrono::Utc;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Pending proposals awaiting an operator decision, keyed by trade id
static PENDING: Lazy<RwLock<HashMap<String, TradeProposal>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Number of proposals currently awaiting approval
pub async fn pending_count() -> usize {
    PENDING.read().await.len()
}

/// Snapshot of the pending proposals (for the HTTP API)
pub async fn pending_proposals() -> Vec<TradeProposal> {
    PENDING.read().await.values().cloned().collect()
}

/// Test support: clears the pending map
pub async fn clear_pending() {
    PENDING.write().await.clear();
}

// =============================================================================
// SUBMISSION
// =============================================================================

/// Sends a proposal to the operator and parks it in the pending map.
/// A failed send discards the proposal: no retry, nothing recorded as
/// pending. Auto-mode conviction trades skip the wait entirely.
pub async fn submit(mut proposal: TradeProposal, validation: &ValidationResult) {
    let text = report::pre_trade_report(&proposal, validation);

    if let Err(e) = telegram::send_message(&text).await {
        logger::warning(
            LogTag::Approval,
            &format!(
                "Could not send report for {} ({}), signal discarded",
                proposal.trade_id, e
            ),
        );
        return;
    }

    proposal.status = SignalStatus::PendingApproval;
    let record = TradeRecord::from_proposal(&proposal);
    if let Ok(store) = database::store() {
        if let Err(e) = store.upsert(&record) {
            logger::error(LogTag::Approval, &format!("Failed to persist {}: {}", proposal.trade_id, e));
        }
    }

    let (auto_mode, auto_threshold) =
        with_config(|c| (c.execution.auto_mode, c.signal.auto_execute_threshold));
    if auto_mode && proposal.confidence.composite >= auto_threshold {
        logger::info(
            LogTag::Approval,
            &format!(
                "Auto-executing high-conviction signal {} (score {:.0}%)",
                proposal.trade_id, proposal.confidence.composite
            ),
        );
        approve_proposal(proposal).await;
        return;
    }

    logger::info(
        LogTag::Approval,
        &format!(
            "Signal {} submitted for approval, expires at {}",
            proposal.trade_id,
            crate::utils::to_ist(proposal.expires_at).format("%d-%b-%Y %H:%M")
        ),
    );
    PENDING
        .write()
        .await
        .insert(proposal.trade_id.clone(), proposal);
}

// =============================================================================
// OPERATOR REPLIES
// =============================================================================

/// Entry point for every text message arriving from the chat channel
pub async fn on_operator_message(text: &str) {
    match telegram::parse_command(text) {
        Some(OperatorCommand::Approve(trade_id)) => handle_approval(&trade_id).await,
        Some(OperatorCommand::Reject(trade_id, reason)) => {
            handle_rejection(&trade_id, &reason).await
        }
        Some(OperatorCommand::Status) => {
            let _ = telegram::send_message(&build_status_message().await).await;
        }
        Some(OperatorCommand::Positions) => {
            let positions = database::store()
                .and_then(|s| s.open_positions())
                .unwrap_or_default();
            let _ = telegram::send_message(&report::positions_message(&positions)).await;
        }
        None => {}
    }
}

async fn handle_approval(trade_id: &str) {
    // Remove-or-nothing: a duplicate APPROVE finds the map empty
    let proposal = PENDING.write().await.remove(trade_id);
    let Some(proposal) = proposal else {
        let _ = telegram::send_message(&format!(
            "❓ Unknown or already processed trade ID: {}",
            trade_id
        ))
        .await;
        return;
    };

    logger::success(LogTag::Approval, &format!("Signal {} APPROVED by operator", trade_id));
    approve_proposal(proposal).await;
}

/// Shared APPROVED transition used by both operator replies and auto-mode
async fn approve_proposal(mut proposal: TradeProposal) {
    proposal.status = SignalStatus::Approved;
    if let Ok(store) = database::store() {
        let _ = store.set_status(&proposal.trade_id, "APPROVED");
    }

    if config::utils::is_simulation_mode() {
        execution::execute_paper(&proposal).await;
    } else {
        // Live execution runs in its own task so the reply loop never blocks
        tokio::spawn(async move {
            execution::execute(proposal).await;
        });
    }
}

async fn handle_rejection(trade_id: &str, reason: &str) {
    let proposal = PENDING.write().await.remove(trade_id);
    let Some(proposal) = proposal else {
        let _ = telegram::send_message(&format!(
            "❓ Unknown or already processed trade ID: {}",
            trade_id
        ))
        .await;
        return;
    };

    logger::info(
        LogTag::Approval,
        &format!("Signal {} REJECTED by operator: {}", trade_id, reason),
    );
    if let Ok(store) = database::store() {
        let _ = store.set_rejection(&proposal.trade_id, reason);
    }
    let _ = telegram::send_message(&report::rejection_ack(trade_id, reason)).await;
}

// =============================================================================
// EXPIRY SWEEP
// =============================================================================

/// Expires every pending proposal whose window has closed. Runs under the
/// same write lock as reply handling, so a reply arriving mid-sweep either
/// wins the removal or sees "unknown".
pub async fn expire_timed_out() {
    let now = Utc::now();
    let expired: Vec<TradeProposal> = {
        let mut pending = PENDING.write().await;
        let expired_ids: Vec<String> = pending
            .values()
            .filter(|p| p.expires_at < now)
            .map(|p| p.trade_id.clone())
            .collect();
        expired_ids
            .iter()
            .filter_map(|id| pending.remove(id))
            .collect()
    };

    for proposal in expired {
        logger::info(
            LogTag::Approval,
            &format!("Signal {} expired with no response", proposal.trade_id),
        );
        if let Ok(store) = database::store() {
            let _ = store.set_status(&proposal.trade_id, "EXPIRED");
        }
        let _ = telegram::send_message(&report::expiry_notice(&proposal.trade_id)).await;
    }
}

// =============================================================================
// STATUS REPLY
// =============================================================================

async fn build_status_message() -> String {
    let (auto_mode, simulation) = with_config(|c| (c.execution.auto_mode, c.simulation.enabled));
    let simulation = simulation || crate::arguments::is_paper_forced();
    format!(
        "<b>🤖 Agent Status</b>\n\
         Mode      : {}\n\
         Pending   : {} signals awaiting approval\n\
         Auto-mode : {}",
        if simulation { "📄 SIMULATION" } else { "💰 LIVE" },
        pending_count().await,
        if auto_mode { "ENABLED" } else { "DISABLED" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceScore, RiskLevel, SignalType};
    use chrono::Duration;

    fn sample_proposal(trade_id: &str, expires_in_minutes: i64) -> TradeProposal {
        TradeProposal {
            trade_id: trade_id.to_string(),
            symbol: "RELIANCE".to_string(),
            exchange: "NSE".to_string(),
            signal_type: SignalType::Buy,
            entry_price: 100.0,
            target_price: 120.0,
            stop_loss_price: 95.0,
            risk_reward_ratio: 4.0,
            expected_holding_days: 30,
            risk_level: RiskLevel::Low,
            confidence: ConfidenceScore::default(),
            capital_allocation: 50_000.0,
            capital_allocation_pct: 10.0,
            post_trade_cash: 350_000.0,
            cash_buffer_safe: true,
            sector: "Energy".to_string(),
            fundamental_summary: String::new(),
            technical_summary: String::new(),
            macro_context: String::new(),
            worst_case: String::new(),
            bull_case: String::new(),
            invalidation_level: String::new(),
            status: SignalStatus::PendingApproval,
            generated_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(expires_in_minutes),
        }
    }

    #[tokio::test]
    async fn test_remove_once_semantics() {
        clear_pending().await;
        let proposal = sample_proposal("TRD-AAAA00000001", 30);
        PENDING
            .write()
            .await
            .insert(proposal.trade_id.clone(), proposal);

        let first = PENDING.write().await.remove("TRD-AAAA00000001");
        assert!(first.is_some());
        let second = PENDING.write().await.remove("TRD-AAAA00000001");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_expiry_sweep_removes_only_expired() {
        clear_pending().await;
        let expired = sample_proposal("TRD-BBBB00000001", -5);
        let alive = sample_proposal("TRD-BBBB00000002", 30);
        {
            let mut pending = PENDING.write().await;
            pending.insert(expired.trade_id.clone(), expired);
            pending.insert(alive.trade_id.clone(), alive);
        }

        expire_timed_out().await;

        let pending = PENDING.read().await;
        assert!(!pending.contains_key("TRD-BBBB00000001"));
        assert!(pending.contains_key("TRD-BBBB00000002"));
    }
}
