//! Operator-facing message templates
//!
//! The pre-trade report is the mandatory human-readable contract: no trade
//! is executed without this text having been sent and approved.

use crate::types::{TradeProposal, TradeRecord, ValidationResult};
use crate::utils::to_ist;

const DIVIDER: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const TIME_FMT: &str = "%d-%b-%Y %H:%M";

/// Full pre-trade analysis report for a proposal
pub fn pre_trade_report(proposal: &TradeProposal, validation: &ValidationResult) -> String {
    let generated = to_ist(proposal.generated_at).format(TIME_FMT);
    let expires = to_ist(proposal.expires_at).format(TIME_FMT);
    let confidence = &proposal.confidence;

    let mut report = String::new();
    report.push_str(&format!("📊 PRE-TRADE ANALYSIS REPORT — {}\n", generated));
    report.push_str(DIVIDER);
    report.push('\n');
    report.push_str(&format!("TRADE ID          :  {}\n", proposal.trade_id));
    report.push_str(&format!(
        "ASSET NAME        :  {} ({}: {})\n",
        proposal.symbol, proposal.exchange, proposal.symbol
    ));
    report.push_str(&format!(
        "SIGNAL TYPE       :  {}\n",
        proposal.signal_type.as_str()
    ));
    report.push_str(DIVIDER);
    report.push('\n');
    report.push_str(&format!(
        "BUY PRICE         :  ₹{:.2}  (Limit order)\n",
        proposal.entry_price
    ));
    report.push_str(&format!(
        "TARGET PRICE      :  ₹{:.2}\n",
        proposal.target_price
    ));
    report.push_str(&format!(
        "STOP-LOSS PRICE   :  ₹{:.2}   (NEVER moved down)\n",
        proposal.stop_loss_price
    ));
    report.push_str(&format!(
        "RISK-REWARD RATIO :  1 : {:.1}\n",
        proposal.risk_reward_ratio
    ));
    report.push_str(&format!(
        "CONFIDENCE SCORE  :  {:.0}%  [{}]\n",
        confidence.composite,
        confidence.breakdown()
    ));
    report.push_str(DIVIDER);
    report.push('\n');
    report.push_str(&format!(
        "CAPITAL ALLOC     :  ₹{:.0}  ({:.1}% of portfolio)\n",
        proposal.capital_allocation, proposal.capital_allocation_pct
    ));
    report.push_str(DIVIDER);
    report.push('\n');

    if !validation.warnings.is_empty() {
        report.push_str("⚠️ RISK WARNINGS:\n");
        for warning in &validation.warnings {
            report.push_str(&format!("   • {}\n", warning));
        }
        report.push_str(DIVIDER);
        report.push('\n');
    }

    report.push_str(&format!(
        "📲 Reply: APPROVE {}  or  REJECT {} [reason]\n",
        proposal.trade_id, proposal.trade_id
    ));
    report.push_str(&format!("⏰ Signal expires at: {}\n", expires));
    report
}

/// Confirmation pushed after the broker accepts an order
pub fn execution_confirmation(proposal: &TradeProposal, broker_order_id: &str, quantity: i64) -> String {
    format!(
        "✅ <b>ORDER PLACED</b>\n\
         Trade ID  : {}\n\
         Symbol    : {} @ ₹{:.2}\n\
         Qty       : {} shares\n\
         Stop-loss : ₹{:.2}\n\
         Target    : ₹{:.2}\n\
         Order ID  : {}",
        proposal.trade_id,
        proposal.symbol,
        proposal.entry_price,
        quantity,
        proposal.stop_loss_price,
        proposal.target_price,
        broker_order_id
    )
}

/// Simulated-fill notice for paper mode
pub fn paper_fill_notice(proposal: &TradeProposal, paper_order_id: &str) -> String {
    format!(
        "📄 <b>PAPER TRADE EXECUTED</b>\n\
         Trade ID : {}\n\
         Symbol   : {} @ ₹{:.2}\n\
         Order ID : {}\n\
         No real order placed (simulation mode).",
        proposal.trade_id, proposal.symbol, proposal.entry_price, paper_order_id
    )
}

/// Acknowledgement after an operator rejection
pub fn rejection_ack(trade_id: &str, reason: &str) -> String {
    format!(
        "❌ <b>SIGNAL REJECTED</b>\n\
         Trade ID: {}\n\
         Reason: {}\n\
         Signal archived for the learning review.",
        trade_id, reason
    )
}

/// Expiry notice for a proposal nobody answered
pub fn expiry_notice(trade_id: &str) -> String {
    format!(
        "⏰ <b>SIGNAL EXPIRED</b>\n\
         Trade ID: {}\n\
         No response received — signal auto-expired. No trade placed.",
        trade_id
    )
}

/// Fill-timeout reminder; the agent never cancels automatically
pub fn fill_timeout_reminder(trade_id: &str, symbol: &str, broker_order_id: &str) -> String {
    format!(
        "⏰ <b>ORDER TIMEOUT CHECK</b>\n\
         Trade ID  : {}\n\
         Symbol    : {}\n\
         Order ID  : {}\n\
         Action    : Please verify the fill. If unfilled, cancel manually.",
        trade_id, symbol, broker_order_id
    )
}

/// One line per open position, for the POSITIONS reply
pub fn positions_message(open_positions: &[TradeRecord]) -> String {
    if open_positions.is_empty() {
        return "📊 No open positions.".to_string();
    }
    let mut message = String::from("<b>📊 Open Positions</b>\n");
    for position in open_positions {
        message.push_str(&format!(
            "• {} — Entry: ₹{:.2} | SL: ₹{:.2} | Target: ₹{:.2}\n",
            position.symbol, position.entry_price, position.stop_loss_price, position.target_price
        ));
    }
    message
}
