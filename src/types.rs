//! Core domain types shared across the pipeline

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

// =============================================================================
// MARKET DATA
// =============================================================================

/// One daily OHLCV candle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Per-symbol market snapshot built by the ingestion engine.
/// `bars` is ordered oldest→newest, roughly one year of daily candles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub symbol: String,
    pub exchange: String,
    pub ltp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub avg_volume_20d: f64,
    pub bars: Vec<OhlcvBar>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
    HighVolatility,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Bull => "BULL",
            MarketRegime::Bear => "BEAR",
            MarketRegime::Sideways => "SIDEWAYS",
            MarketRegime::HighVolatility => "HIGH_VOLATILITY",
        }
    }
}

/// Market-wide context, recomputed once per refresh.
/// FII flow fields are carried for scoring but never populated from a live
/// source; zero means "no information".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroSnapshot {
    pub date: NaiveDate,
    pub india_vix: f64,
    pub nifty_price: f64,
    pub nifty_dma200: f64,
    pub nifty_pct_above_dma200: f64,
    pub fii_net_flow_cr: f64,
    pub consecutive_fii_selling_days: u32,
    pub regime: MarketRegime,
    pub new_buys_suppressed: bool,
}

impl MacroSnapshot {
    /// Neutral default used when macro data cannot be fetched
    pub fn neutral() -> Self {
        Self {
            date: Utc::now().date_naive(),
            india_vix: 15.0,
            nifty_price: 22_000.0,
            nifty_dma200: 21_000.0,
            nifty_pct_above_dma200: 4.76,
            fii_net_flow_cr: 0.0,
            consecutive_fii_selling_days: 0,
            regime: MarketRegime::Sideways,
            new_buys_suppressed: false,
        }
    }
}

// =============================================================================
// SIGNALS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    Buy,
    Sell,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
        }
    }
}

/// Proposal lifecycle. Transitions form a DAG:
/// PENDING_APPROVAL → {APPROVED, REJECTED, EXPIRED}; APPROVED → {EXECUTED, FAILED}.
/// Nothing ever returns to PENDING_APPROVAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    PendingApproval,
    Approved,
    Rejected,
    Expired,
    Executed,
    Cancelled,
    Failed,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::PendingApproval => "PENDING_APPROVAL",
            SignalStatus::Approved => "APPROVED",
            SignalStatus::Rejected => "REJECTED",
            SignalStatus::Expired => "EXPIRED",
            SignalStatus::Executed => "EXECUTED",
            SignalStatus::Cancelled => "CANCELLED",
            SignalStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING_APPROVAL" => Some(SignalStatus::PendingApproval),
            "APPROVED" => Some(SignalStatus::Approved),
            "REJECTED" => Some(SignalStatus::Rejected),
            "EXPIRED" => Some(SignalStatus::Expired),
            "EXECUTED" => Some(SignalStatus::Executed),
            "CANCELLED" => Some(SignalStatus::Cancelled),
            "FAILED" => Some(SignalStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::High => "HIGH",
        }
    }
}

/// Weighted confidence score: four sub-scores in [0,100] plus the composite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub fundamental_score: f64,
    pub technical_score: f64,
    pub macro_score: f64,
    pub risk_reward_score: f64,
    pub composite: f64,

    pub fundamental_reason: String,
    pub technical_reason: String,
    pub macro_reason: String,
    pub risk_reward_reason: String,
}

impl ConfidenceScore {
    /// Computes the weighted composite. Call after all sub-scores are set.
    pub fn calculate(&mut self, weights: &crate::config::schemas::ConfidenceWeights) {
        self.composite = self.fundamental_score * weights.fundamental
            + self.technical_score * weights.technical
            + self.macro_score * weights.macro_regime
            + self.risk_reward_score * weights.risk_reward;
    }

    pub fn classification(&self) -> &'static str {
        if self.composite >= 85.0 {
            "HIGH CONVICTION"
        } else if self.composite >= 70.0 {
            "STRONG SIGNAL"
        } else if self.composite >= 60.0 {
            "MODERATE SIGNAL"
        } else if self.composite >= 40.0 {
            "WEAK SIGNAL"
        } else {
            "REJECT"
        }
    }

    pub fn breakdown(&self) -> String {
        format!(
            "F:{:.0}% T:{:.0}% M:{:.0}% RR:{:.0}%",
            self.fundamental_score,
            self.technical_score,
            self.macro_score,
            self.risk_reward_score
        )
    }
}

/// A fully-formed trade proposal awaiting approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeProposal {
    pub trade_id: String,
    pub symbol: String,
    pub exchange: String,
    pub signal_type: SignalType,

    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss_price: f64,
    pub risk_reward_ratio: f64,

    pub expected_holding_days: u32,
    pub risk_level: RiskLevel,
    pub confidence: ConfidenceScore,

    pub capital_allocation: f64,
    pub capital_allocation_pct: f64,
    pub post_trade_cash: f64,
    pub cash_buffer_safe: bool,

    pub sector: String,
    pub fundamental_summary: String,
    pub technical_summary: String,
    pub macro_context: String,
    pub worst_case: String,
    pub bull_case: String,
    pub invalidation_level: String,

    pub status: SignalStatus,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// RISK VALIDATION
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub passed: bool,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn pass(warnings: Vec<String>) -> Self {
        Self {
            passed: true,
            failures: Vec::new(),
            warnings,
        }
    }

    pub fn fail(failures: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            passed: false,
            failures,
            warnings,
        }
    }
}

// =============================================================================
// PERSISTED TRADE RECORD
// =============================================================================

/// One row of the trade_records table. A record with status EXECUTED and no
/// close time IS an open position; `stop_loss_price` is the current
/// (trailing) stop while `initial_stop_price` never changes after entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub symbol: String,
    pub exchange: String,
    pub sector: String,
    pub signal_type: String,
    pub status: String,

    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss_price: f64,
    pub initial_stop_price: f64,
    pub risk_reward_ratio: f64,
    pub capital_allocation: f64,

    pub confidence_score: f64,
    pub fundamental_score: f64,
    pub technical_score: f64,
    pub macro_score: f64,
    pub risk_reward_score: f64,

    pub generated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,

    pub exit_price: Option<f64>,
    pub realised_pnl: Option<f64>,
    pub realised_pnl_pct: Option<f64>,
    pub exit_reason: Option<String>,
    pub target_hit: bool,
    pub partial_alert_sent: bool,

    pub rejection_reason: Option<String>,
    pub broker_order_id: Option<String>,

    pub fundamental_summary: String,
    pub technical_summary: String,
    pub macro_context: String,
}

impl TradeRecord {
    /// Builds the initial record for a freshly-generated proposal.
    pub fn from_proposal(proposal: &TradeProposal) -> Self {
        Self {
            trade_id: proposal.trade_id.clone(),
            symbol: proposal.symbol.clone(),
            exchange: proposal.exchange.clone(),
            sector: proposal.sector.clone(),
            signal_type: proposal.signal_type.as_str().to_string(),
            status: proposal.status.as_str().to_string(),
            entry_price: proposal.entry_price,
            target_price: proposal.target_price,
            stop_loss_price: proposal.stop_loss_price,
            initial_stop_price: proposal.stop_loss_price,
            risk_reward_ratio: proposal.risk_reward_ratio,
            capital_allocation: proposal.capital_allocation,
            confidence_score: proposal.confidence.composite,
            fundamental_score: proposal.confidence.fundamental_score,
            technical_score: proposal.confidence.technical_score,
            macro_score: proposal.confidence.macro_score,
            risk_reward_score: proposal.confidence.risk_reward_score,
            generated_at: proposal.generated_at,
            expires_at: Some(proposal.expires_at),
            approved_at: None,
            executed_at: None,
            closed_at: None,
            exit_price: None,
            realised_pnl: None,
            realised_pnl_pct: None,
            exit_reason: None,
            target_hit: false,
            partial_alert_sent: false,
            rejection_reason: None,
            broker_order_id: None,
            fundamental_summary: crate::utils::truncate(&proposal.fundamental_summary, 500),
            technical_summary: crate::utils::truncate(&proposal.technical_summary, 500),
            macro_context: crate::utils::truncate(&proposal.macro_context, 300),
        }
    }

    /// Share count implied by the allocation at entry price
    pub fn quantity(&self) -> i64 {
        if self.entry_price > 0.0 {
            (self.capital_allocation / self.entry_price).floor() as i64
        } else {
            0
        }
    }
}

// =============================================================================
// TRADE ID GENERATION
// =============================================================================

/// Identifiers handed out so far in this process; guards uniqueness.
static ISSUED_TRADE_IDS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Generates a `TRD-` identifier with 12 uppercase hex chars, unique within
/// this process.
pub fn new_trade_id() -> String {
    let mut rng = rand::thread_rng();
    loop {
        let bytes: [u8; 6] = rng.gen();
        let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        let id = format!("TRD-{}", hex);
        let mut issued = match ISSUED_TRADE_IDS.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if issued.insert(id.clone()) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schemas::ConfidenceWeights;

    #[test]
    fn test_trade_id_format_and_uniqueness() {
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = new_trade_id();
            assert!(id.starts_with("TRD-"));
            let hex = &id[4..];
            assert_eq!(hex.len(), 12);
            assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_composite_is_exact_weighted_sum() {
        let mut score = ConfidenceScore {
            fundamental_score: 80.0,
            technical_score: 70.0,
            macro_score: 65.0,
            risk_reward_score: 100.0,
            ..Default::default()
        };
        score.calculate(&ConfidenceWeights::default());
        let expected = 80.0 * 0.35 + 70.0 * 0.30 + 65.0 * 0.20 + 100.0 * 0.15;
        assert!((score.composite - expected).abs() < 1e-9);
        assert!((score.composite - 77.0).abs() < 1e-9);
    }

    #[test]
    fn test_classification_bands() {
        let mut score = ConfidenceScore::default();
        score.composite = 90.0;
        assert_eq!(score.classification(), "HIGH CONVICTION");
        score.composite = 72.0;
        assert_eq!(score.classification(), "STRONG SIGNAL");
        score.composite = 61.0;
        assert_eq!(score.classification(), "MODERATE SIGNAL");
        score.composite = 45.0;
        assert_eq!(score.classification(), "WEAK SIGNAL");
        score.composite = 10.0;
        assert_eq!(score.classification(), "REJECT");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            SignalStatus::PendingApproval,
            SignalStatus::Approved,
            SignalStatus::Rejected,
            SignalStatus::Expired,
            SignalStatus::Executed,
            SignalStatus::Cancelled,
            SignalStatus::Failed,
        ] {
            assert_eq!(SignalStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(SignalStatus::from_str("NOPE"), None);
    }

    #[test]
    fn test_record_quantity_floor() {
        let mut record = sample_record();
        record.entry_price = 100.0;
        record.capital_allocation = 50_000.0;
        assert_eq!(record.quantity(), 500);
        record.capital_allocation = 99.0;
        assert_eq!(record.quantity(), 0);
        record.entry_price = 0.0;
        assert_eq!(record.quantity(), 0);
    }

    fn sample_record() -> TradeRecord {
        TradeRecord {
            trade_id: "TRD-AAAA11112222".to_string(),
            symbol: "RELIANCE".to_string(),
            exchange: "NSE".to_string(),
            sector: "Energy".to_string(),
            signal_type: "BUY".to_string(),
            status: "EXECUTED".to_string(),
            entry_price: 100.0,
            target_price: 120.0,
            stop_loss_price: 95.0,
            initial_stop_price: 95.0,
            risk_reward_ratio: 4.0,
            capital_allocation: 50_000.0,
            confidence_score: 77.0,
            fundamental_score: 80.0,
            technical_score: 70.0,
            macro_score: 65.0,
            risk_reward_score: 100.0,
            generated_at: Utc::now(),
            expires_at: None,
            approved_at: None,
            executed_at: None,
            closed_at: None,
            exit_price: None,
            realised_pnl: None,
            realised_pnl_pct: None,
            exit_reason: None,
            target_hit: false,
            partial_alert_sent: false,
            rejection_reason: None,
            broker_order_id: None,
            fundamental_summary: String::new(),
            technical_summary: String::new(),
            macro_context: String::new(),
        }
    }
}
