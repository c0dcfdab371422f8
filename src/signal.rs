//! Signal generator
//!
//! Fans out analysis across every cached snapshot, combines the sub-scores
//! into the weighted composite, derives entry/stop/target levels and emits
//! proposals above the confidence threshold. An empty set is a normal
//! outcome.

use crate::analysis::{fundamental, macro_context, technical, MacroResult, TechnicalResult};
use crate::config::with_config;
use crate::ingestion;
use crate::logger::{self, LogTag};
use crate::types::{
    new_trade_id, ConfidenceScore, RiskLevel, SignalStatus, SignalType, StockSnapshot,
    TradeProposal,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Concurrent per-symbol analysis tasks
const ANALYSIS_CONCURRENCY: usize = 10;

/// Runs the full pipeline over the analysis universe and returns proposals
/// above `min_confidence_to_notify`.
pub async fn generate_signals() -> Vec<TradeProposal> {
    logger::info(LogTag::Signal, "Starting analysis across the equity universe");

    let macro_snapshot = ingestion::macro_snapshot().await;
    let macro_result = with_config(|c| macro_context::analyse(&macro_snapshot, &c.macro_thresholds));

    // Suppressed macro skips all per-symbol work
    if macro_result.new_buys_suppressed {
        logger::warning(
            LogTag::Signal,
            &format!("New buys suppressed by macro conditions: {}", macro_result.summary),
        );
        return Vec::new();
    }

    let snapshots = ingestion::all_equity_snapshots().await;
    if snapshots.is_empty() {
        logger::warning(LogTag::Signal, "Snapshot store is empty, nothing to analyse");
        return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(ANALYSIS_CONCURRENCY));
    let macro_result = Arc::new(macro_result);
    let mut handles = Vec::new();

    for snapshot in snapshots {
        let semaphore = semaphore.clone();
        let macro_result = macro_result.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            analyse_stock(&snapshot, &macro_result).await
        }));
    }

    let mut signals = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Some(signal)) => signals.push(signal),
            Ok(None) => {}
            Err(e) => logger::error(LogTag::Signal, &format!("Analysis task failed: {}", e)),
        }
    }

    let threshold = with_config(|c| c.signal.min_confidence_to_notify);
    logger::info(
        LogTag::Signal,
        &format!("Generated {} signals above threshold {:.0}%", signals.len(), threshold),
    );
    signals
}

/// Full analysis for one snapshot. Returns None when disqualified or below
/// the confidence threshold.
async fn analyse_stock(
    snapshot: &StockSnapshot,
    macro_result: &MacroResult,
) -> Option<TradeProposal> {
    let symbol = snapshot.symbol.clone();

    let fundamental_cfg = with_config(|c| c.fundamental.clone());
    let technical_cfg = with_config(|c| c.technical.clone());

    // Fundamental fetch and technical math run concurrently
    let (fundamental_result, technical_result) = tokio::join!(
        fundamental::analyse(&symbol, &fundamental_cfg),
        async { technical::analyse(snapshot, &technical_cfg) }
    );

    // Hard fundamental disqualifier
    if fundamental_result.score == 0.0 {
        logger::debug(LogTag::Signal, &format!("{} disqualified by fundamentals", symbol));
        return None;
    }

    let entry_price = snapshot.ltp;
    if entry_price <= 0.0 {
        return None;
    }

    let (min_sl_pct, max_sl_pct) =
        with_config(|c| (c.risk.min_stop_loss_pct, c.risk.max_stop_loss_pct));
    let stop_loss = compute_stop_loss(
        entry_price,
        technical_result.support_level,
        min_sl_pct,
        max_sl_pct,
    );
    let target = compute_target(entry_price, technical_result.resistance_level);
    let rr_ratio = compute_risk_reward(entry_price, stop_loss, target);
    let rr_score = score_risk_reward(rr_ratio);

    let mut confidence = ConfidenceScore {
        fundamental_score: fundamental_result.score,
        technical_score: technical_result.score,
        macro_score: (macro_result.score - macro_result.confidence_penalty).max(0.0),
        risk_reward_score: rr_score,
        fundamental_reason: fundamental_result.summary.clone(),
        technical_reason: technical_result.summary.clone(),
        macro_reason: macro_result.summary.clone(),
        risk_reward_reason: format!("R:R = 1:{:.1}", rr_ratio),
        composite: 0.0,
    };
    with_config(|c| confidence.calculate(&c.confidence_weights));

    let min_confidence = with_config(|c| c.signal.min_confidence_to_notify);
    if confidence.composite < min_confidence {
        logger::debug(
            LogTag::Signal,
            &format!("{} below threshold: {:.1}", symbol, confidence.composite),
        );
        return None;
    }

    // Capital allocation against the live portfolio value
    let portfolio_value = crate::portfolio::portfolio_value();
    let (allocation_pct, buffer_pct, approval_window) = with_config(|c| {
        (
            c.position_sizing.max_single_stock_pct,
            c.portfolio.emergency_cash_buffer_pct,
            c.signal.approval_window_minutes,
        )
    });
    let allocation = portfolio_value * allocation_pct / 100.0;
    let post_trade_cash = portfolio_value * (1.0 - buffer_pct / 100.0) - allocation;
    let cash_buffer_safe = post_trade_cash >= 0.0;

    let now = Utc::now();
    Some(TradeProposal {
        trade_id: new_trade_id(),
        symbol: symbol.clone(),
        exchange: snapshot.exchange.clone(),
        signal_type: SignalType::Buy,
        entry_price,
        target_price: target,
        stop_loss_price: stop_loss,
        risk_reward_ratio: rr_ratio,
        expected_holding_days: estimate_holding_days(rr_ratio),
        risk_level: classify_risk(confidence.composite, rr_ratio),
        capital_allocation: allocation,
        capital_allocation_pct: allocation_pct,
        post_trade_cash,
        cash_buffer_safe,
        sector: fundamental_result.data.sector.clone(),
        fundamental_summary: fundamental_result.summary,
        technical_summary: technical_result.summary,
        macro_context: macro_result.summary.clone(),
        worst_case: build_worst_case(allocation, entry_price, stop_loss),
        bull_case: build_bull_case(allocation, entry_price, target),
        invalidation_level: format!("Price closes below ₹{:.2}", stop_loss),
        confidence,
        status: SignalStatus::PendingApproval,
        generated_at: now,
        expires_at: now + Duration::minutes(approval_window),
    })
}

// =============================================================================
// PRICE LEVELS
// =============================================================================

/// Stop 1% below support, clamped into the configured stop-loss band.
/// Falls back to the tightest allowed stop when no support level exists.
pub fn compute_stop_loss(entry: f64, support: f64, min_sl_pct: f64, max_sl_pct: f64) -> f64 {
    let from_support = if support > 0.0 {
        support * 0.99
    } else {
        entry * (1.0 - min_sl_pct / 100.0)
    };
    let lowest = entry * (1.0 - max_sl_pct / 100.0);
    let highest = entry * (1.0 - min_sl_pct / 100.0);
    from_support.max(lowest).min(highest)
}

/// Next meaningful resistance, or a default 10% move when none is clear
pub fn compute_target(entry: f64, resistance: f64) -> f64 {
    if resistance > entry * 1.03 {
        resistance
    } else {
        entry * 1.10
    }
}

pub fn compute_risk_reward(entry: f64, stop_loss: f64, target: f64) -> f64 {
    let risk = entry - stop_loss;
    if risk <= 0.0 {
        return 0.0;
    }
    (target - entry) / risk
}

pub fn score_risk_reward(rr_ratio: f64) -> f64 {
    if rr_ratio >= 3.0 {
        100.0
    } else if rr_ratio >= 2.5 {
        85.0
    } else if rr_ratio >= 2.0 {
        70.0
    } else if rr_ratio >= 1.5 {
        40.0
    } else {
        0.0
    }
}

fn estimate_holding_days(rr_ratio: f64) -> u32 {
    if rr_ratio >= 2.5 {
        30
    } else if rr_ratio >= 2.0 {
        20
    } else {
        15
    }
}

fn classify_risk(composite: f64, rr_ratio: f64) -> RiskLevel {
    if composite >= 75.0 && rr_ratio >= 2.5 {
        RiskLevel::Low
    } else if composite >= 60.0 && rr_ratio >= 2.0 {
        RiskLevel::Moderate
    } else {
        RiskLevel::High
    }
}

fn build_worst_case(capital: f64, entry: f64, stop_loss: f64) -> String {
    let loss = capital * (entry - stop_loss).abs() / entry;
    let loss_pct = loss / capital * 100.0;
    format!(
        "If stop-loss hit: loss of ₹{:.0} ({:.1}% of allocated capital)",
        loss, loss_pct
    )
}

fn build_bull_case(capital: f64, entry: f64, target: f64) -> String {
    let gain = capital * (target - entry).abs() / entry;
    let gain_pct = gain / capital * 100.0;
    format!("If target hit: gain of ₹{:.0} ({:.1}% return on trade)", gain, gain_pct)
}

// =============================================================================
// ON-DEMAND SINGLE-SYMBOL ANALYSIS
// =============================================================================

/// Full analysis bundle for one symbol, served by the HTTP API with no
/// confidence filtering applied.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisBundle {
    pub symbol: String,
    pub company_name: String,
    pub exchange: String,

    pub ltp: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,

    pub sma200: f64,
    pub sma50: f64,
    pub sma20: f64,
    pub rsi: f64,
    pub support_level: f64,
    pub resistance_level: f64,
    pub golden_cross: bool,
    pub death_cross: bool,
    pub volume_confirmed: bool,
    pub technical_score: f64,
    pub technical_summary: String,

    pub roe: f64,
    pub roce: f64,
    pub debt_to_equity: f64,
    pub pe_ratio: f64,
    pub peg_ratio: f64,
    pub promoter_holding_pct: f64,
    pub sector: String,
    pub fundamental_score: f64,
    pub fundamental_summary: String,

    pub india_vix: f64,
    pub nifty_price: f64,
    pub nifty_dma200: f64,
    pub market_regime: String,
    pub macro_score: f64,
    pub macro_summary: String,

    pub composite_score: f64,
    pub suggested_entry: f64,
    pub suggested_target: f64,
    pub suggested_stop_loss: f64,
    pub risk_reward: f64,
    pub rr_score: f64,

    pub verdict: String,
    pub analysed_at: chrono::DateTime<Utc>,
    pub error_message: Option<String>,
}

impl AnalysisBundle {
    fn error(symbol: &str, message: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            company_name: symbol.to_string(),
            exchange: "NSE".to_string(),
            ltp: 0.0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0,
            sma200: 0.0,
            sma50: 0.0,
            sma20: 0.0,
            rsi: 50.0,
            support_level: 0.0,
            resistance_level: 0.0,
            golden_cross: false,
            death_cross: false,
            volume_confirmed: false,
            technical_score: 0.0,
            technical_summary: String::new(),
            roe: 0.0,
            roce: 0.0,
            debt_to_equity: 0.0,
            pe_ratio: 0.0,
            peg_ratio: 0.0,
            promoter_holding_pct: 0.0,
            sector: "Unknown".to_string(),
            fundamental_score: 0.0,
            fundamental_summary: String::new(),
            india_vix: 0.0,
            nifty_price: 0.0,
            nifty_dma200: 0.0,
            market_regime: "UNKNOWN".to_string(),
            macro_score: 0.0,
            macro_summary: String::new(),
            composite_score: 0.0,
            suggested_entry: 0.0,
            suggested_target: 0.0,
            suggested_stop_loss: 0.0,
            risk_reward: 0.0,
            rr_score: 0.0,
            verdict: "ERROR".to_string(),
            analysed_at: Utc::now(),
            error_message: Some(message),
        }
    }
}

/// Runs the whole pipeline for one symbol on demand, always fetching fresh
/// market data.
pub async fn analyse_symbol(raw_symbol: &str) -> AnalysisBundle {
    let symbol = raw_symbol.trim().to_uppercase();
    logger::info(LogTag::Signal, &format!("On-demand analysis requested for {}", symbol));

    let Some(snapshot) = ingestion::fetch_snapshot_fresh(&symbol).await else {
        return AnalysisBundle::error(
            &symbol,
            format!(
                "Could not fetch market data for {}. Verify it is a valid NSE symbol.",
                symbol
            ),
        );
    };
    if snapshot.ltp <= 0.0 {
        return AnalysisBundle::error(&symbol, format!("No traded price available for {}", symbol));
    }

    let macro_snapshot = ingestion::macro_snapshot().await;
    let macro_result = with_config(|c| macro_context::analyse(&macro_snapshot, &c.macro_thresholds));

    let fundamental_cfg = with_config(|c| c.fundamental.clone());
    let technical_cfg = with_config(|c| c.technical.clone());
    let (fundamental_result, technical_result): (fundamental::FundamentalResult, TechnicalResult) = tokio::join!(
        fundamental::analyse(&symbol, &fundamental_cfg),
        async { technical::analyse(&snapshot, &technical_cfg) }
    );

    let entry = snapshot.ltp;
    let (min_sl_pct, max_sl_pct) =
        with_config(|c| (c.risk.min_stop_loss_pct, c.risk.max_stop_loss_pct));
    let stop_loss = compute_stop_loss(entry, technical_result.support_level, min_sl_pct, max_sl_pct);
    let target = compute_target(entry, technical_result.resistance_level);
    let rr = compute_risk_reward(entry, stop_loss, target);
    let rr_score = score_risk_reward(rr);

    let macro_score = (macro_result.score - macro_result.confidence_penalty).max(0.0);
    let composite = with_config(|c| {
        fundamental_result.score * c.confidence_weights.fundamental
            + technical_result.score * c.confidence_weights.technical
            + macro_score * c.confidence_weights.macro_regime
            + rr_score * c.confidence_weights.risk_reward
    })
    .clamp(0.0, 100.0);

    AnalysisBundle {
        company_name: crate::broker::instrument_name(&symbol, &snapshot.exchange).await,
        symbol: symbol.clone(),
        exchange: snapshot.exchange.clone(),
        ltp: snapshot.ltp,
        open: snapshot.open,
        high: snapshot.high,
        low: snapshot.low,
        close: snapshot.close,
        volume: snapshot.volume,
        sma200: technical_result.sma200,
        sma50: technical_result.sma50,
        sma20: technical_result.sma20,
        rsi: technical_result.rsi,
        support_level: technical_result.support_level,
        resistance_level: technical_result.resistance_level,
        golden_cross: technical_result.golden_cross,
        death_cross: technical_result.death_cross,
        volume_confirmed: technical_result.volume_confirmed,
        technical_score: technical_result.score,
        technical_summary: technical_result.summary,
        roe: fundamental_result.data.roe,
        roce: fundamental_result.data.roce,
        debt_to_equity: fundamental_result.data.debt_to_equity,
        pe_ratio: fundamental_result.data.pe_ratio,
        peg_ratio: fundamental_result.data.peg_ratio,
        promoter_holding_pct: fundamental_result.data.promoter_holding_pct,
        sector: fundamental_result.data.sector.clone(),
        fundamental_score: fundamental_result.score,
        fundamental_summary: fundamental_result.summary,
        india_vix: macro_snapshot.india_vix,
        nifty_price: macro_snapshot.nifty_price,
        nifty_dma200: macro_snapshot.nifty_dma200,
        market_regime: macro_snapshot.regime.as_str().to_string(),
        macro_score,
        macro_summary: macro_result.summary,
        composite_score: composite,
        suggested_entry: entry,
        suggested_target: target,
        suggested_stop_loss: stop_loss,
        risk_reward: rr,
        rr_score,
        verdict: derive_verdict(composite).to_string(),
        analysed_at: Utc::now(),
        error_message: None,
    }
}

fn derive_verdict(composite: f64) -> &'static str {
    if composite >= 80.0 {
        "STRONG BUY"
    } else if composite >= 65.0 {
        "BUY"
    } else if composite >= 50.0 {
        "HOLD"
    } else {
        "AVOID"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_loss_from_support_within_band() {
        // entry 100, support 95 → 94.05 within the [85, 97] band
        let stop = compute_stop_loss(100.0, 95.0, 3.0, 15.0);
        assert!((stop - 94.05).abs() < 1e-9);
    }

    #[test]
    fn test_stop_loss_clamped_to_band() {
        // Far-away support clamps to the widest allowed stop
        let stop = compute_stop_loss(100.0, 60.0, 3.0, 15.0);
        assert!((stop - 85.0).abs() < 1e-9);
        // Support just under entry clamps to the tightest allowed stop
        let stop = compute_stop_loss(100.0, 99.5, 3.0, 15.0);
        assert!((stop - 97.0).abs() < 1e-9);
        // No support falls back to the tightest stop
        let stop = compute_stop_loss(100.0, 0.0, 3.0, 15.0);
        assert!((stop - 97.0).abs() < 1e-9);
    }

    #[test]
    fn test_stop_loss_band_invariant() {
        for support in [0.0, 10.0, 80.0, 94.0, 99.9, 150.0] {
            let stop = compute_stop_loss(100.0, support, 3.0, 15.0);
            let sl_pct = (100.0 - stop) / 100.0 * 100.0;
            assert!(sl_pct >= 3.0 - 1e-9 && sl_pct <= 15.0 + 1e-9, "support={}", support);
            assert!(stop > 0.0 && stop < 100.0);
        }
    }

    #[test]
    fn test_target_prefers_clear_resistance() {
        assert_eq!(compute_target(100.0, 120.0), 120.0);
        // Resistance too close → default 10% target
        assert!((compute_target(100.0, 102.0) - 110.0).abs() < 1e-9);
        assert!((compute_target(100.0, 0.0) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_risk_reward_math() {
        let rr = compute_risk_reward(100.0, 94.05, 120.0);
        assert!((rr - 20.0 / 5.95).abs() < 1e-9);
        // Degenerate stop above entry → 0
        assert_eq!(compute_risk_reward(100.0, 100.0, 120.0), 0.0);
        assert_eq!(compute_risk_reward(100.0, 105.0, 120.0), 0.0);
    }

    #[test]
    fn test_rr_score_bands() {
        assert_eq!(score_risk_reward(3.5), 100.0);
        assert_eq!(score_risk_reward(2.7), 85.0);
        assert_eq!(score_risk_reward(2.0), 70.0);
        assert_eq!(score_risk_reward(1.6), 40.0);
        assert_eq!(score_risk_reward(1.0), 0.0);
    }

    #[test]
    fn test_holding_and_risk_classification() {
        assert_eq!(estimate_holding_days(3.0), 30);
        assert_eq!(estimate_holding_days(2.2), 20);
        assert_eq!(estimate_holding_days(1.5), 15);

        assert_eq!(classify_risk(80.0, 3.0), RiskLevel::Low);
        assert_eq!(classify_risk(65.0, 2.2), RiskLevel::Moderate);
        assert_eq!(classify_risk(55.0, 3.0), RiskLevel::High);
    }

    #[test]
    fn test_verdict_bands() {
        assert_eq!(derive_verdict(85.0), "STRONG BUY");
        assert_eq!(derive_verdict(70.0), "BUY");
        assert_eq!(derive_verdict(55.0), "HOLD");
        assert_eq!(derive_verdict(30.0), "AVOID");
    }
}
