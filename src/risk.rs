//! Risk validator
//!
//! Stateless gate between signal generation and the approval workflow. Any
//! hard-rule failure drops the proposal regardless of its confidence score;
//! warnings ride along into the pre-trade report.

use crate::config::schemas::Config;
use crate::logger::{self, LogTag};
use crate::types::{SignalType, TradeProposal, TradeRecord, ValidationResult};

/// Input bundle for one validation pass. Everything the rules read is
/// captured here so `validate` stays a pure function.
pub struct RiskContext<'a> {
    pub open_positions: &'a [TradeRecord],
    pub portfolio_value: f64,
    pub new_buys_this_week: u32,
}

/// Validates a proposal against every configured risk rule.
pub fn validate(proposal: &TradeProposal, ctx: &RiskContext<'_>, cfg: &Config) -> ValidationResult {
    let mut failures = Vec::new();
    let mut warnings = Vec::new();

    let entry = proposal.entry_price;
    let stop = proposal.stop_loss_price;
    let target = proposal.target_price;

    // Rule 1: minimum stock price (penny-stock filter)
    if entry < cfg.filters.min_stock_price {
        failures.push(format!(
            "PENNY STOCK: price ₹{:.2} < minimum ₹{:.0}",
            entry, cfg.filters.min_stock_price
        ));
    }

    // Rule 2: minimum risk-reward ratio
    if proposal.risk_reward_ratio < cfg.risk.min_risk_reward_ratio {
        failures.push(format!(
            "R:R {:.2} below minimum {:.1}",
            proposal.risk_reward_ratio, cfg.risk.min_risk_reward_ratio
        ));
    }

    // Rule 3: stop-loss distance inside the configured band
    let sl_pct = if entry > 0.0 {
        (entry - stop).abs() / entry * 100.0
    } else {
        0.0
    };
    if sl_pct < cfg.risk.min_stop_loss_pct {
        failures.push(format!(
            "Stop-loss {:.1}% below minimum {:.0}%",
            sl_pct, cfg.risk.min_stop_loss_pct
        ));
    }
    if sl_pct > cfg.risk.max_stop_loss_pct {
        failures.push(format!(
            "Stop-loss {:.1}% exceeds maximum {:.0}%",
            sl_pct, cfg.risk.max_stop_loss_pct
        ));
    }

    // Rule 4: target above entry for BUY
    if proposal.signal_type == SignalType::Buy && target <= entry {
        failures.push("Target price must be above entry price for BUY signal".to_string());
    }

    // Rule 5: allocation under the hard single-stock cap
    if proposal.capital_allocation_pct > cfg.position_sizing.hard_cap_single_stock_pct {
        failures.push(format!(
            "Allocation {:.1}% exceeds hard cap {:.0}%",
            proposal.capital_allocation_pct, cfg.position_sizing.hard_cap_single_stock_pct
        ));
    }

    // Rule 6: maximum open positions
    let active_positions = ctx
        .open_positions
        .iter()
        .filter(|p| p.status == "EXECUTED")
        .count() as u32;
    if active_positions >= cfg.portfolio.max_open_positions {
        failures.push(format!(
            "Max open positions reached: {}/{}",
            active_positions, cfg.portfolio.max_open_positions
        ));
    }

    // Rule 7: emergency cash buffer
    if !proposal.cash_buffer_safe {
        failures.push("Trade would breach emergency cash buffer".to_string());
    }

    // Rule 8: sector concentration
    let sector_exposure_pct =
        sector_exposure(&proposal.sector, ctx.open_positions, ctx.portfolio_value);
    if sector_exposure_pct + proposal.capital_allocation_pct > cfg.position_sizing.max_sector_pct {
        failures.push(format!(
            "Sector '{}' exposure {:.1}% would exceed {:.0}% limit",
            proposal.sector,
            sector_exposure_pct + proposal.capital_allocation_pct,
            cfg.position_sizing.max_sector_pct
        ));
    }

    // Rule 9: no averaging down
    let already_holding = ctx
        .open_positions
        .iter()
        .any(|p| p.symbol == proposal.symbol && p.status == "EXECUTED");
    if already_holding {
        failures.push(format!(
            "Already holding {}, no averaging down allowed",
            proposal.symbol
        ));
    }

    // Rule 10: market orders prohibited
    if cfg.execution.order_type.eq_ignore_ascii_case("MARKET") {
        failures.push("Market orders are prohibited, use LIMIT orders only".to_string());
    }

    // Rule 11: margin warning (non-blocking)
    if cfg.execution.allow_margin {
        warnings.push("Margin trading is enabled, use with extreme caution".to_string());
    }

    // Rule 12: weekly new-buy budget
    if ctx.new_buys_this_week >= cfg.risk.max_new_buys_per_week {
        failures.push(format!(
            "Max new buys per week reached: {}/{}",
            ctx.new_buys_this_week, cfg.risk.max_new_buys_per_week
        ));
    }

    // Rule 13: minimum position size
    if proposal.capital_allocation < cfg.position_sizing.min_position_size {
        failures.push(format!(
            "Allocation ₹{:.0} below minimum ₹{:.0}",
            proposal.capital_allocation, cfg.position_sizing.min_position_size
        ));
    }

    // Rule 14: moderate-confidence size warning (non-blocking)
    if proposal.confidence.composite < 70.0 {
        warnings.push(format!(
            "Moderate confidence {:.0}%, consider reducing position size by 50%",
            proposal.confidence.composite
        ));
    }

    // Rule 15: wide-stop warning (non-blocking)
    if sl_pct > 10.0 {
        warnings.push(format!("Wide stop-loss {:.1}%, high risk trade", sl_pct));
    }

    if !failures.is_empty() {
        logger::info(
            LogTag::Risk,
            &format!(
                "Validation FAILED for {} with {} violations: {}",
                proposal.symbol,
                failures.len(),
                failures.join("; ")
            ),
        );
        return ValidationResult::fail(failures, warnings);
    }

    logger::info(
        LogTag::Risk,
        &format!("Validation PASSED for {} ({} warnings)", proposal.symbol, warnings.len()),
    );
    ValidationResult::pass(warnings)
}

/// Capital already committed to a sector as a percentage of the portfolio
pub fn sector_exposure(sector: &str, open_positions: &[TradeRecord], portfolio_value: f64) -> f64 {
    if sector.is_empty() || portfolio_value <= 0.0 {
        return 0.0;
    }
    let sector_capital: f64 = open_positions
        .iter()
        .filter(|p| p.status == "EXECUTED" && p.sector.eq_ignore_ascii_case(sector))
        .map(|p| p.capital_allocation)
        .sum();
    sector_capital / portfolio_value * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceScore, RiskLevel, SignalStatus};
    use chrono::{Duration, Utc};

    fn sample_proposal() -> TradeProposal {
        TradeProposal {
            trade_id: "TRD-ABCDEF123456".to_string(),
            symbol: "RELIANCE".to_string(),
            exchange: "NSE".to_string(),
            signal_type: SignalType::Buy,
            entry_price: 100.0,
            target_price: 120.0,
            stop_loss_price: 94.05,
            risk_reward_ratio: 20.0 / 5.95,
            expected_holding_days: 30,
            risk_level: RiskLevel::Low,
            confidence: ConfidenceScore {
                fundamental_score: 80.0,
                technical_score: 70.0,
                macro_score: 65.0,
                risk_reward_score: 100.0,
                composite: 77.0,
                ..Default::default()
            },
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
            expires_at: Utc::now() + Duration::minutes(30),
        }
    }

    fn open_position(symbol: &str, sector: &str, allocation: f64) -> TradeRecord {
        let mut proposal = sample_proposal();
        proposal.trade_id = crate::types::new_trade_id();
        proposal.symbol = symbol.to_string();
        proposal.sector = sector.to_string();
        proposal.capital_allocation = allocation;
        let mut record = TradeRecord::from_proposal(&proposal);
        record.status = "EXECUTED".to_string();
        record
    }

    fn ctx_empty() -> RiskContext<'static> {
        RiskContext {
            open_positions: &[],
            portfolio_value: 500_000.0,
            new_buys_this_week: 0,
        }
    }

    #[test]
    fn test_clean_proposal_passes() {
        let result = validate(&sample_proposal(), &ctx_empty(), &Config::default());
        assert!(result.passed);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let proposal = sample_proposal();
        let cfg = Config::default();
        let a = validate(&proposal, &ctx_empty(), &cfg);
        let b = validate(&proposal, &ctx_empty(), &cfg);
        assert_eq!(a.passed, b.passed);
        assert_eq!(a.failures, b.failures);
        assert_eq!(a.warnings, b.warnings);
    }

    #[test]
    fn test_penny_stock_blocked() {
        let mut proposal = sample_proposal();
        proposal.entry_price = 5.0;
        let result = validate(&proposal, &ctx_empty(), &Config::default());
        assert!(!result.passed);
        assert!(result.failures.iter().any(|f| f.contains("PENNY STOCK")));
    }

    #[test]
    fn test_poor_risk_reward_blocked() {
        let mut proposal = sample_proposal();
        proposal.risk_reward_ratio = 1.2;
        let result = validate(&proposal, &ctx_empty(), &Config::default());
        assert!(!result.passed);
    }

    #[test]
    fn test_stop_loss_band_enforced() {
        let mut proposal = sample_proposal();
        proposal.stop_loss_price = 99.0; // 1%, too tight
        let result = validate(&proposal, &ctx_empty(), &Config::default());
        assert!(result.failures.iter().any(|f| f.contains("below minimum")));

        proposal.stop_loss_price = 80.0; // 20%, too wide
        let result = validate(&proposal, &ctx_empty(), &Config::default());
        assert!(result.failures.iter().any(|f| f.contains("exceeds maximum")));
    }

    #[test]
    fn test_max_open_positions_blocked() {
        let positions: Vec<TradeRecord> = (0..15)
            .map(|i| open_position(&format!("SYM{}", i), "Misc", 10_000.0))
            .collect();
        let ctx = RiskContext {
            open_positions: &positions,
            portfolio_value: 500_000.0,
            new_buys_this_week: 0,
        };
        let result = validate(&sample_proposal(), &ctx, &Config::default());
        assert!(result
            .failures
            .iter()
            .any(|f| f.contains("Max open positions")));
    }

    #[test]
    fn test_sector_concentration_blocked() {
        // 90k of 500k already in Energy = 18%; +10% proposal = 28% > 25% cap
        let positions = vec![
            open_position("ONGC", "Energy", 50_000.0),
            open_position("IOC", "Energy", 40_000.0),
        ];
        let ctx = RiskContext {
            open_positions: &positions,
            portfolio_value: 500_000.0,
            new_buys_this_week: 0,
        };
        let result = validate(&sample_proposal(), &ctx, &Config::default());
        assert!(result.failures.iter().any(|f| f.contains("Sector 'Energy'")));

        let exposure = sector_exposure("Energy", &positions, 500_000.0);
        assert!((exposure - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_averaging_down() {
        let positions = vec![open_position("RELIANCE", "Energy", 20_000.0)];
        let ctx = RiskContext {
            open_positions: &positions,
            portfolio_value: 500_000.0,
            new_buys_this_week: 0,
        };
        let result = validate(&sample_proposal(), &ctx, &Config::default());
        assert!(result.failures.iter().any(|f| f.contains("no averaging down")));
    }

    #[test]
    fn test_market_orders_blocked() {
        let mut cfg = Config::default();
        cfg.execution.order_type = "MARKET".to_string();
        let result = validate(&sample_proposal(), &ctx_empty(), &cfg);
        assert!(result
            .failures
            .iter()
            .any(|f| f.contains("Market orders are prohibited")));
    }

    #[test]
    fn test_weekly_buy_budget_blocked() {
        let ctx = RiskContext {
            open_positions: &[],
            portfolio_value: 500_000.0,
            new_buys_this_week: 3,
        };
        let result = validate(&sample_proposal(), &ctx, &Config::default());
        assert!(result
            .failures
            .iter()
            .any(|f| f.contains("Max new buys per week")));
    }

    #[test]
    fn test_warnings_do_not_block() {
        let mut proposal = sample_proposal();
        proposal.confidence.composite = 65.0;
        proposal.stop_loss_price = 88.0; // 12% stop: wide but legal
        proposal.risk_reward_ratio = 20.0 / 12.0;
        let mut cfg = Config::default();
        cfg.execution.allow_margin = true;
        cfg.risk.min_risk_reward_ratio = 1.5;

        let result = validate(&proposal, &ctx_empty(), &cfg);
        assert!(result.passed);
        assert_eq!(result.warnings.len(), 3);
        assert!(result.warnings.iter().any(|w| w.contains("Moderate confidence")));
        assert!(result.warnings.iter().any(|w| w.contains("Wide stop-loss")));
        assert!(result.warnings.iter().any(|w| w.contains("Margin trading")));
    }

    #[test]
    fn test_min_position_size_blocked() {
        let mut proposal = sample_proposal();
        proposal.capital_allocation = 2_000.0;
        let result = validate(&proposal, &ctx_empty(), &Config::default());
        assert!(result.failures.iter().any(|f| f.contains("below minimum")));
    }
}
