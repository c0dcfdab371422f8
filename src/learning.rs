//! Learning summary
//!
//! Read-only reducers over closed trades: win rate, calibration by
//! confidence bucket, per-sector performance, rejection reasons. Produces
//! reports for the monthly review and the performance endpoint; never
//! modifies trading rules.

use crate::database;
use crate::logger::{self, LogTag};
use crate::telegram;
use crate::types::TradeRecord;
use chrono::{Duration, Utc};
use std::collections::HashMap;

/// A trade counts as a win when it realised a profit, regardless of whether
/// the exit was a booked target or a trailed stop above entry.
fn is_win(trade: &TradeRecord) -> bool {
    trade.realised_pnl.map(|pnl| pnl > 0.0).unwrap_or(false)
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PerformanceStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate_pct: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub win_loss_ratio: f64,
    pub total_pnl: f64,
}

/// Aggregates outcome statistics over a set of closed trades
pub fn compute_stats(trades: &[TradeRecord]) -> PerformanceStats {
    let wins: Vec<&TradeRecord> = trades.iter().filter(|t| is_win(t)).collect();
    let losses: Vec<&TradeRecord> = trades.iter().filter(|t| !is_win(t)).collect();

    let win_rate = if trades.is_empty() {
        0.0
    } else {
        wins.len() as f64 / trades.len() as f64 * 100.0
    };

    let avg_win = average(wins.iter().filter_map(|t| t.realised_pnl_pct));
    let avg_loss = average(losses.iter().filter_map(|t| t.realised_pnl_pct));
    let total_pnl: f64 = trades.iter().filter_map(|t| t.realised_pnl).sum();

    PerformanceStats {
        total_trades: trades.len(),
        wins: wins.len(),
        losses: losses.len(),
        win_rate_pct: win_rate,
        avg_win_pct: avg_win,
        avg_loss_pct: avg_loss,
        win_loss_ratio: if avg_loss != 0.0 {
            (avg_win / avg_loss).abs()
        } else {
            0.0
        },
        total_pnl,
    }
}

/// Win rate per confidence bucket: the scoring model is well-calibrated
/// when higher buckets win more often.
pub fn calibration_report(trades: &[TradeRecord]) -> String {
    if trades.len() < 10 {
        return "Insufficient data for calibration (need 10+ closed trades)".to_string();
    }

    let mut buckets: HashMap<&'static str, Vec<&TradeRecord>> = HashMap::new();
    for trade in trades {
        let bucket = if trade.confidence_score >= 85.0 {
            "85-100 (High)"
        } else if trade.confidence_score >= 70.0 {
            "70-84 (Strong)"
        } else {
            "60-69 (Moderate)"
        };
        buckets.entry(bucket).or_default().push(trade);
    }

    let mut report = String::from("Confidence Calibration:\n");
    for bucket in ["85-100 (High)", "70-84 (Strong)", "60-69 (Moderate)"] {
        if let Some(bucket_trades) = buckets.get(bucket) {
            let wins = bucket_trades.iter().filter(|t| is_win(t)).count();
            let win_rate = wins as f64 / bucket_trades.len() as f64 * 100.0;
            report.push_str(&format!(
                "  {}: {:.0}% win rate ({}/{} trades)\n",
                bucket,
                win_rate,
                wins,
                bucket_trades.len()
            ));
        }
    }
    report
}

/// Win rate and average P&L per sector, best sectors first
pub fn sector_report(trades: &[TradeRecord]) -> String {
    let mut by_sector: HashMap<String, Vec<&TradeRecord>> = HashMap::new();
    for trade in trades {
        if !trade.sector.is_empty() {
            by_sector.entry(trade.sector.clone()).or_default().push(trade);
        }
    }

    let mut sectors: Vec<(String, f64, f64, usize)> = by_sector
        .into_iter()
        .map(|(sector, sector_trades)| {
            let wins = sector_trades.iter().filter(|t| is_win(t)).count();
            let win_rate = wins as f64 / sector_trades.len() as f64 * 100.0;
            let avg_pnl = average(sector_trades.iter().filter_map(|t| t.realised_pnl_pct));
            (sector, win_rate, avg_pnl, sector_trades.len())
        })
        .collect();
    sectors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut report = String::from("Sector Performance:\n");
    for (sector, win_rate, avg_pnl, count) in sectors {
        report.push_str(&format!(
            "  {}: {:.0}% win rate | avg P&L {:.1}% ({} trades)\n",
            sector, win_rate, avg_pnl, count
        ));
    }
    report
}

/// Frequency of operator rejection reasons, most common first
pub fn rejection_report(rejected: &[TradeRecord]) -> String {
    if rejected.is_empty() {
        return "No rejected signals to analyse.".to_string();
    }

    let mut by_reason: HashMap<String, usize> = HashMap::new();
    for trade in rejected {
        if let Some(reason) = &trade.rejection_reason {
            *by_reason.entry(reason.clone()).or_insert(0) += 1;
        }
    }

    let mut reasons: Vec<(String, usize)> = by_reason.into_iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(&a.1));

    let mut report = format!("Rejected Signal Analysis ({} signals):\n", rejected.len());
    report.push_str("Top rejection reasons:\n");
    for (reason, count) in reasons.into_iter().take(5) {
        report.push_str(&format!("  • {} ({} times)\n", reason, count));
    }
    report
}

/// Monthly review: stats over the trailing month, pushed to the operator.
pub async fn run_monthly_review() {
    logger::info(LogTag::Learning, "Running monthly review");

    let one_month_ago = Utc::now() - Duration::days(30);
    let closed = match database::store().and_then(|s| s.find_closed_since(one_month_ago)) {
        Ok(closed) => closed,
        Err(e) => {
            logger::error(LogTag::Learning, &format!("Could not load closed trades: {}", e));
            return;
        }
    };

    if closed.is_empty() {
        logger::info(LogTag::Learning, "No closed trades in the past month, skipping review");
        return;
    }

    let stats = compute_stats(&closed);
    let body = format!(
        "Period: Last 30 days\n\
         Total trades  : {}\n\
         Win / Loss    : {} / {} ({:.0}% win rate)\n\
         Avg Win       : +{:.1}%\n\
         Avg Loss      : {:.1}%\n\
         Win/Loss Ratio: {:.2}\n\
         Total P&L     : {}₹{:.0}\n\n{}\n{}",
        stats.total_trades,
        stats.wins,
        stats.losses,
        stats.win_rate_pct,
        stats.avg_win_pct,
        stats.avg_loss_pct,
        stats.win_loss_ratio,
        if stats.total_pnl >= 0.0 { "+" } else { "" },
        stats.total_pnl,
        calibration_report(&closed),
        sector_report(&closed),
    );

    let _ = telegram::send_alert("📈 MONTHLY PERFORMANCE REVIEW", &body).await;
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return 0.0;
    }
    collected.iter().sum::<f64>() / collected.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_trade(sector: &str, confidence: f64, pnl: f64, pnl_pct: f64) -> TradeRecord {
        TradeRecord {
            trade_id: crate::types::new_trade_id(),
            symbol: "X".to_string(),
            exchange: "NSE".to_string(),
            sector: sector.to_string(),
            signal_type: "BUY".to_string(),
            status: "CLOSED".to_string(),
            entry_price: 100.0,
            target_price: 120.0,
            stop_loss_price: 95.0,
            initial_stop_price: 95.0,
            risk_reward_ratio: 4.0,
            capital_allocation: 50_000.0,
            confidence_score: confidence,
            fundamental_score: 0.0,
            technical_score: 0.0,
            macro_score: 0.0,
            risk_reward_score: 0.0,
            generated_at: Utc::now(),
            expires_at: None,
            approved_at: None,
            executed_at: None,
            closed_at: Some(Utc::now()),
            exit_price: Some(100.0 + pnl / 500.0),
            realised_pnl: Some(pnl),
            realised_pnl_pct: Some(pnl_pct),
            exit_reason: Some("STOP_LOSS_HIT".to_string()),
            target_hit: false,
            partial_alert_sent: false,
            rejection_reason: None,
            broker_order_id: None,
            fundamental_summary: String::new(),
            technical_summary: String::new(),
            macro_context: String::new(),
        }
    }

    #[test]
    fn test_stats_over_mixed_outcomes() {
        let trades = vec![
            closed_trade("IT", 88.0, 5_000.0, 10.0),
            closed_trade("IT", 75.0, 2_500.0, 5.0),
            closed_trade("Banking", 65.0, -2_750.0, -5.5),
            closed_trade("Banking", 72.0, -1_500.0, -3.0),
        ];
        let stats = compute_stats(&trades);
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 2);
        assert!((stats.win_rate_pct - 50.0).abs() < 1e-9);
        assert!((stats.avg_win_pct - 7.5).abs() < 1e-9);
        assert!((stats.avg_loss_pct - -4.25).abs() < 1e-9);
        assert!((stats.total_pnl - 3_250.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_set_is_valid() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.win_rate_pct, 0.0);
        assert_eq!(stats.total_pnl, 0.0);
    }

    #[test]
    fn test_calibration_needs_enough_data() {
        let trades = vec![closed_trade("IT", 88.0, 1_000.0, 2.0)];
        assert!(calibration_report(&trades).contains("Insufficient data"));

        let trades: Vec<TradeRecord> = (0..12)
            .map(|i| {
                closed_trade(
                    "IT",
                    if i < 6 { 90.0 } else { 62.0 },
                    if i % 2 == 0 { 1_000.0 } else { -500.0 },
                    1.0,
                )
            })
            .collect();
        let report = calibration_report(&trades);
        assert!(report.contains("85-100 (High)"));
        assert!(report.contains("60-69 (Moderate)"));
    }

    #[test]
    fn test_sector_report_ordering() {
        let trades = vec![
            closed_trade("IT", 80.0, 1_000.0, 2.0),
            closed_trade("IT", 80.0, 1_000.0, 2.0),
            closed_trade("Banking", 80.0, -1_000.0, -2.0),
        ];
        let report = sector_report(&trades);
        let it_pos = report.find("IT:").expect("IT line");
        let bank_pos = report.find("Banking:").expect("Banking line");
        assert!(it_pos < bank_pos, "best sector listed first");
    }

    #[test]
    fn test_rejection_report_frequencies() {
        let mut a = closed_trade("IT", 70.0, 0.0, 0.0);
        a.rejection_reason = Some("too risky".to_string());
        let mut b = closed_trade("IT", 70.0, 0.0, 0.0);
        b.rejection_reason = Some("too risky".to_string());
        let mut c = closed_trade("IT", 70.0, 0.0, 0.0);
        c.rejection_reason = Some("bad timing".to_string());

        let report = rejection_report(&[a, b, c]);
        assert!(report.contains("too risky (2 times)"));
        assert!(report.contains("bad timing (1 times)"));
    }
}
