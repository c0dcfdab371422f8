//! Macro context scorer
//!
//! Evaluates market-wide conditions as a filter over new buys. Can suppress
//! all new signals outright or shave confidence off every proposal via the
//! penalty it returns.

use crate::config::schemas::MacroConfig;
use crate::logger::{self, LogTag};
use crate::types::{MacroSnapshot, MarketRegime};

#[derive(Debug, Clone)]
pub struct MacroResult {
    pub score: f64,
    pub summary: String,
    pub new_buys_suppressed: bool,
    pub confidence_penalty: f64,
    pub regime: MarketRegime,
}

/// Scores macro conditions, 0-100. Suppressed markets return (0, true).
pub fn analyse(snapshot: &MacroSnapshot, cfg: &MacroConfig) -> MacroResult {
    // Hard suppression first
    if snapshot.new_buys_suppressed {
        let reason = if snapshot.india_vix > cfg.vix_no_buys_threshold {
            format!(
                "India VIX={:.1} > {:.0}, all new buys suppressed",
                snapshot.india_vix, cfg.vix_no_buys_threshold
            )
        } else {
            "Nifty significantly below 200 DMA, bear market mode".to_string()
        };
        return MacroResult {
            score: 0.0,
            summary: reason,
            new_buys_suppressed: true,
            confidence_penalty: 0.0,
            regime: snapshot.regime,
        };
    }

    let mut score: f64 = 50.0;
    let mut penalty: f64 = 0.0;
    let mut summary = String::new();

    // Volatility bands
    let vix = snapshot.india_vix;
    if vix < cfg.vix_favorable_threshold {
        score += 20.0;
        summary.push_str(&format!("VIX={:.1} favorable. ", vix));
    } else if vix < cfg.vix_caution_threshold {
        score += 8.0;
        summary.push_str(&format!("VIX={:.1} neutral. ", vix));
    } else {
        score -= 15.0;
        penalty += 10.0;
        summary.push_str(&format!("VIX={:.1} elevated, caution. ", vix));
    }

    // Index deviation from its 200-day mean
    let pct_above = snapshot.nifty_pct_above_dma200;
    if pct_above > 0.0 && pct_above <= 10.0 {
        score += 15.0;
        summary.push_str(&format!("Nifty {:.1}% above 200 DMA. ", pct_above));
    } else if pct_above > 10.0 && pct_above <= 20.0 {
        score += 8.0;
        penalty += 5.0;
        summary.push_str(&format!("Nifty {:.1}% above 200 DMA, avoid chasing. ", pct_above));
    } else if pct_above <= 0.0 && pct_above > -5.0 {
        score -= 8.0;
        summary.push_str("Nifty near/below 200 DMA, defensive mode. ");
    } else if pct_above <= -5.0 {
        score -= 20.0;
        summary.push_str("Nifty well below 200 DMA, bear warning. ");
    } else {
        // more than 20% extended
        score -= 5.0;
        penalty += 8.0;
        summary.push_str(&format!("Nifty {:.1}% above 200 DMA, extended. ", pct_above));
    }

    // Foreign-flow heuristic. The flow fields are never populated from a
    // live source; zero flow takes none of these branches.
    if snapshot.consecutive_fii_selling_days >= cfg.fii_selling_days_threshold {
        score -= 15.0;
        penalty += 15.0;
        summary.push_str(&format!(
            "FII selling {} consecutive days. ",
            snapshot.consecutive_fii_selling_days
        ));
    } else if snapshot.fii_net_flow_cr > 0.0 {
        score += 10.0;
        summary.push_str("FII net buying. ");
    } else if snapshot.fii_net_flow_cr < -1000.0 {
        score -= 5.0;
        summary.push_str("FII net selling, caution. ");
    }

    // Regime bonus/penalty
    match snapshot.regime {
        MarketRegime::Bull => {
            score += 10.0;
            summary.push_str("Bull regime. ");
        }
        MarketRegime::Bear => {
            score -= 20.0;
            summary.push_str("Bear regime. ");
        }
        MarketRegime::HighVolatility => {
            score -= 10.0;
            summary.push_str("High volatility regime, reduce sizes. ");
        }
        MarketRegime::Sideways => {
            summary.push_str("Sideways market, selective entries only. ");
        }
    }

    score = score.clamp(0.0, 100.0);
    logger::debug(
        LogTag::Analysis,
        &format!(
            "Macro score {:.0} | VIX={:.1} Nifty/200dma={:.1}% Regime={}",
            score,
            vix,
            pct_above,
            snapshot.regime.as_str()
        ),
    );

    MacroResult {
        score,
        summary: summary.trim().to_string(),
        new_buys_suppressed: false,
        confidence_penalty: penalty,
        regime: snapshot.regime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sideways_snapshot() -> MacroSnapshot {
        MacroSnapshot {
            india_vix: 16.0,
            nifty_price: 21_500.0,
            nifty_dma200: 21_000.0,
            nifty_pct_above_dma200: 2.38,
            regime: MarketRegime::Sideways,
            new_buys_suppressed: false,
            ..MacroSnapshot::neutral()
        }
    }

    #[test]
    fn test_suppressed_market_scores_zero() {
        let snapshot = MacroSnapshot {
            india_vix: 28.0,
            new_buys_suppressed: true,
            regime: MarketRegime::Bear,
            ..MacroSnapshot::neutral()
        };
        let result = analyse(&snapshot, &MacroConfig::default());
        assert_eq!(result.score, 0.0);
        assert!(result.new_buys_suppressed);
        assert!(result.summary.contains("suppressed"));
    }

    #[test]
    fn test_favorable_bull_market() {
        let snapshot = MacroSnapshot {
            india_vix: 12.0,
            nifty_pct_above_dma200: 6.0,
            regime: MarketRegime::Bull,
            ..sideways_snapshot()
        };
        let result = analyse(&snapshot, &MacroConfig::default());
        // 50 + 20 (vix) + 15 (dma band) + 10 (bull) = 95
        assert!((result.score - 95.0).abs() < 1e-9);
        assert_eq!(result.confidence_penalty, 0.0);
    }

    #[test]
    fn test_elevated_vix_adds_penalty() {
        let snapshot = MacroSnapshot {
            india_vix: 22.0,
            regime: MarketRegime::HighVolatility,
            ..sideways_snapshot()
        };
        let result = analyse(&snapshot, &MacroConfig::default());
        assert!(result.confidence_penalty >= 10.0);
        assert!(result.score < 50.0);
    }

    #[test]
    fn test_neutral_flow_path_well_defined() {
        // Zero FII flow must take no flow branch at all
        let result = analyse(&sideways_snapshot(), &MacroConfig::default());
        assert!(!result.summary.contains("FII"));
        // 50 + 8 (vix 16 neutral) + 15 (2.4% above dma) + 0 (sideways)
        assert!((result.score - 73.0).abs() < 1e-9);
    }
}
