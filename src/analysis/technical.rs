//! Technical analysis scorer
//!
//! Evaluates entry timing over the snapshot's daily bars: moving averages,
//! RSI, MACD, volume confirmation and 20-day support/resistance. Requires at
//! least 210 bars so the 200-period averages are meaningful.

use crate::analysis::indicators;
use crate::config::schemas::TechnicalConfig;
use crate::logger::{self, LogTag};
use crate::types::StockSnapshot;

/// Bars required before the 200-period indicators are trusted
pub const MIN_BARS: usize = 210;

/// Support/resistance lookback window
const LEVEL_LOOKBACK: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct TechnicalResult {
    pub score: f64,
    pub summary: String,
    pub sma200: f64,
    pub sma50: f64,
    pub sma20: f64,
    pub rsi: f64,
    pub support_level: f64,
    pub resistance_level: f64,
    pub golden_cross: bool,
    pub death_cross: bool,
    pub macd_bullish: bool,
    pub volume_confirmed: bool,
}

impl TechnicalResult {
    fn insufficient() -> Self {
        Self {
            score: 0.0,
            summary: "Insufficient data".to_string(),
            rsi: 50.0,
            ..Default::default()
        }
    }
}

/// Scores the technical setup for a snapshot, 0-100.
pub fn analyse(snapshot: &StockSnapshot, cfg: &TechnicalConfig) -> TechnicalResult {
    let bars = &snapshot.bars;
    if bars.len() < MIN_BARS {
        logger::debug(
            LogTag::Analysis,
            &format!(
                "Insufficient history for {} ({} bars), technical score 0",
                snapshot.symbol,
                bars.len()
            ),
        );
        return TechnicalResult::insufficient();
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

    let last = closes.len() - 1;
    let current_price = closes[last];

    let sma200 = indicators::sma(&closes, cfg.dma_long).unwrap_or(0.0);
    let sma50 = indicators::sma(&closes, cfg.dma_medium).unwrap_or(0.0);
    let sma20 = indicators::sma(&closes, cfg.dma_short).unwrap_or(0.0);
    let rsi = indicators::rsi(&closes, cfg.rsi_period).unwrap_or(50.0);

    let macd = indicators::macd(&closes, 12, 26, 9);
    let macd_bullish = macd.map(|m| m.is_bullish()).unwrap_or(false);
    let macd_just_crossed_up = macd.map(|m| m.just_crossed_up()).unwrap_or(false);

    let current_volume = volumes[last];
    let avg_volume20 = indicators::sma(&volumes, 20).unwrap_or(0.0);
    let volume_confirmed = current_volume > avg_volume20;

    let support = indicators::rolling_min(&lows, LEVEL_LOOKBACK).unwrap_or(0.0);
    let resistance = indicators::rolling_max(&highs, LEVEL_LOOKBACK).unwrap_or(0.0);

    // Cross detection against the previous bar's averages
    let prev50 = indicators::sma_ending_at(&closes, cfg.dma_medium, last - 1).unwrap_or(sma50);
    let prev200 = indicators::sma_ending_at(&closes, cfg.dma_long, last - 1).unwrap_or(sma200);
    let golden_cross = prev50 < prev200 && sma50 >= sma200;
    let death_cross = prev50 > prev200 && sma50 <= sma200;

    let mut score: f64 = 50.0;
    let mut summary = String::new();

    // Price vs 200 DMA
    if current_price > sma200 {
        let pct_above = (current_price - sma200) / sma200 * 100.0;
        if pct_above <= cfg.max_pct_above_200dma {
            score += 15.0;
            summary.push_str("Above 200 DMA. ");
        } else {
            score -= 10.0;
            summary.push_str(&format!("{:.1}% above 200 DMA, extended. ", pct_above));
        }
    } else {
        score -= 25.0;
        summary.push_str("Below 200 DMA, avoid. ");
    }

    // Price vs 50 DMA
    if current_price > sma50 {
        score += 8.0;
        summary.push_str("Above 50 DMA. ");
    } else {
        score -= 8.0;
    }

    // Price vs 20 DMA
    if current_price > sma20 {
        score += 5.0;
    }

    // Golden / death cross
    if golden_cross {
        score += 12.0;
        summary.push_str("Golden cross. ");
    }
    if death_cross {
        score -= 20.0;
        summary.push_str("Death cross, bearish. ");
    }

    // RSI bands
    if rsi < cfg.rsi_oversold && rsi > 30.0 {
        score += 8.0;
        summary.push_str(&format!("RSI {:.0}, oversold potential. ", rsi));
    } else if (40.0..=60.0).contains(&rsi) {
        score += 5.0;
        summary.push_str(&format!("RSI {:.0}, neutral. ", rsi));
    } else if rsi > cfg.rsi_overbought {
        score -= 15.0;
        summary.push_str(&format!("RSI {:.0}, overbought. ", rsi));
    } else if rsi <= 30.0 {
        score -= 5.0;
        summary.push_str(&format!("RSI {:.0}, deeply oversold. ", rsi));
    }

    // MACD
    if macd_just_crossed_up {
        score += 10.0;
        summary.push_str("MACD bullish crossover. ");
    } else if macd_bullish {
        score += 5.0;
    } else {
        score -= 5.0;
    }

    // Volume confirmation
    if volume_confirmed {
        score += 7.0;
        summary.push_str("Volume confirmed. ");
    } else {
        score -= 5.0;
        summary.push_str("Low volume. ");
    }

    score = score.clamp(0.0, 100.0);
    logger::debug(
        LogTag::Analysis,
        &format!(
            "Technical score for {}: {:.0} | RSI={:.0} MACD={} Vol={}",
            snapshot.symbol, score, rsi, macd_bullish, volume_confirmed
        ),
    );

    TechnicalResult {
        score,
        summary: summary.trim().to_string(),
        sma200,
        sma50,
        sma20,
        rsi,
        support_level: support,
        resistance_level: resistance,
        golden_cross,
        death_cross,
        macd_bullish,
        volume_confirmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OhlcvBar;
    use chrono::{Duration, Utc};

    /// Builds a snapshot from a close-price series; highs/lows follow closes
    pub fn snapshot_from_closes(closes: &[f64], volume: i64) -> StockSnapshot {
        let start = Utc::now() - Duration::days(closes.len() as i64);
        let bars: Vec<OhlcvBar> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                timestamp: start + Duration::days(i as i64),
                open: close * 0.995,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume,
            })
            .collect();
        let last = bars.last().cloned().unwrap();
        StockSnapshot {
            symbol: "TEST".to_string(),
            exchange: "NSE".to_string(),
            ltp: last.close,
            open: last.open,
            high: last.high,
            low: last.low,
            close: last.close,
            volume: last.volume,
            avg_volume_20d: volume as f64,
            bars,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_short_history_scores_zero() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64 * 0.1).collect();
        let result = analyse(&snapshot_from_closes(&closes, 1000), &TechnicalConfig::default());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.summary, "Insufficient data");
    }

    #[test]
    fn test_uptrend_beats_downtrend() {
        let up: Vec<f64> = (0..250).map(|i| 100.0 + i as f64 * 0.10).collect();
        let down: Vec<f64> = (0..250).map(|i| 150.0 - i as f64 * 0.10).collect();
        let cfg = TechnicalConfig::default();

        let up_result = analyse(&snapshot_from_closes(&up, 1000), &cfg);
        let down_result = analyse(&snapshot_from_closes(&down, 1000), &cfg);

        assert!(up_result.score > down_result.score);
        assert!(up_result.sma200 > 0.0);
        assert!((0.0..=100.0).contains(&up_result.score));
        assert!((0.0..=100.0).contains(&down_result.score));
    }

    #[test]
    fn test_downtrend_flags_below_200dma() {
        let down: Vec<f64> = (0..250).map(|i| 200.0 - i as f64 * 0.3).collect();
        let result = analyse(
            &snapshot_from_closes(&down, 1000),
            &TechnicalConfig::default(),
        );
        assert!(result.summary.contains("Below 200 DMA"));
        assert!(!result.golden_cross);
    }

    #[test]
    fn test_levels_track_recent_extremes() {
        let mut closes: Vec<f64> = vec![100.0; 230];
        // Recent window: dip to 95, spike to 120
        for i in 0..20 {
            closes.push(if i == 5 { 95.0 } else if i == 15 { 120.0 } else { 100.0 });
        }
        let result = analyse(
            &snapshot_from_closes(&closes, 1000),
            &TechnicalConfig::default(),
        );
        // lows are close*0.99, highs close*1.01
        assert!((result.support_level - 95.0 * 0.99).abs() < 1e-9);
        assert!((result.resistance_level - 120.0 * 1.01).abs() < 1e-9);
    }
}
