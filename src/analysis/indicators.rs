//! Technical indicator calculations
//!
//! Plain functions over price/volume slices. All return None when the input
//! is too short for the requested period.

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    sma_ending_at(values, period, values.len().checked_sub(1)?)
}

/// Simple moving average of the `period` values ending at `end_index`
/// (inclusive). Used for cross detection against the previous bar.
pub fn sma_ending_at(values: &[f64], period: usize, end_index: usize) -> Option<f64> {
    if period == 0 || end_index >= values.len() || end_index + 1 < period {
        return None;
    }
    let window = &values[end_index + 1 - period..=end_index];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Wilder-smoothed RSI over the full series
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses += -change;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    for i in period + 1..values.len() {
        let change = values[i] - values[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Exponential moving average series, seeded with the SMA of the first
/// `period` values. Output index i corresponds to input index period-1+i.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    out.push(ema);
    for value in &values[period..] {
        ema = (value - ema) * alpha + ema;
        out.push(ema);
    }
    out
}

/// MACD(12,26) with a 9-period EMA signal line. Carries the previous pair
/// of values so callers can detect a fresh crossover.
#[derive(Debug, Clone, Copy)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub prev_macd: f64,
    pub prev_signal: f64,
}

impl MacdResult {
    pub fn is_bullish(&self) -> bool {
        self.macd > self.signal
    }

    pub fn just_crossed_up(&self) -> bool {
        self.prev_macd < self.prev_signal && self.macd >= self.signal
    }
}

pub fn macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<MacdResult> {
    if fast >= slow || values.len() < slow + signal_period {
        return None;
    }

    let fast_series = ema_series(values, fast);
    let slow_series = ema_series(values, slow);

    // Align the two EMA series on the slow one
    let offset = slow - fast;
    let macd_line: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, slow_val)| fast_series[i + offset] - slow_val)
        .collect();

    let signal_series = ema_series(&macd_line, signal_period);
    if signal_series.len() < 2 || macd_line.len() < 2 {
        return None;
    }

    Some(MacdResult {
        macd: *macd_line.last()?,
        signal: *signal_series.last()?,
        prev_macd: macd_line[macd_line.len() - 2],
        prev_signal: signal_series[signal_series.len() - 2],
    })
}

/// Minimum of the last `lookback` values (support level)
pub fn rolling_min(values: &[f64], lookback: usize) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let start = values.len().saturating_sub(lookback);
    values[start..]
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| match acc {
            Some(current) => Some(current.min(v)),
            None => Some(v),
        })
}

/// Maximum of the last `lookback` values (resistance level)
pub fn rolling_max(values: &[f64], lookback: usize) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let start = values.len().saturating_sub(lookback);
    values[start..]
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| match acc {
            Some(current) => Some(current.max(v)),
            None => Some(v),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_basic() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 5), Some(3.0));
        assert_eq!(sma(&values, 2), Some(4.5));
        assert_eq!(sma(&values, 6), None);
        assert_eq!(sma_ending_at(&values, 2, 3), Some(3.5));
    }

    #[test]
    fn test_rsi_bounds() {
        // Monotonically rising series → RSI 100
        let rising: Vec<f64> = (1..=30).map(|v| v as f64).collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));

        // Falling series → RSI near 0
        let falling: Vec<f64> = (1..=30).rev().map(|v| v as f64).collect();
        let value = rsi(&falling, 14).expect("rsi");
        assert!(value < 1.0);

        // Mixed stays strictly inside the bounds
        let mixed: Vec<f64> = (0..60)
            .map(|i| 100.0 + if i % 2 == 0 { 1.5 } else { -1.0 })
            .collect();
        let value = rsi(&mixed, 14).expect("rsi");
        assert!(value > 0.0 && value < 100.0);

        assert_eq!(rsi(&[1.0, 2.0], 14), None);
    }

    #[test]
    fn test_ema_series_length_and_seed() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let series = ema_series(&values, 5);
        assert_eq!(series.len(), 6);
        // Seeded with the SMA of the first five values
        assert!((series[0] - 3.0).abs() < 1e-9);
        // Constant input stays constant
        let flat = ema_series(&[2.0; 40], 12);
        assert!(flat.iter().all(|v| (v - 2.0).abs() < 1e-9));
    }

    #[test]
    fn test_macd_cross_detection() {
        // Long flat stretch then a sharp rally: MACD must end bullish
        let mut values = vec![100.0; 60];
        for i in 0..20 {
            values.push(100.0 + (i as f64) * 2.0);
        }
        let result = macd(&values, 12, 26, 9).expect("macd");
        assert!(result.is_bullish());

        // Too little data
        assert!(macd(&[1.0; 20], 12, 26, 9).is_none());
    }

    #[test]
    fn test_rolling_extremes() {
        let values = vec![5.0, 1.0, 9.0, 3.0, 7.0];
        assert_eq!(rolling_min(&values, 3), Some(3.0));
        assert_eq!(rolling_max(&values, 3), Some(9.0));
        assert_eq!(rolling_min(&values, 100), Some(1.0));
        assert_eq!(rolling_max(&[], 3), None);
    }
}
