//! Small shared helpers

use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Exchange local zone: IST is fixed UTC+05:30, no DST
pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 1800).expect("IST offset is in range")
}

/// Current wall-clock time in the exchange's zone
pub fn ist_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist_offset())
}

/// Converts a UTC instant into the exchange's zone
pub fn to_ist(timestamp: DateTime<Utc>) -> DateTime<FixedOffset> {
    timestamp.with_timezone(&ist_offset())
}

/// Waits for `delay` or a shutdown notification, whichever comes first.
/// Returns true when the caller should stop its loop.
pub async fn check_shutdown_or_delay(shutdown: &Arc<Notify>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.notified() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

/// Truncates a string to `max` chars, appending an ellipsis when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

/// Formats a rupee amount with no decimals (₹12,345 style without grouping,
/// matching broker statements the operator sees).
pub fn format_inr(amount: f64) -> String {
    format!("₹{:.0}", amount)
}

/// Formats a price with two decimals
pub fn format_price(price: f64) -> String {
    format!("₹{:.2}", price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 500), "short");
        let long = "x".repeat(600);
        let cut = truncate(&long, 500);
        assert_eq!(cut.chars().count(), 500);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_inr(50000.4), "₹50000");
        assert_eq!(format_price(94.049), "₹94.05");
    }
}
