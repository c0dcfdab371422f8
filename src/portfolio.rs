//! Portfolio valuation
//!
//! Provides the total portfolio value used for position sizing. Simulation
//! mode always answers with the configured virtual balance; live mode sums
//! available cash and mark-to-market holdings, caching the last good value.

use crate::broker::broker;
use crate::config::{self, with_config};
use crate::logger::{self, LogTag};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

/// Last good live valuation, stored as f64 bits. Zero = never refreshed.
static CACHED_VALUE: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// Returns the current portfolio value. Uses the cached value from the last
/// `refresh()`; call refresh at the start of each cycle.
pub fn portfolio_value() -> f64 {
    if config::utils::is_simulation_mode() {
        return with_config(|c| c.simulation.virtual_balance);
    }
    let cached = f64::from_bits(CACHED_VALUE.load(Ordering::SeqCst));
    if cached > 0.0 {
        cached
    } else {
        with_config(|c| c.portfolio.total_value)
    }
}

/// Fetches the latest valuation from the broker and caches it.
/// On failure the prior cached value (or config fallback) stays in effect.
pub async fn refresh() -> f64 {
    if config::utils::is_simulation_mode() {
        let virtual_balance = with_config(|c| c.simulation.virtual_balance);
        logger::info(
            LogTag::Data,
            &format!("Portfolio value (simulation): ₹{:.2}", virtual_balance),
        );
        return virtual_balance;
    }

    let cash = match broker().get_available_cash().await {
        Ok(cash) => cash,
        Err(e) => {
            logger::error(
                LogTag::Data,
                &format!("Portfolio refresh failed ({}), using prior value", e),
            );
            return portfolio_value();
        }
    };

    let holdings_value = match broker().get_holdings().await {
        Ok(holdings) => holdings.iter().map(|h| h.quantity * h.ltp).sum::<f64>(),
        Err(e) => {
            logger::warning(
                LogTag::Data,
                &format!("Holdings fetch failed ({}), valuing cash only", e),
            );
            0.0
        }
    };

    let total = cash + holdings_value;
    CACHED_VALUE.store(total.to_bits(), Ordering::SeqCst);
    logger::info(
        LogTag::Data,
        &format!(
            "Portfolio value refreshed: cash ₹{:.2} + holdings ₹{:.2} = ₹{:.2}",
            cash, holdings_value, total
        ),
    );
    total
}
