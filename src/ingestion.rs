//! Data ingestion engine
//!
//! Two-phase pre-market universe scan plus the macro snapshot.
//!
//! Phase 1 filters the full equity universe with batch live quotes (250
//! tokens per call). Phase 2 fetches one year of daily OHLCV for every
//! surviving candidate, capped at 10 concurrent requests and a 10-minute
//! overall deadline. Watchlist symbols bypass both filters.
//!
//! The snapshot store and the macro snapshot are replaced atomically at
//! publication; readers never observe a partially-built store.

use crate::broker::{self, broker};
use crate::config::with_config;
use crate::logger::{self, LogTag};
use crate::types::{MacroSnapshot, MarketRegime, OhlcvBar, StockSnapshot};
use chrono::{Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};

/// Quote batch limit imposed by the broker
const QUOTE_BATCH_SIZE: usize = 250;

/// Phase 2 concurrency cap
const HISTORY_FETCH_CONCURRENCY: usize = 10;

/// Phase 2 overall deadline
const REFRESH_DEADLINE_SECS: u64 = 600;

/// Broker instrument token for the India VIX index
const INDIA_VIX_TOKEN: &str = "26000";

/// Rupees per crore
const CR: f64 = 10_000_000.0;

// =============================================================================
// SHARED STATE
// =============================================================================

/// Per-symbol snapshot store, replaced wholesale at each refresh
static STOCK_CACHE: Lazy<RwLock<Arc<HashMap<String, Arc<StockSnapshot>>>>> =
    Lazy::new(|| RwLock::new(Arc::new(HashMap::new())));

/// Ordered list of symbols analysed in the last refresh (watchlist first)
static ANALYSIS_UNIVERSE: Lazy<RwLock<Vec<String>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// Current macro snapshot
static MACRO_SNAPSHOT: Lazy<RwLock<Option<MacroSnapshot>>> = Lazy::new(|| RwLock::new(None));

/// Refresh reentrancy guard: a second concurrent refresh_all is a no-op
static REFRESH_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

pub fn is_refresh_in_progress() -> bool {
    REFRESH_IN_PROGRESS.load(Ordering::SeqCst)
}

/// Returns the cached snapshot for a symbol
pub async fn stock_snapshot(symbol: &str) -> Option<Arc<StockSnapshot>> {
    let cache = STOCK_CACHE.read().await;
    cache.get(&symbol.to_uppercase()).cloned()
}

/// Returns all cached snapshots, watchlist symbols first, then the rest of
/// the analysis universe in filter order.
pub async fn all_equity_snapshots() -> Vec<Arc<StockSnapshot>> {
    let cache = STOCK_CACHE.read().await;
    let universe = ANALYSIS_UNIVERSE.read().await;
    let watchlist = with_config(|c| c.watchlist.clone());
    let watchlist_set: HashSet<String> = watchlist.iter().map(|s| s.to_uppercase()).collect();

    let mut result = Vec::new();
    for symbol in &watchlist {
        if let Some(snapshot) = cache.get(&symbol.to_uppercase()) {
            if snapshot.ltp > 0.0 {
                result.push(snapshot.clone());
            }
        }
    }
    for symbol in universe.iter() {
        if watchlist_set.contains(symbol) {
            continue;
        }
        if let Some(snapshot) = cache.get(symbol) {
            if snapshot.ltp > 0.0 {
                result.push(snapshot.clone());
            }
        }
    }
    result
}

/// Number of snapshots currently cached
pub async fn cached_symbol_count() -> usize {
    STOCK_CACHE.read().await.len()
}

/// Returns the current macro snapshot, neutral default when none exists
pub async fn macro_snapshot() -> MacroSnapshot {
    MACRO_SNAPSHOT
        .read()
        .await
        .clone()
        .unwrap_or_else(MacroSnapshot::neutral)
}

/// Test/support hook: installs a macro snapshot directly
pub async fn publish_macro_snapshot(snapshot: MacroSnapshot) {
    *MACRO_SNAPSHOT.write().await = Some(snapshot);
}

/// Test/support hook: installs a snapshot store directly
pub async fn publish_snapshots(snapshots: Vec<StockSnapshot>) {
    let mut map = HashMap::new();
    let mut universe = Vec::new();
    for snapshot in snapshots {
        let symbol = snapshot.symbol.to_uppercase();
        universe.push(symbol.clone());
        map.insert(symbol, Arc::new(snapshot));
    }
    *STOCK_CACHE.write().await = Arc::new(map);
    *ANALYSIS_UNIVERSE.write().await = universe;
}

// =============================================================================
// FULL REFRESH
// =============================================================================

/// Refreshes portfolio value, the snapshot store and the macro snapshot.
/// Not reentrant: a concurrent second call observes the in-progress flag and
/// returns immediately.
pub async fn refresh_all() {
    if REFRESH_IN_PROGRESS
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        logger::warning(LogTag::Data, "Refresh already in progress, skipping");
        return;
    }

    logger::info(LogTag::Data, "Starting full data refresh");
    let started = std::time::Instant::now();

    crate::portfolio::refresh().await;
    refresh_universe().await;
    refresh_macro().await;

    REFRESH_IN_PROGRESS.store(false, Ordering::SeqCst);
    logger::success(
        LogTag::Data,
        &format!(
            "Refresh complete: {} symbols cached in {:.0}s",
            cached_symbol_count().await,
            started.elapsed().as_secs_f64()
        ),
    );
}

/// Phase 1 + universe cap + Phase 2, publishing the new store at the end.
async fn refresh_universe() {
    let candidates = phase1_quote_filter().await;

    // Universe cap, preserving the watchlist prefix
    let cap = with_config(|c| c.filters.max_analysis_universe);
    let watchlist_set: HashSet<String> =
        with_config(|c| c.watchlist.iter().map(|s| s.to_uppercase()).collect());

    let mut prioritised: Vec<String> = Vec::new();
    for symbol in &candidates {
        if watchlist_set.contains(symbol) {
            prioritised.push(symbol.clone());
        }
    }
    for symbol in &candidates {
        if !watchlist_set.contains(symbol) && prioritised.len() < cap {
            prioritised.push(symbol.clone());
        }
    }

    logger::info(
        LogTag::Data,
        &format!(
            "Phase 2: fetching 1-year OHLCV for {} symbols (cap {})",
            prioritised.len(),
            cap
        ),
    );

    *ANALYSIS_UNIVERSE.write().await = prioritised.clone();

    let min_volume_cr = with_config(|c| c.filters.min_avg_daily_volume_cr);
    let semaphore = Arc::new(Semaphore::new(HISTORY_FETCH_CONCURRENCY));
    let building: Arc<Mutex<HashMap<String, Arc<StockSnapshot>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let mut handles = Vec::new();
    for symbol in prioritised {
        let semaphore = semaphore.clone();
        let building = building.clone();
        let watchlisted = watchlist_set.contains(&symbol);

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let Some(snapshot) = fetch_stock_snapshot(&symbol).await else {
                return;
            };
            // 200-period indicators need a minimum history
            if snapshot.bars.len() < crate::analysis::technical::MIN_BARS {
                return;
            }
            // 20-day average traded value filter, more precise than Phase 1
            let avg_traded_cr = snapshot.avg_volume_20d * snapshot.ltp / CR;
            if watchlisted || avg_traded_cr >= min_volume_cr {
                building
                    .lock()
                    .await
                    .insert(symbol.to_uppercase(), Arc::new(snapshot));
            }
        }));
    }

    let total = handles.len();
    let deadline = Duration::from_secs(REFRESH_DEADLINE_SECS);
    let all_done = tokio::time::timeout(deadline, async {
        for handle in &mut handles {
            let _ = handle.await;
        }
    })
    .await;

    if all_done.is_err() {
        for handle in &handles {
            handle.abort();
        }
        logger::warning(
            LogTag::Data,
            &format!(
                "Phase 2 deadline expired after {}s, publishing partial store ({} of {} symbols)",
                REFRESH_DEADLINE_SECS,
                building.lock().await.len(),
                total
            ),
        );
    }

    let fresh = {
        let mut guard = building.lock().await;
        std::mem::take(&mut *guard)
    };
    let count = fresh.len();

    // Atomic publication
    *STOCK_CACHE.write().await = Arc::new(fresh);

    logger::info(LogTag::Data, &format!("Phase 2 complete: {} symbols cached", count));
}

// =============================================================================
// PHASE 1: BATCH QUOTE FILTER
// =============================================================================

/// Filters the universe with live quotes: keep a symbol iff its last price
/// and day traded value clear the configured floors. Watchlist symbols are
/// admitted unconditionally and come first in the result.
async fn phase1_quote_filter() -> Vec<String> {
    let (min_price, min_volume_cr, include_bse, watchlist) = with_config(|c| {
        (
            c.filters.min_stock_price,
            c.filters.min_avg_daily_volume_cr,
            c.filters.include_bse,
            c.watchlist.clone(),
        )
    });

    let watchlist_set: HashSet<String> = watchlist.iter().map(|s| s.to_uppercase()).collect();
    let mut candidates: Vec<String> = watchlist.iter().map(|s| s.to_uppercase()).collect();
    let mut seen = watchlist_set.clone();

    let mut exchanges = vec!["NSE"];
    if include_bse {
        exchanges.push("BSE");
    }

    for exchange in exchanges {
        let symbols = broker::equity_symbols(exchange).await;
        logger::info(
            LogTag::Data,
            &format!("Phase 1: scanning {} {} symbols via live quotes", symbols.len(), exchange),
        );

        // Token list with a reverse map back to symbols
        let mut token_list = Vec::new();
        let mut token_to_symbol = HashMap::new();
        for symbol in &symbols {
            if let Some(token) = broker::resolve_token(symbol, exchange).await {
                token_to_symbol.insert(token.clone(), symbol.clone());
                token_list.push(token);
            }
        }

        for batch in token_list.chunks(QUOTE_BATCH_SIZE) {
            match broker().get_quote(exchange, batch).await {
                Ok(ticks) => {
                    for tick in ticks {
                        let Some(symbol) = token_to_symbol.get(&tick.symbol_token) else {
                            continue;
                        };
                        if seen.contains(symbol) {
                            continue;
                        }
                        let traded_cr = tick.total_traded_value / CR;
                        if tick.ltp >= min_price && traded_cr >= min_volume_cr {
                            seen.insert(symbol.clone());
                            candidates.push(symbol.clone());
                        }
                    }
                }
                Err(e) => {
                    // A failed batch is lost, not the whole phase
                    logger::warning(
                        LogTag::Data,
                        &format!("Phase 1 quote batch failed on {}: {}", exchange, e),
                    );
                }
            }
        }
    }

    logger::info(
        LogTag::Data,
        &format!("Phase 1 complete: {} candidates pass price/volume filter", candidates.len()),
    );
    candidates
}

// =============================================================================
// PHASE 2: PER-SYMBOL SNAPSHOT
// =============================================================================

/// Fetches one year of daily candles and builds a snapshot.
/// Returns None when the symbol cannot be resolved or has no history.
pub async fn fetch_stock_snapshot(symbol: &str) -> Option<StockSnapshot> {
    let symbol = symbol.to_uppercase();
    let Some((token, exchange)) = broker::resolve_token_any(&symbol).await else {
        logger::debug(LogTag::Data, &format!("No instrument token for {}", symbol));
        return None;
    };

    let to_date = Utc::now().format("%Y-%m-%d %H:%M").to_string();
    let from_date = (Utc::now() - ChronoDuration::days(365))
        .format("%Y-%m-%d %H:%M")
        .to_string();

    let bars = match broker()
        .get_candles(&exchange, &token, "ONE_DAY", &from_date, &to_date)
        .await
    {
        Ok(bars) => bars,
        Err(e) => {
            logger::debug(LogTag::Data, &format!("History fetch failed for {}: {}", symbol, e));
            return None;
        }
    };

    let latest = bars.last()?.clone();
    let avg_volume_20d = average_volume(&bars, 20);

    Some(StockSnapshot {
        symbol,
        exchange,
        ltp: latest.close,
        open: latest.open,
        high: latest.high,
        low: latest.low,
        close: latest.close,
        volume: latest.volume,
        avg_volume_20d,
        bars,
        fetched_at: Utc::now(),
    })
}

/// Fetches a fresh snapshot bypassing the cache and stores it.
/// Used by the on-demand analysis endpoint.
pub async fn fetch_snapshot_fresh(symbol: &str) -> Option<Arc<StockSnapshot>> {
    let snapshot = Arc::new(fetch_stock_snapshot(symbol).await?);
    let mut cache_guard = STOCK_CACHE.write().await;
    let mut fresh: HashMap<String, Arc<StockSnapshot>> = (**cache_guard).clone();
    fresh.insert(snapshot.symbol.clone(), snapshot.clone());
    *cache_guard = Arc::new(fresh);
    Some(snapshot)
}

fn average_volume(bars: &[OhlcvBar], days: usize) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    let window = if bars.len() < days {
        bars
    } else {
        &bars[bars.len() - days..]
    };
    window.iter().map(|b| b.volume as f64).sum::<f64>() / window.len() as f64
}

// =============================================================================
// MACRO SNAPSHOT
// =============================================================================

/// Rebuilds the macro snapshot: NIFTY series from the secondary provider,
/// India VIX from broker history. Installs the neutral default on failure.
async fn refresh_macro() {
    let (vix_no_buys, vix_caution, vix_favorable) = with_config(|c| {
        (
            c.macro_thresholds.vix_no_buys_threshold,
            c.macro_thresholds.vix_caution_threshold,
            c.macro_thresholds.vix_favorable_threshold,
        )
    });

    let nifty_closes = fetch_nifty_closes().await;
    if nifty_closes.is_empty() {
        logger::warning(LogTag::Data, "Macro refresh failed, installing neutral default");
        *MACRO_SNAPSHOT.write().await = Some(MacroSnapshot::neutral());
        return;
    }

    let nifty_price = *nifty_closes.last().unwrap_or(&0.0);
    let nifty_dma200 = simple_mean_tail(&nifty_closes, 200);
    let pct_above = if nifty_dma200 > 0.0 {
        (nifty_price - nifty_dma200) / nifty_dma200 * 100.0
    } else {
        0.0
    };

    let india_vix = fetch_india_vix().await;
    let regime = determine_regime(india_vix, nifty_price, nifty_dma200, vix_no_buys, vix_caution, vix_favorable);
    let new_buys_suppressed = india_vix > vix_no_buys || nifty_price < nifty_dma200 * 0.95;

    let snapshot = MacroSnapshot {
        date: Utc::now().date_naive(),
        india_vix,
        nifty_price,
        nifty_dma200,
        nifty_pct_above_dma200: pct_above,
        fii_net_flow_cr: 0.0,
        consecutive_fii_selling_days: 0,
        regime,
        new_buys_suppressed,
    };

    logger::info(
        LogTag::Data,
        &format!(
            "Macro refresh: Nifty={:.0} VIX={:.1} Regime={} BuysSuppressed={}",
            nifty_price,
            india_vix,
            regime.as_str(),
            new_buys_suppressed
        ),
    );

    *MACRO_SNAPSHOT.write().await = Some(snapshot);
}

/// Regime table over VIX and the index position vs its 200-day mean
pub fn determine_regime(
    vix: f64,
    index_price: f64,
    index_dma200: f64,
    vix_no_buys: f64,
    vix_caution: f64,
    vix_favorable: f64,
) -> MarketRegime {
    if vix > vix_no_buys && index_price < index_dma200 {
        return MarketRegime::Bear;
    }
    if vix > vix_caution {
        return MarketRegime::HighVolatility;
    }
    if index_price > index_dma200 * 1.05 && vix < vix_favorable {
        return MarketRegime::Bull;
    }
    MarketRegime::Sideways
}

/// Daily NIFTY 50 closes for the trailing year from the Yahoo chart API
async fn fetch_nifty_closes() -> Vec<f64> {
    let url = "https://query1.finance.yahoo.com/v8/finance/chart/%5ENSEI?interval=1d&range=1y";

    let client = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(15))
        .build()
    {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    let response = match client
        .get(url)
        .header(
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
        )
        .header("Accept", "application/json")
        .send()
        .await
    {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            logger::warning(LogTag::Data, &format!("NIFTY fetch returned HTTP {}", r.status()));
            return Vec::new();
        }
        Err(e) => {
            logger::warning(LogTag::Data, &format!("NIFTY fetch failed: {}", e));
            return Vec::new();
        }
    };

    let Ok(root) = response.json::<Value>().await else {
        return Vec::new();
    };

    let mut closes = Vec::new();
    if let Some(quote) = root["chart"]["result"][0]["indicators"]["quote"][0]["close"].as_array() {
        for value in quote {
            if let Some(close) = value.as_f64() {
                if close > 0.0 {
                    closes.push(close);
                }
            }
        }
    }
    logger::debug(LogTag::Data, &format!("NIFTY: fetched {} closes", closes.len()));
    closes
}

/// Last close of the India VIX index from broker history; 15.0 neutral
/// fallback when unavailable.
async fn fetch_india_vix() -> f64 {
    let to_date = Utc::now().format("%Y-%m-%d %H:%M").to_string();
    let from_date = (Utc::now() - ChronoDuration::days(5))
        .format("%Y-%m-%d %H:%M")
        .to_string();

    match broker()
        .get_candles("NSE", INDIA_VIX_TOKEN, "ONE_DAY", &from_date, &to_date)
        .await
    {
        Ok(bars) => bars.last().map(|b| b.close).unwrap_or(15.0),
        Err(e) => {
            logger::debug(LogTag::Data, &format!("India VIX fetch failed: {}", e));
            15.0
        }
    }
}

fn simple_mean_tail(values: &[f64], period: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let window = if values.len() < period {
        values
    } else {
        &values[values.len() - period..]
    };
    window.iter().sum::<f64>() / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regime_table() {
        // vix > no-buys and index below mean → BEAR
        assert_eq!(
            determine_regime(28.0, 20_000.0, 21_000.0, 25.0, 20.0, 15.0),
            MarketRegime::Bear
        );
        // vix above caution alone → HIGH_VOLATILITY
        assert_eq!(
            determine_regime(22.0, 22_000.0, 21_000.0, 25.0, 20.0, 15.0),
            MarketRegime::HighVolatility
        );
        // strong index, calm vix → BULL
        assert_eq!(
            determine_regime(12.0, 23_000.0, 21_000.0, 25.0, 20.0, 15.0),
            MarketRegime::Bull
        );
        // otherwise SIDEWAYS
        assert_eq!(
            determine_regime(16.0, 21_200.0, 21_000.0, 25.0, 20.0, 15.0),
            MarketRegime::Sideways
        );
    }

    #[test]
    fn test_mean_tail_and_average_volume() {
        let values: Vec<f64> = (1..=300).map(|v| v as f64).collect();
        let mean = simple_mean_tail(&values, 200);
        // mean of 101..=300
        assert!((mean - 200.5).abs() < 1e-9);

        let bars: Vec<OhlcvBar> = (0..30)
            .map(|i| OhlcvBar {
                timestamp: Utc::now(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 100 + i,
            })
            .collect();
        let avg = average_volume(&bars, 20);
        // last 20 volumes are 110..=129
        assert!((avg - 119.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_publish_and_read_snapshots() {
        let snapshot = StockSnapshot {
            symbol: "testsym".to_string(),
            exchange: "NSE".to_string(),
            ltp: 100.0,
            open: 99.0,
            high: 101.0,
            low: 98.0,
            close: 100.0,
            volume: 1000,
            avg_volume_20d: 900.0,
            bars: Vec::new(),
            fetched_at: Utc::now(),
        };
        publish_snapshots(vec![snapshot]).await;
        let loaded = stock_snapshot("TESTSYM").await.expect("cached");
        assert_eq!(loaded.ltp, 100.0);
    }

    #[tokio::test]
    async fn test_macro_neutral_default() {
        let snapshot = macro_snapshot().await;
        assert!(snapshot.india_vix > 0.0);
    }
}
