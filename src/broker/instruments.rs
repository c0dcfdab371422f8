//! Instrument registry
//!
//! Downloads the broker scrip-master JSON, keeps a symbol→token map per
//! exchange for tradeable equities only, and swaps the whole registry
//! atomically on reload. Falls back to a built-in NSE short list when the
//! download fails and no previous registry exists.

use crate::config::with_config;
use crate::logger::{self, LogTag};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

const SCRIP_MASTER_URL: &str =
    "https://margincalculator.angelbroking.com/OpenAPI_File/files/OpenAPIScripMaster.json";

#[derive(Debug, Clone)]
pub struct Instrument {
    pub token: String,
    pub symbol: String,
    pub exchange: String,
    pub name: String,
}

#[derive(Default)]
struct Registry {
    // exchange -> symbol -> instrument
    by_exchange: HashMap<String, HashMap<String, Instrument>>,
}

/// Registry state. Readers always observe one complete map; reloads build a
/// whole new registry and replace it in one write.
static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::default()));

/// Built-in fallback used when the scrip master cannot be downloaded
const FALLBACK_NSE_TOKENS: &[(&str, &str)] = &[
    ("RELIANCE", "2885"),
    ("TCS", "11536"),
    ("INFY", "1594"),
    ("HDFCBANK", "1333"),
    ("ICICIBANK", "4963"),
    ("KOTAKBANK", "1922"),
    ("AXISBANK", "5900"),
    ("SBIN", "3045"),
    ("BAJFINANCE", "317"),
    ("HINDUNILVR", "1394"),
    ("ITC", "1660"),
    ("LT", "11483"),
    ("TITAN", "3506"),
    ("ASIANPAINT", "236"),
    ("NESTLEIND", "17963"),
    ("WIPRO", "3787"),
    ("HCLTECH", "7229"),
    ("TECHM", "13538"),
    ("SUNPHARMA", "3351"),
    ("DRREDDY", "881"),
];

// =============================================================================
// PUBLIC API
// =============================================================================

/// Resolves the broker token for a symbol on an exchange
pub async fn resolve_token(symbol: &str, exchange: &str) -> Option<String> {
    let registry = REGISTRY.read().await;
    registry
        .by_exchange
        .get(&exchange.to_uppercase())
        .and_then(|map| map.get(&symbol.to_uppercase()))
        .map(|i| i.token.clone())
}

/// Resolves a token trying NSE first, then BSE
pub async fn resolve_token_any(symbol: &str) -> Option<(String, String)> {
    if let Some(token) = resolve_token(symbol, "NSE").await {
        return Some((token, "NSE".to_string()));
    }
    if let Some(token) = resolve_token(symbol, "BSE").await {
        return Some((token, "BSE".to_string()));
    }
    None
}

/// Returns all equity symbols for an exchange
pub async fn equity_symbols(exchange: &str) -> Vec<String> {
    let registry = REGISTRY.read().await;
    registry
        .by_exchange
        .get(&exchange.to_uppercase())
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

/// Returns the company name for a symbol, falling back to the symbol itself
pub async fn instrument_name(symbol: &str, exchange: &str) -> String {
    let registry = REGISTRY.read().await;
    registry
        .by_exchange
        .get(&exchange.to_uppercase())
        .and_then(|map| map.get(&symbol.to_uppercase()))
        .map(|i| i.name.clone())
        .unwrap_or_else(|| symbol.to_uppercase())
}

/// Total number of loaded equity instruments across exchanges
pub async fn loaded_count() -> usize {
    let registry = REGISTRY.read().await;
    registry.by_exchange.values().map(|m| m.len()).sum()
}

/// Downloads and installs a fresh registry. Called at startup and at the
/// midnight reload trigger.
pub async fn reload_instruments() {
    logger::info(LogTag::Data, "Downloading instrument scrip master");

    let client = match reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(15))
        .timeout(std::time::Duration::from_secs(60))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            logger::error(LogTag::Data, &format!("HTTP client build failed: {}", e));
            install_fallback_if_empty().await;
            return;
        }
    };

    let json = match client
        .get(SCRIP_MASTER_URL)
        .header("Accept", "application/json")
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => match response.json::<Value>().await {
            Ok(v) => v,
            Err(e) => {
                logger::error(
                    LogTag::Data,
                    &format!("Scrip master JSON parse failed: {}", e),
                );
                install_fallback_if_empty().await;
                return;
            }
        },
        Ok(response) => {
            logger::error(
                LogTag::Data,
                &format!("Scrip master download returned HTTP {}", response.status()),
            );
            install_fallback_if_empty().await;
            return;
        }
        Err(e) => {
            logger::error(LogTag::Data, &format!("Scrip master download failed: {}", e));
            install_fallback_if_empty().await;
            return;
        }
    };

    let Some(entries) = json.as_array() else {
        logger::error(LogTag::Data, "Scrip master has unexpected format");
        install_fallback_if_empty().await;
        return;
    };

    let include_bse = with_config(|c| c.filters.include_bse);
    let mut fresh: HashMap<String, HashMap<String, Instrument>> = HashMap::new();

    for entry in entries {
        let exch_seg = entry["exch_seg"].as_str().unwrap_or("").to_uppercase();
        let is_nse = exch_seg == "NSE";
        let is_bse = exch_seg == "BSE" && include_bse;
        if !is_nse && !is_bse {
            continue;
        }

        let raw_symbol = entry["symbol"].as_str().unwrap_or("").trim().to_string();
        let instr_type = entry["instrumenttype"].as_str().unwrap_or("").trim();

        // Equities only: "-EQ" suffix and blank-or-EQ instrument type
        if !raw_symbol.ends_with("-EQ") {
            continue;
        }
        if !instr_type.is_empty() && !instr_type.eq_ignore_ascii_case("EQ") {
            continue;
        }

        let symbol = raw_symbol[..raw_symbol.len() - 3].to_uppercase();
        let token = entry["token"].as_str().unwrap_or("").trim().to_string();
        let name = entry["name"].as_str().unwrap_or("").trim().to_string();
        if symbol.is_empty() || token.is_empty() {
            continue;
        }

        if is_fund_vehicle(&symbol, &name) {
            continue;
        }

        fresh.entry(exch_seg.clone()).or_default().insert(
            symbol.clone(),
            Instrument {
                token,
                symbol,
                exchange: exch_seg.clone(),
                name,
            },
        );
    }

    let nse_count = fresh.get("NSE").map(|m| m.len()).unwrap_or(0);
    let bse_count = fresh.get("BSE").map(|m| m.len()).unwrap_or(0);

    if nse_count == 0 {
        logger::error(LogTag::Data, "Scrip master yielded zero NSE equities");
        install_fallback_if_empty().await;
        return;
    }

    // Atomic swap
    *REGISTRY.write().await = Registry { by_exchange: fresh };

    logger::success(
        LogTag::Data,
        &format!(
            "Instrument registry loaded: {} NSE + {} BSE equities",
            nse_count, bse_count
        ),
    );
}

// =============================================================================
// INTERNAL
// =============================================================================

/// ETFs, index funds and liquid/gilt vehicles are not tradeable equities for
/// this agent. Matched on both name and symbol to catch all listing variants.
fn is_fund_vehicle(symbol: &str, name: &str) -> bool {
    let name_upper = name.to_uppercase();
    let by_name = name_upper.contains("ETF")
        || name_upper.contains("BEES")
        || name_upper.contains("INDEX FUND")
        || name_upper.contains("LIQUID FUND")
        || name_upper.contains("LIQUID BEES")
        || name_upper.contains("GILT FUND");
    let by_symbol = symbol.starts_with("LIQUID")
        || symbol.starts_with("GILT")
        || symbol.ends_with("ETF")
        || symbol.ends_with("IETF")
        || symbol.ends_with("BEES")
        || symbol.contains("NIFTY")
        || symbol.contains("SENSEX");
    by_name || by_symbol
}

/// Keeps the previous registry on failure; installs the built-in short list
/// only when there is nothing at all to work with.
async fn install_fallback_if_empty() {
    let mut registry = REGISTRY.write().await;
    if !registry.by_exchange.is_empty() {
        logger::warning(LogTag::Data, "Keeping previous instrument registry");
        return;
    }

    let mut nse = HashMap::new();
    for (symbol, token) in FALLBACK_NSE_TOKENS {
        nse.insert(
            symbol.to_string(),
            Instrument {
                token: token.to_string(),
                symbol: symbol.to_string(),
                exchange: "NSE".to_string(),
                name: symbol.to_string(),
            },
        );
    }
    registry.by_exchange.insert("NSE".to_string(), nse);

    logger::warning(
        LogTag::Data,
        &format!(
            "Using built-in fallback registry with {} NSE symbols",
            FALLBACK_NSE_TOKENS.len()
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fund_vehicles_filtered() {
        assert!(is_fund_vehicle("NIFTYBEES", "NIPPON INDIA ETF NIFTY BEES"));
        assert!(is_fund_vehicle("LIQUIDCASE", "ZERODHA LIQUID FUND"));
        assert!(is_fund_vehicle("GOLDIETF", "GOLD EXCHANGE TRADED FUND"));
        assert!(is_fund_vehicle("SETFNIF50", "SBI ETF NIFTY 50"));
        assert!(!is_fund_vehicle("RELIANCE", "RELIANCE INDUSTRIES"));
        assert!(!is_fund_vehicle("TCS", "TATA CONSULTANCY SERVICES"));
    }

    #[tokio::test]
    async fn test_fallback_registry_resolves() {
        install_fallback_if_empty().await;
        assert_eq!(
            resolve_token("RELIANCE", "NSE").await,
            Some("2885".to_string())
        );
        assert_eq!(resolve_token("RELIANCE", "BSE").await, None);
        assert!(loaded_count().await >= 20);
        let symbols = equity_symbols("NSE").await;
        assert!(symbols.contains(&"TCS".to_string()));
    }
}
