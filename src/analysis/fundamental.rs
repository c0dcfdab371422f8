//! Fundamental analysis scorer
//!
//! Evaluates business quality over a multi-year window. Data comes from the
//! Yahoo Finance quoteSummary API (cookie + crumb bootstrap); concurrent
//! fetches are capped at 5 so bulk analysis does not trip provider rate
//! limits. Missing inputs take conservative defaults.

use crate::config::schemas::FundamentalConfig;
use crate::logger::{self, LogTag};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};

/// Concurrent provider calls allowed during bulk analysis
const PROVIDER_CONCURRENCY: usize = 5;

static PROVIDER_SEMAPHORE: Lazy<Semaphore> = Lazy::new(|| Semaphore::new(PROVIDER_CONCURRENCY));

/// Cookie-holding HTTP client; the provider requires a session cookie plus a
/// crumb query parameter on every data call.
static PROVIDER_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(15))
        .cookie_store(true)
        .build()
        .unwrap_or_default()
});

static CRUMB: Lazy<RwLock<Option<String>>> = Lazy::new(|| RwLock::new(None));

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// Fundamental ratios for one company
#[derive(Debug, Clone, Default)]
pub struct FundamentalData {
    pub symbol: String,
    pub revenue_cagr_3y: f64,
    pub net_profit_cagr_3y: f64,
    pub roe: f64,
    pub roce: f64,
    pub debt_to_equity: f64,
    pub positive_cf_years: u32,
    pub promoter_holding_pct: f64,
    pub promoter_pledged_pct: f64,
    pub pe_ratio: f64,
    pub pb_ratio: f64,
    pub peg_ratio: f64,
    pub sector_median_pe: f64,
    pub sector: String,
    pub sector_outlook_score: f64,
}

impl FundamentalData {
    /// Conservative defaults when the provider has nothing for a symbol
    pub fn conservative_default(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            revenue_cagr_3y: 10.0,
            net_profit_cagr_3y: 0.0,
            roe: 15.0,
            roce: 12.0,
            debt_to_equity: 0.5,
            positive_cf_years: 3,
            promoter_holding_pct: 45.0,
            promoter_pledged_pct: 0.0,
            pe_ratio: 20.0,
            pb_ratio: 3.0,
            peg_ratio: 1.2,
            sector_median_pe: 22.0,
            sector: "Unknown".to_string(),
            sector_outlook_score: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FundamentalResult {
    pub score: f64,
    pub summary: String,
    pub data: FundamentalData,
}

/// Fetches fundamentals and scores them, 0-100.
/// The hard D/E disqualifier returns 0 regardless of other factors.
pub async fn analyse(symbol: &str, cfg: &FundamentalConfig) -> FundamentalResult {
    let data = fetch_fundamentals(symbol).await;
    let (score, summary) = score_fundamentals(&data, cfg);
    FundamentalResult {
        score,
        summary,
        data,
    }
}

/// Pure scoring over fetched ratios
pub fn score_fundamentals(data: &FundamentalData, cfg: &FundamentalConfig) -> (f64, String) {
    // Hard disqualifier first
    if data.debt_to_equity > cfg.hard_max_debt_to_equity {
        return (
            0.0,
            format!(
                "D/E={:.1} exceeds hard limit of {:.1}, disqualified",
                data.debt_to_equity, cfg.hard_max_debt_to_equity
            ),
        );
    }

    let mut score = 0.0;
    let mut summary = String::new();

    // Revenue growth (max 20 pts)
    if data.revenue_cagr_3y >= cfg.min_revenue_cagr_3y_pct {
        if data.revenue_cagr_3y >= 20.0 {
            score += 20.0;
        } else if data.revenue_cagr_3y >= 15.0 {
            score += 15.0;
        } else {
            score += 10.0;
        }
        summary.push_str(&format!("Rev CAGR {:.0}% ok. ", data.revenue_cagr_3y));
    } else {
        score += (data.revenue_cagr_3y * 0.5).max(0.0); // partial credit
        summary.push_str(&format!("Rev CAGR {:.0}% below min. ", data.revenue_cagr_3y));
    }

    // Profitability (max 20 pts combined)
    let roe_pts = if data.roe >= cfg.min_roe_pct {
        10.0
    } else if data.roe >= 10.0 {
        5.0
    } else {
        0.0
    };
    let roce_pts = if data.roce >= cfg.min_roce_pct {
        10.0
    } else if data.roce >= 8.0 {
        5.0
    } else {
        0.0
    };
    score += roe_pts + roce_pts;
    summary.push_str(&format!("ROE {:.0}% ROCE {:.0}%", data.roe, data.roce));
    summary.push_str(if roe_pts + roce_pts >= 15.0 {
        " ok. "
    } else {
        " (below target). "
    });

    // Leverage (max 15 pts)
    if data.debt_to_equity <= 0.3 {
        score += 15.0;
        summary.push_str("Debt-free. ");
    } else if data.debt_to_equity <= cfg.max_debt_to_equity {
        score += 10.0;
        summary.push_str("D/E ok. ");
    } else {
        score += 3.0;
        summary.push_str(&format!("D/E={:.1} elevated. ", data.debt_to_equity));
    }

    // Cash-flow consistency (max 15 pts)
    if data.positive_cf_years >= 4 {
        score += 15.0;
        summary.push_str("Consistent OCF. ");
    } else if data.positive_cf_years >= 3 {
        score += 10.0;
    } else {
        score += 2.0;
        summary.push_str("Inconsistent cash flow. ");
    }

    // Promoter holding (+10 / -10)
    if data.promoter_pledged_pct > 50.0 {
        score -= 10.0;
        summary.push_str("High promoter pledge. ");
    } else if data.promoter_holding_pct >= cfg.min_promoter_holding_pct {
        score += 10.0;
        summary.push_str(&format!("Promoter {:.0}%. ", data.promoter_holding_pct));
    } else {
        score += 5.0;
    }

    // Valuation (max 10 pts)
    let mut good_valuation = false;
    if data.pe_ratio > 0.0 && data.sector_median_pe > 0.0 {
        if data.pe_ratio <= data.sector_median_pe * 1.1 {
            score += 7.0;
            good_valuation = true;
        } else if data.pe_ratio <= data.sector_median_pe * 1.3 {
            score += 4.0;
        }
    }
    if data.peg_ratio > 0.0 && data.peg_ratio <= cfg.max_peg_ratio {
        score += 3.0;
        good_valuation = true;
    }
    if good_valuation {
        summary.push_str(&format!(
            "PE={:.0} PEG={:.1} valuation ok. ",
            data.pe_ratio, data.peg_ratio
        ));
    } else {
        summary.push_str("Valuation stretched. ");
    }

    // Sector outlook (max 10 pts)
    score += data.sector_outlook_score;

    (score.clamp(0.0, 100.0), summary.trim().to_string())
}

// =============================================================================
// PROVIDER FETCH
// =============================================================================

/// Fetches fundamentals for an NSE symbol, falling back to conservative
/// defaults whenever the provider is unreachable or incomplete.
async fn fetch_fundamentals(symbol: &str) -> FundamentalData {
    let Ok(_permit) = PROVIDER_SEMAPHORE.acquire().await else {
        return FundamentalData::conservative_default(symbol);
    };

    if CRUMB.read().await.is_none() {
        init_credentials().await;
    }
    let crumb = match CRUMB.read().await.clone() {
        Some(crumb) => crumb,
        None => {
            logger::warning(
                LogTag::Analysis,
                &format!("Provider crumb unavailable, defaults for {}", symbol),
            );
            return FundamentalData::conservative_default(symbol);
        }
    };

    let mut financial = call_quote_summary(symbol, "financialData,defaultKeyStatistics", &crumb).await;
    if financial.is_none() {
        // One credential refresh and retry
        *CRUMB.write().await = None;
        init_credentials().await;
        if let Some(fresh_crumb) = CRUMB.read().await.clone() {
            financial =
                call_quote_summary(symbol, "financialData,defaultKeyStatistics", &fresh_crumb).await;
        }
    }
    let Some(financial) = financial else {
        return FundamentalData::conservative_default(symbol);
    };

    let valuation = call_quote_summary(symbol, "summaryDetail,assetProfile", &crumb)
        .await
        .unwrap_or(Value::Null);

    parse_provider_response(symbol, &financial, &valuation)
}

/// Bootstraps the provider session cookie and crumb
async fn init_credentials() {
    // Visiting the root domain stores the session cookies
    let _ = PROVIDER_CLIENT
        .get("https://fc.yahoo.com")
        .header("User-Agent", USER_AGENT)
        .send()
        .await;

    match PROVIDER_CLIENT
        .get("https://query2.finance.yahoo.com/v1/test/getcrumb")
        .header("User-Agent", USER_AGENT)
        .header("Accept", "text/plain")
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            if let Ok(text) = response.text().await {
                let crumb = text.trim().to_string();
                if !crumb.is_empty() && !crumb.starts_with('{') {
                    logger::debug(
                        LogTag::Analysis,
                        &format!("Provider credentials initialised (crumb length {})", crumb.len()),
                    );
                    *CRUMB.write().await = Some(crumb);
                }
            }
        }
        Ok(response) => {
            logger::warning(
                LogTag::Analysis,
                &format!("Provider crumb request returned HTTP {}", response.status()),
            );
        }
        Err(e) => {
            logger::warning(LogTag::Analysis, &format!("Provider crumb request failed: {}", e));
        }
    }
}

/// One quoteSummary call; returns the first result node or None
async fn call_quote_summary(symbol: &str, modules: &str, crumb: &str) -> Option<Value> {
    let url = format!(
        "https://query2.finance.yahoo.com/v10/finance/quoteSummary/{}.NS?modules={}&crumb={}",
        symbol,
        modules,
        urlencode(crumb)
    );

    let response = PROVIDER_CLIENT
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/json")
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        logger::debug(
            LogTag::Analysis,
            &format!("Provider [{}] returned {} for {}", modules, response.status(), symbol),
        );
        return None;
    }
    let root = response.json::<Value>().await.ok()?;
    let result = &root["quoteSummary"]["result"];
    result.as_array()?.first().cloned()
}

fn parse_provider_response(symbol: &str, financial_node: &Value, valuation_node: &Value) -> FundamentalData {
    let financial = &financial_node["financialData"];
    let key_stats = &financial_node["defaultKeyStatistics"];
    let summary = &valuation_node["summaryDetail"];
    let profile = &valuation_node["assetProfile"];

    // D/E comes back as a percentage (35.65 means 0.356)
    let mut de_raw = raw(key_stats, "debtToEquity");
    if de_raw <= 0.0 {
        de_raw = raw(financial, "debtToEquity");
    }
    let debt_to_equity = if de_raw > 0.0 { de_raw / 100.0 } else { 0.5 };

    // ROE is often absent for NSE listings; approximate from EPS / book value
    let roe_direct = raw(financial, "returnOnEquity") * 100.0;
    let roe = if roe_direct != 0.0 {
        roe_direct
    } else {
        let eps = raw(key_stats, "trailingEps");
        let book_value = raw(key_stats, "bookValue");
        if eps > 0.0 && book_value > 0.0 {
            eps / book_value * 100.0
        } else {
            0.0
        }
    };

    let roce_approx = raw(financial, "returnOnAssets") * 150.0;
    let roce = if roce_approx > 0.0 { roce_approx } else { roe * 0.8 };

    let pe = raw(summary, "trailingPE");
    let revenue_growth = raw(financial, "revenueGrowth") * 100.0;
    let operating_cf = raw(financial, "operatingCashflow");
    // A business reporting gross profit almost certainly has positive OCF
    let positive_ocf = operating_cf > 0.0 || raw(financial, "grossProfits") > 0.0;

    let sector = profile["sector"].as_str().unwrap_or("Unknown").to_string();

    FundamentalData {
        symbol: symbol.to_string(),
        revenue_cagr_3y: if revenue_growth > 0.0 { revenue_growth } else { 8.0 },
        net_profit_cagr_3y: raw(financial, "earningsGrowth") * 100.0,
        roe,
        roce,
        debt_to_equity,
        positive_cf_years: if positive_ocf { 4 } else { 2 },
        promoter_holding_pct: 50.0,
        promoter_pledged_pct: 0.0,
        pe_ratio: pe,
        pb_ratio: raw(summary, "priceToBook"),
        peg_ratio: raw(key_stats, "pegRatio"),
        sector_median_pe: if pe > 0.0 { pe * 1.1 } else { 22.0 },
        sector,
        sector_outlook_score: 5.0,
    }
}

fn raw(node: &Value, field: &str) -> f64 {
    node[field]["raw"].as_f64().unwrap_or(0.0)
}

fn urlencode(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
