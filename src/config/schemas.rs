//! Configuration schema definitions
//!
//! Each section maps to a `[table]` in config.toml. Defaults mirror the
//! values the agent was tuned with; every field can be overridden in the
//! file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Plain values stay ahead of the table sections so the file round-trips
    // through the TOML serializer
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub position_sizing: PositionSizingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub confidence_weights: ConfidenceWeights,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub fundamental: FundamentalConfig,
    #[serde(default)]
    pub technical: TechnicalConfig,
    #[serde(default, rename = "macro")]
    pub macro_thresholds: MacroConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub webserver: WebserverConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watchlist: default_watchlist(),
            portfolio: PortfolioConfig::default(),
            position_sizing: PositionSizingConfig::default(),
            risk: RiskConfig::default(),
            signal: SignalConfig::default(),
            confidence_weights: ConfidenceWeights::default(),
            filters: FiltersConfig::default(),
            fundamental: FundamentalConfig::default(),
            technical: TechnicalConfig::default(),
            macro_thresholds: MacroConfig::default(),
            execution: ExecutionConfig::default(),
            simulation: SimulationConfig::default(),
            broker: BrokerConfig::default(),
            telegram: TelegramConfig::default(),
            webserver: WebserverConfig::default(),
        }
    }
}

fn default_watchlist() -> Vec<String> {
    vec![
        "RELIANCE".to_string(),
        "TCS".to_string(),
        "INFY".to_string(),
        "HDFCBANK".to_string(),
        "ICICIBANK".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub total_value: f64,
    pub emergency_cash_buffer_pct: f64,
    pub max_open_positions: u32,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            total_value: 500_000.0,
            emergency_cash_buffer_pct: 20.0,
            max_open_positions: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizingConfig {
    pub max_single_stock_pct: f64,
    pub max_sector_pct: f64,
    pub min_position_size: f64,
    pub hard_cap_single_stock_pct: f64,
}

impl Default for PositionSizingConfig {
    fn default() -> Self {
        Self {
            max_single_stock_pct: 10.0,
            max_sector_pct: 25.0,
            min_position_size: 5_000.0,
            hard_cap_single_stock_pct: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_single_trade_drawdown_pct: f64,
    pub max_portfolio_drawdown_pct: f64,
    pub min_stop_loss_pct: f64,
    pub max_stop_loss_pct: f64,
    pub min_risk_reward_ratio: f64,
    pub trailing_stop_activate_pct: f64,
    pub max_new_buys_per_week: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_single_trade_drawdown_pct: 15.0,
            max_portfolio_drawdown_pct: 20.0,
            min_stop_loss_pct: 3.0,
            max_stop_loss_pct: 15.0,
            min_risk_reward_ratio: 2.0,
            trailing_stop_activate_pct: 10.0,
            max_new_buys_per_week: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub min_confidence_to_notify: f64,
    pub auto_execute_threshold: f64,
    pub approval_window_minutes: i64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_confidence_to_notify: 60.0,
            auto_execute_threshold: 90.0,
            approval_window_minutes: 30,
        }
    }
}

/// The four weights must sum to 1.0; `validate()` is checked at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub fundamental: f64,
    pub technical: f64,
    pub macro_regime: f64,
    pub risk_reward: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            fundamental: 0.35,
            technical: 0.30,
            macro_regime: 0.20,
            risk_reward: 0.15,
        }
    }
}

impl ConfidenceWeights {
    pub fn validate(&self) -> Result<(), String> {
        let sum = self.fundamental + self.technical + self.macro_regime + self.risk_reward;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("confidence_weights must sum to 1.0 (got {})", sum));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    pub min_stock_price: f64,
    /// Minimum daily traded value, in crores
    pub min_avg_daily_volume_cr: f64,
    pub include_bse: bool,
    pub max_analysis_universe: usize,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            min_stock_price: 10.0,
            min_avg_daily_volume_cr: 1.0,
            include_bse: false,
            max_analysis_universe: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalConfig {
    pub min_revenue_cagr_3y_pct: f64,
    pub min_roe_pct: f64,
    pub min_roce_pct: f64,
    pub max_debt_to_equity: f64,
    pub hard_max_debt_to_equity: f64,
    pub min_promoter_holding_pct: f64,
    pub max_peg_ratio: f64,
}

impl Default for FundamentalConfig {
    fn default() -> Self {
        Self {
            min_revenue_cagr_3y_pct: 10.0,
            min_roe_pct: 15.0,
            min_roce_pct: 12.0,
            max_debt_to_equity: 1.0,
            hard_max_debt_to_equity: 2.0,
            min_promoter_holding_pct: 40.0,
            max_peg_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalConfig {
    pub dma_long: usize,
    pub dma_medium: usize,
    pub dma_short: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub max_pct_above_200dma: f64,
}

impl Default for TechnicalConfig {
    fn default() -> Self {
        Self {
            dma_long: 200,
            dma_medium: 50,
            dma_short: 20,
            rsi_period: 14,
            rsi_overbought: 75.0,
            rsi_oversold: 40.0,
            max_pct_above_200dma: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroConfig {
    pub vix_no_buys_threshold: f64,
    pub vix_caution_threshold: f64,
    pub vix_favorable_threshold: f64,
    pub fii_selling_days_threshold: u32,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            vix_no_buys_threshold: 25.0,
            vix_caution_threshold: 20.0,
            vix_favorable_threshold: 15.0,
            fii_selling_days_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub auto_mode: bool,
    pub order_type: String,
    pub allow_margin: bool,
    pub order_fill_timeout_minutes: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            auto_mode: false,
            order_type: "LIMIT".to_string(),
            allow_margin: false,
            order_fill_timeout_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub virtual_balance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            virtual_balance: 500_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub api_key: String,
    pub client_id: String,
    pub mpin: String,
    pub totp_secret: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            client_id: String::new(),
            mpin: String::new(),
            totp_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub poll_interval_seconds: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            poll_interval_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebserverConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for WebserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!(ConfidenceWeights::default().validate().is_ok());
    }

    #[test]
    fn test_bad_weights_rejected() {
        let weights = ConfidenceWeights {
            fundamental: 0.5,
            technical: 0.5,
            macro_regime: 0.5,
            risk_reward: 0.5,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).expect("serialize");
        let parsed: Config = toml::from_str(&serialized).expect("parse");
        assert_eq!(
            parsed.portfolio.total_value,
            config.portfolio.total_value
        );
        assert_eq!(parsed.watchlist, config.watchlist);
        assert_eq!(
            parsed.macro_thresholds.vix_no_buys_threshold,
            config.macro_thresholds.vix_no_buys_threshold
        );
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let parsed: Config = toml::from_str("").expect("parse empty");
        assert_eq!(parsed.signal.min_confidence_to_notify, 60.0);
        assert_eq!(parsed.filters.max_analysis_universe, 500);
        assert!(parsed.simulation.enabled);
    }
}
