//! End-to-end pipeline tests over synthetic data
//!
//! Exercises the signal → risk → persistence → monitor path without any
//! network: snapshots are injected directly into the ingestion store and
//! the trade store runs in memory.

use chrono::{Duration, Utc};
use stockagent::analysis::macro_context;
use stockagent::config::schemas::Config;
use stockagent::database::TradeStore;
use stockagent::ingestion;
use stockagent::monitor::compute_trailing_stop;
use stockagent::risk::{self, RiskContext};
use stockagent::signal::{
    compute_risk_reward, compute_stop_loss, compute_target, score_risk_reward,
};
use stockagent::types::{
    new_trade_id, ConfidenceScore, MacroSnapshot, MarketRegime, OhlcvBar, RiskLevel, SignalStatus,
    SignalType, StockSnapshot, TradeProposal, TradeRecord,
};

fn snapshot_with_bars(symbol: &str, bar_count: usize, close: f64) -> StockSnapshot {
    let start = Utc::now() - Duration::days(bar_count as i64);
    let bars: Vec<OhlcvBar> = (0..bar_count)
        .map(|i| OhlcvBar {
            timestamp: start + Duration::days(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 100_000,
        })
        .collect();
    StockSnapshot {
        symbol: symbol.to_string(),
        exchange: "NSE".to_string(),
        ltp: close,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 100_000,
        avg_volume_20d: 100_000.0,
        bars,
        fetched_at: Utc::now(),
    }
}

fn proposal_from_levels(
    symbol: &str,
    entry: f64,
    support: f64,
    resistance: f64,
    fundamental: f64,
    technical: f64,
    macro_score: f64,
) -> TradeProposal {
    let cfg = Config::default();
    let stop = compute_stop_loss(entry, support, cfg.risk.min_stop_loss_pct, cfg.risk.max_stop_loss_pct);
    let target = compute_target(entry, resistance);
    let rr = compute_risk_reward(entry, stop, target);

    let mut confidence = ConfidenceScore {
        fundamental_score: fundamental,
        technical_score: technical,
        macro_score,
        risk_reward_score: score_risk_reward(rr),
        ..Default::default()
    };
    confidence.calculate(&cfg.confidence_weights);

    let portfolio_value = cfg.portfolio.total_value;
    let allocation = portfolio_value * cfg.position_sizing.max_single_stock_pct / 100.0;
    let post_trade_cash =
        portfolio_value * (1.0 - cfg.portfolio.emergency_cash_buffer_pct / 100.0) - allocation;

    let now = Utc::now();
    TradeProposal {
        trade_id: new_trade_id(),
        symbol: symbol.to_string(),
        exchange: "NSE".to_string(),
        signal_type: SignalType::Buy,
        entry_price: entry,
        target_price: target,
        stop_loss_price: stop,
        risk_reward_ratio: rr,
        expected_holding_days: 30,
        risk_level: RiskLevel::Low,
        confidence,
        capital_allocation: allocation,
        capital_allocation_pct: cfg.position_sizing.max_single_stock_pct,
        post_trade_cash,
        cash_buffer_safe: post_trade_cash >= 0.0,
        sector: "Energy".to_string(),
        fundamental_summary: "strong fundamentals".to_string(),
        technical_summary: "constructive setup".to_string(),
        macro_context: "sideways market".to_string(),
        worst_case: String::new(),
        bull_case: String::new(),
        invalidation_level: String::new(),
        status: SignalStatus::PendingApproval,
        generated_at: now,
        expires_at: now + Duration::minutes(cfg.signal.approval_window_minutes),
    }
}

/// Full-cycle arithmetic from the reference scenario: entry 100, support 95,
/// resistance 120, sub-scores 80/70/65 → composite 77, qty 500.
#[test]
fn full_cycle_levels_and_composite() {
    let proposal = proposal_from_levels("RELIANCE", 100.0, 95.0, 120.0, 80.0, 70.0, 65.0);

    assert!((proposal.stop_loss_price - 94.05).abs() < 1e-9);
    assert_eq!(proposal.target_price, 120.0);
    assert!(proposal.risk_reward_ratio >= 3.0);
    assert_eq!(proposal.confidence.risk_reward_score, 100.0);
    assert!((proposal.confidence.composite - 77.0).abs() < 1e-9);

    // Emitted-proposal invariants
    assert!(proposal.target_price > proposal.entry_price);
    assert!(proposal.entry_price > proposal.stop_loss_price);
    assert!(proposal.stop_loss_price > 0.0);
    let sl_pct = (proposal.entry_price - proposal.stop_loss_price) / proposal.entry_price * 100.0;
    assert!((3.0..=15.0).contains(&sl_pct));

    // Risk gate passes with an empty book
    let cfg = Config::default();
    let ctx = RiskContext {
        open_positions: &[],
        portfolio_value: 500_000.0,
        new_buys_this_week: 0,
    };
    let validation = risk::validate(&proposal, &ctx, &cfg);
    assert!(validation.passed, "failures: {:?}", validation.failures);

    // Persist, approve, execute: quantity = floor(50000/100) = 500
    let store = TradeStore::open_in_memory().expect("store");
    let record = TradeRecord::from_proposal(&proposal);
    store.upsert(&record).expect("upsert");
    store.set_status(&proposal.trade_id, "APPROVED").expect("approve");
    store.set_status(&proposal.trade_id, "EXECUTED").expect("execute");

    let open = store.open_positions().expect("open");
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].quantity(), 500);
    assert_eq!(open[0].initial_stop_price, open[0].stop_loss_price);
}

/// A hard fundamental disqualifier (score 0) never reaches the chat: the
/// generator drops the symbol before building a proposal.
#[test]
fn disqualified_fundamentals_drop_before_proposal() {
    use stockagent::analysis::fundamental::{score_fundamentals, FundamentalData};
    use stockagent::config::schemas::FundamentalConfig;

    let mut data = FundamentalData::conservative_default("LEVERED");
    data.debt_to_equity = 3.0; // hard ceiling is 2.0
    let (score, _) = score_fundamentals(&data, &FundamentalConfig::default());
    assert_eq!(score, 0.0);
}

/// Trailing stop walks up with price and survives pullbacks; the database
/// layer refuses any write below the initial stop.
#[test]
fn trailing_stop_monotonic_through_store() {
    let mut proposal = proposal_from_levels("TITAN", 100.0, 95.95, 120.0, 80.0, 70.0, 65.0);
    // round the support-derived stop to an even 95 for readable expectations
    proposal.stop_loss_price = 95.0;

    let store = TradeStore::open_in_memory().expect("store");
    store
        .upsert(&TradeRecord::from_proposal(&proposal))
        .expect("upsert");
    store.set_status(&proposal.trade_id, "EXECUTED").expect("execute");

    let mut observed = Vec::new();
    for price in [100.0, 110.0, 112.0, 108.0, 115.0] {
        let position = store
            .get(&proposal.trade_id)
            .expect("get")
            .expect("found");
        if let Some(new_stop) = compute_trailing_stop(
            position.entry_price,
            position.initial_stop_price,
            position.stop_loss_price,
            price,
            10.0,
        ) {
            store.update_stop(&position.trade_id, new_stop).expect("raise");
        }
        let current = store
            .get(&proposal.trade_id)
            .expect("get")
            .expect("found")
            .stop_loss_price;
        observed.push(current);
    }

    assert_eq!(observed, vec![95.0, 95.0, 107.0, 107.0, 110.0]);
    assert!(observed.windows(2).all(|w| w[1] >= w[0]));
}

/// Stop-loss breach closes the position with the right P&L and no return
/// to any pending state.
#[test]
fn stop_loss_breach_closes_position() {
    let mut proposal = proposal_from_levels("SBIN", 100.0, 95.95, 120.0, 80.0, 70.0, 65.0);
    proposal.stop_loss_price = 95.0;

    let store = TradeStore::open_in_memory().expect("store");
    store
        .upsert(&TradeRecord::from_proposal(&proposal))
        .expect("upsert");
    store.set_status(&proposal.trade_id, "EXECUTED").expect("execute");

    let position = store.get(&proposal.trade_id).expect("get").expect("found");
    let observed_price = 94.5;
    assert!(observed_price <= position.stop_loss_price);

    let quantity = position.quantity();
    let pnl = (observed_price - position.entry_price) * quantity as f64;
    let pnl_pct = (observed_price - position.entry_price) / position.entry_price * 100.0;
    store
        .close_trade(&position.trade_id, observed_price, "STOP_LOSS_HIT", pnl, pnl_pct, false)
        .expect("close");

    let closed = store.get(&proposal.trade_id).expect("get").expect("found");
    assert_eq!(closed.status, "CLOSED");
    assert_eq!(closed.exit_reason.as_deref(), Some("STOP_LOSS_HIT"));
    assert_eq!(closed.exit_price, Some(94.5));
    assert!((closed.realised_pnl.unwrap() - -2750.0).abs() < 1e-6);
    assert!(store.open_positions().expect("open").is_empty());
}

/// Suppressed macro or an empty universe both yield an empty signal set
/// without touching any external provider.
#[tokio::test]
async fn suppression_and_empty_universe_yield_no_signals() {
    // Suppressed macro short-circuits before any per-symbol analysis
    ingestion::publish_macro_snapshot(MacroSnapshot {
        india_vix: 30.0,
        regime: MarketRegime::Bear,
        new_buys_suppressed: true,
        ..MacroSnapshot::neutral()
    })
    .await;
    ingestion::publish_snapshots(vec![snapshot_with_bars("RELIANCE", 250, 100.0)]).await;
    let signals = stockagent::signal::generate_signals().await;
    assert!(signals.is_empty());

    // Calm macro but nothing cached: still an empty set, no crash
    ingestion::publish_macro_snapshot(MacroSnapshot::neutral()).await;
    ingestion::publish_snapshots(Vec::new()).await;
    let signals = stockagent::signal::generate_signals().await;
    assert!(signals.is_empty());
}

/// The macro scorer and the suppression flag agree on the hard-ceiling VIX.
#[test]
fn macro_suppression_flag_consistency() {
    let cfg = Config::default();
    let suppressed = MacroSnapshot {
        india_vix: 28.0,
        new_buys_suppressed: true,
        ..MacroSnapshot::neutral()
    };
    let result = macro_context::analyse(&suppressed, &cfg.macro_thresholds);
    assert!(result.new_buys_suppressed);
    assert_eq!(result.score, 0.0);
}

/// Learning reducers over a closed book produce a coherent summary.
#[test]
fn learning_reducers_over_closed_book() {
    let store = TradeStore::open_in_memory().expect("store");
    for (symbol, exit, reason) in [
        ("WINNER", 112.0, "STOP_LOSS_HIT"), // trailed out in profit
        ("LOSER", 94.5, "STOP_LOSS_HIT"),
    ] {
        let proposal = proposal_from_levels(symbol, 100.0, 95.95, 120.0, 80.0, 70.0, 65.0);
        store
            .upsert(&TradeRecord::from_proposal(&proposal))
            .expect("upsert");
        store.set_status(&proposal.trade_id, "EXECUTED").expect("execute");
        let quantity = 500.0;
        let pnl = (exit - 100.0) * quantity;
        store
            .close_trade(&proposal.trade_id, exit, reason, pnl, exit - 100.0, false)
            .expect("close");
    }

    let closed = store.find_all_closed().expect("closed");
    let stats = stockagent::learning::compute_stats(&closed);
    assert_eq!(stats.total_trades, 2);
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.losses, 1);
    assert!((stats.win_rate_pct - 50.0).abs() < 1e-9);
    assert!((stats.total_pnl - (6000.0 - 2750.0)).abs() < 1e-6);
}
