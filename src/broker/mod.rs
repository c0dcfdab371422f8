//! Angel One SmartAPI integration
//!
//! REST client (session login, quotes, candles, orders, funds) plus the
//! instrument registry built from the daily scrip-master download.

pub mod client;
pub mod instruments;
pub mod totp;

pub use client::{broker, BrokerClient, HoldingLine, QuoteTick};
pub use instruments::{
    equity_symbols, instrument_name, loaded_count, reload_instruments, resolve_token,
    resolve_token_any,
};
