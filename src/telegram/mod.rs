//! Telegram integration
//!
//! The bot is the operator's control surface: pre-trade reports go out, and
//! APPROVE/REJECT/STATUS/POSITIONS replies come back through a long-poll
//! loop whose update offset is persisted across restarts.

pub mod bot;
pub mod commands;
pub mod poller;
pub mod report;

pub use bot::{init_bot, is_configured, send_alert, send_message, test_connection};
pub use commands::{parse_command, OperatorCommand};
