//! Telegram bot instance management
//!
//! Wraps the teloxide Bot: creation, token validation, and message sending
//! to the configured operator chat.

use crate::config::with_config;
use crate::logger::{self, LogTag};
use once_cell::sync::Lazy;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode};
use tokio::sync::RwLock;

/// Global bot instance. None until init_bot validates the token.
static BOT: Lazy<RwLock<Option<Bot>>> = Lazy::new(|| RwLock::new(None));

/// True when both a bot token and a chat id are configured
pub fn is_configured() -> bool {
    with_config(|c| !c.telegram.bot_token.is_empty() && !c.telegram.chat_id.is_empty())
}

/// Initializes the global bot, validating the token via getMe.
/// A missing token disables Telegram without failing startup.
pub async fn init_bot() -> Result<(), String> {
    let token = with_config(|c| c.telegram.bot_token.clone());
    if token.is_empty() {
        logger::info(LogTag::Telegram, "No bot token configured, Telegram disabled");
        return Ok(());
    }

    let bot = Bot::new(&token);
    match bot.get_me().await {
        Ok(me) => {
            logger::success(
                LogTag::Telegram,
                &format!(
                    "Bot initialized: @{}",
                    me.username.as_deref().unwrap_or("unknown")
                ),
            );
            *BOT.write().await = Some(bot);
            Ok(())
        }
        Err(e) => {
            logger::error(LogTag::Telegram, &format!("Failed to validate bot token: {}", e));
            Err(format!("Invalid bot token: {}", e))
        }
    }
}

/// Returns a clone of the initialized bot
pub async fn get_bot() -> Option<Bot> {
    BOT.read().await.clone()
}

/// Sends an HTML-formatted message to the configured chat.
/// Returns Err when the bot is unconfigured or the send fails; callers
/// treat that as "the operator never saw it".
pub async fn send_message(message: &str) -> Result<(), String> {
    let Some(bot) = get_bot().await else {
        return Err("Telegram bot not initialized".to_string());
    };

    let chat_id_raw = with_config(|c| c.telegram.chat_id.clone());
    if chat_id_raw.is_empty() {
        return Err("No chat ID configured".to_string());
    }
    let chat_id: i64 = chat_id_raw
        .parse()
        .map_err(|e| format!("Invalid chat ID '{}': {}", chat_id_raw, e))?;

    bot.send_message(ChatId(chat_id), message)
        .parse_mode(ParseMode::Html)
        .await
        .map_err(|e| format!("Failed to send Telegram message: {}", e))?;

    logger::debug(
        LogTag::Telegram,
        &format!("Sent Telegram message ({} chars)", message.len()),
    );
    Ok(())
}

/// Sends a titled alert
pub async fn send_alert(title: &str, body: &str) -> Result<(), String> {
    send_message(&format!("<b>{}</b>\n{}", title, body)).await
}

/// True when the bot token is valid and reachable
pub async fn test_connection() -> bool {
    match get_bot().await {
        Some(bot) => bot.get_me().await.is_ok(),
        None => false,
    }
}
