//! Telegram long-poll loop
//!
//! Pulls updates with getUpdates and dispatches operator replies to the
//! approval gateway. The highest seen update id is persisted to disk after
//! every successful poll, and restored on startup, so a reply consumed
//! before a restart is never re-delivered.

use crate::approval;
use crate::logger::{self, LogTag};
use crate::utils::check_shutdown_or_delay;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teloxide::payloads::GetUpdatesSetters;
use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use tokio::sync::Notify;

/// Server-side long-poll wait, kept under the client read timeout
const LONG_POLL_TIMEOUT_SECS: u32 = 2;

/// Highest update id consumed so far
static LAST_UPDATE_ID: Lazy<AtomicI64> = Lazy::new(|| AtomicI64::new(0));

/// Restores the persisted update offset. Called once at startup before the
/// first poll.
pub fn restore_offset() {
    let path = crate::paths::telegram_offset_path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => match contents.trim().parse::<i64>() {
            Ok(offset) => {
                LAST_UPDATE_ID.store(offset, Ordering::SeqCst);
                logger::info(
                    LogTag::Telegram,
                    &format!("Restored update offset {} from disk", offset),
                );
            }
            Err(_) => {
                logger::warning(LogTag::Telegram, "Offset file unreadable, starting from 0");
            }
        },
        Err(_) => {
            logger::debug(LogTag::Telegram, "No offset file, starting from 0");
        }
    }
}

/// Current offset value (for status reporting and tests)
pub fn current_offset() -> i64 {
    LAST_UPDATE_ID.load(Ordering::SeqCst)
}

fn persist_offset(offset: i64) {
    let path = crate::paths::telegram_offset_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(&path, offset.to_string()) {
        logger::warning(LogTag::Telegram, &format!("Could not persist offset: {}", e));
    }
}

/// Runs the poll loop until shutdown. Iterations never overlap; a new poll
/// only starts once the previous one has been fully processed.
pub async fn run_poll_loop(shutdown: Arc<Notify>) {
    let interval =
        crate::config::with_config(|c| Duration::from_secs(c.telegram.poll_interval_seconds.max(1)));

    logger::info(LogTag::Telegram, "Starting Telegram poll loop");
    loop {
        if check_shutdown_or_delay(&shutdown, Duration::from_millis(100)).await {
            logger::info(LogTag::Telegram, "Poll loop shutting down");
            break;
        }

        poll_once().await;

        if check_shutdown_or_delay(&shutdown, interval).await {
            logger::info(LogTag::Telegram, "Poll loop shutting down");
            break;
        }
    }
}

/// One getUpdates round: dispatch every text message, then advance and
/// persist the offset.
pub async fn poll_once() {
    let Some(bot) = crate::telegram::bot::get_bot().await else {
        return;
    };

    let last_id = LAST_UPDATE_ID.load(Ordering::SeqCst);
    let updates = match bot
        .get_updates()
        .offset((last_id + 1) as i32)
        .timeout(LONG_POLL_TIMEOUT_SECS)
        .await
    {
        Ok(updates) => updates,
        Err(e) => {
            logger::debug(LogTag::Telegram, &format!("Poll error (may be transient): {}", e));
            return;
        }
    };

    let mut highest_id = last_id;
    for update in updates {
        let update_id = update.id as i64;
        if update_id > highest_id {
            highest_id = update_id;
        }

        if let UpdateKind::Message(message) = update.kind {
            if let Some(text) = message.text() {
                let text = text.trim();
                if !text.is_empty() {
                    approval::on_operator_message(text).await;
                }
            }
        }
    }

    if highest_id > last_id {
        LAST_UPDATE_ID.store(highest_id, Ordering::SeqCst);
        persist_offset(highest_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_round_trip_survives_restart() {
        persist_offset(1005);
        LAST_UPDATE_ID.store(0, Ordering::SeqCst);

        restore_offset();
        assert_eq!(current_offset(), 1005);
        // The next poll asks for everything strictly after the persisted id
        assert_eq!(current_offset() + 1, 1006);
    }
}
