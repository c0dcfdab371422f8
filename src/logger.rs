/// Set to false to hide the date in console logs
const LOG_SHOW_DATE: bool = false;
/// Set to false to hide the time in console logs
const LOG_SHOW_TIME: bool = true;

/// Fixed column widths for aligned log output
const TAG_WIDTH: usize = 9;
const LEVEL_WIDTH: usize = 7;

/// Maximum line length before wrapping
const MAX_LINE_LENGTH: usize = 155;

use chrono::Local;
use colored::*;
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

/// Log tags for categorizing log messages.
#[derive(Debug, Clone)]
pub enum LogTag {
    System,
    Broker,
    Data,
    Analysis,
    Signal,
    Risk,
    Approval,
    Execution,
    Monitor,
    Telegram,
    Webserver,
    Scheduler,
    Learning,
    Other(String),
}

impl LogTag {
    fn label(&self) -> String {
        match self {
            LogTag::System => "SYSTEM".to_string(),
            LogTag::Broker => "BROKER".to_string(),
            LogTag::Data => "DATA".to_string(),
            LogTag::Analysis => "ANALYSIS".to_string(),
            LogTag::Signal => "SIGNAL".to_string(),
            LogTag::Risk => "RISK".to_string(),
            LogTag::Approval => "APPROVAL".to_string(),
            LogTag::Execution => "EXEC".to_string(),
            LogTag::Monitor => "MONITOR".to_string(),
            LogTag::Telegram => "TELEGRAM".to_string(),
            LogTag::Webserver => "WEB".to_string(),
            LogTag::Scheduler => "SCHED".to_string(),
            LogTag::Learning => "LEARNING".to_string(),
            LogTag::Other(s) => s.to_uppercase(),
        }
    }

    fn colored_label(&self) -> ColoredString {
        let padded = format!("{:<width$}", self.label(), width = TAG_WIDTH);
        match self {
            LogTag::System => padded.bright_yellow().bold(),
            LogTag::Broker => padded.bright_magenta().bold(),
            LogTag::Data => padded.bright_cyan().bold(),
            LogTag::Analysis => padded.cyan().bold(),
            LogTag::Signal => padded.bright_green().bold(),
            LogTag::Risk => padded.bright_red().bold(),
            LogTag::Approval => padded.bright_blue().bold(),
            LogTag::Execution => padded.green().bold(),
            LogTag::Monitor => padded.bright_cyan().bold(),
            LogTag::Telegram => padded.blue().bold(),
            LogTag::Webserver => padded.magenta().bold(),
            LogTag::Scheduler => padded.yellow().bold(),
            LogTag::Learning => padded.white().bold(),
            LogTag::Other(_) => padded.white().bold(),
        }
    }
}

fn colored_level(level: &str) -> ColoredString {
    let padded = format!("{:<width$}", level, width = LEVEL_WIDTH);
    match level {
        "ERROR" => padded.bright_red().bold(),
        "WARN" | "WARNING" => padded.bright_yellow().bold(),
        "SUCCESS" => padded.bright_green().bold(),
        "INFO" => padded.bright_blue().bold(),
        "DEBUG" => padded.bright_black().bold(),
        _ => padded.white().bold(),
    }
}

/// File sink, opened by init_file_logging. None = console only.
static LOG_FILE: Lazy<Mutex<Option<File>>> = Lazy::new(|| Mutex::new(None));

/// Opens the log file under the data directory. Console logging works
/// regardless; failures here only disable the file sink.
pub fn init_file_logging() {
    let path = crate::paths::log_file_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            if let Ok(mut guard) = LOG_FILE.lock() {
                *guard = Some(file);
            }
        }
        Err(e) => {
            eprintln!("Could not open log file {}: {}", path.display(), e);
        }
    }
}

/// Logs a message with tag and level to the console (colored, aligned)
/// and to the file sink (plain) when enabled.
pub fn log(tag: LogTag, level: &str, message: &str) {
    let now = Local::now();
    let mut prefix = String::new();
    if LOG_SHOW_DATE {
        prefix.push_str(&now.format("%Y-%m-%d ").to_string());
    }
    if LOG_SHOW_TIME {
        prefix.push_str(&now.format("%H:%M:%S ").to_string());
    }
    let prefix_colored = if prefix.is_empty() {
        String::new()
    } else {
        prefix.dimmed().to_string()
    };

    let level_upper = level.to_uppercase();
    let base_line = format!(
        "{}[{}] [{}] ",
        prefix_colored,
        tag.colored_label(),
        colored_level(&level_upper)
    );

    // Color escapes inflate the string; measure the visible width
    let base_len = strip_ansi_codes(&base_line)
        .len()
        .max(prefix.len() + TAG_WIDTH + LEVEL_WIDTH + 7);
    let available = if MAX_LINE_LENGTH > base_len {
        MAX_LINE_LENGTH - base_len
    } else {
        50
    };

    let chunks = wrap_text(message, available);
    println!("{}{}", base_line, chunks[0].bright_white());
    for chunk in &chunks[1..] {
        println!("{}{}", " ".repeat(base_len), chunk.bright_white());
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(
                file,
                "{} [{}] [{}] {}",
                now.format("%Y-%m-%d %H:%M:%S"),
                tag.label(),
                level_upper,
                message
            );
        }
    }
}

pub fn info(tag: LogTag, message: &str) {
    log(tag, "INFO", message);
}

pub fn warning(tag: LogTag, message: &str) {
    log(tag, "WARN", message);
}

pub fn error(tag: LogTag, message: &str) {
    log(tag, "ERROR", message);
}

pub fn success(tag: LogTag, message: &str) {
    log(tag, "SUCCESS", message);
}

pub fn debug(tag: LogTag, message: &str) {
    if crate::arguments::is_any_debug_enabled() {
        log(tag, "DEBUG", message);
    }
}

/// Removes ANSI color codes so length math sees only visible characters.
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::new();
    let mut in_escape = false;

    for ch in text.chars() {
        if ch == '\x1b' {
            in_escape = true;
        } else if in_escape && ch == 'm' {
            in_escape = false;
        } else if !in_escape {
            result.push(ch);
        }
    }
    result
}

/// Wraps text at word boundaries so long messages stay aligned.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if text.len() <= max_width {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + word.len() + 1 <= max_width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(text.to_string());
    }

    lines
}
