//! Trade-record store
//!
//! Single rusqlite connection behind a mutex. Records are upserted at every
//! status transition; a record with status EXECUTED and no close time is an
//! open position.

use crate::types::TradeRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use rusqlite::{params, Connection, Row};
use std::sync::Mutex;

pub struct TradeStore {
    conn: Mutex<Connection>,
}

static STORE: OnceCell<TradeStore> = OnceCell::new();

/// Opens (or creates) the database at the default path and installs the
/// global store. Safe to call more than once.
pub fn init_database() -> Result<()> {
    let path = crate::paths::database_path();
    if STORE.get().is_some() {
        return Ok(());
    }
    let store = TradeStore::open(&path.to_string_lossy())?;
    let _ = STORE.set(store);
    Ok(())
}

/// Global store accessor. init_database must have run first.
pub fn store() -> Result<&'static TradeStore> {
    STORE
        .get()
        .ok_or_else(|| anyhow::anyhow!("Trade store not initialized"))
}

impl TradeStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS trade_records (
                trade_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                exchange TEXT NOT NULL,
                sector TEXT NOT NULL DEFAULT '',
                signal_type TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_price REAL NOT NULL,
                target_price REAL NOT NULL,
                stop_loss_price REAL NOT NULL,
                initial_stop_price REAL NOT NULL,
                risk_reward_ratio REAL NOT NULL,
                capital_allocation REAL NOT NULL,
                confidence_score REAL NOT NULL,
                fundamental_score REAL NOT NULL,
                technical_score REAL NOT NULL,
                macro_score REAL NOT NULL,
                risk_reward_score REAL NOT NULL,
                generated_at TEXT NOT NULL,
                expires_at TEXT,
                approved_at TEXT,
                executed_at TEXT,
                closed_at TEXT,
                exit_price REAL,
                realised_pnl REAL,
                realised_pnl_pct REAL,
                exit_reason TEXT,
                target_hit INTEGER NOT NULL DEFAULT 0,
                partial_alert_sent INTEGER NOT NULL DEFAULT 0,
                rejection_reason TEXT,
                broker_order_id TEXT,
                fundamental_summary TEXT NOT NULL DEFAULT '',
                technical_summary TEXT NOT NULL DEFAULT '',
                macro_context TEXT NOT NULL DEFAULT ''
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trade_records_status
             ON trade_records (status)",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Inserts or fully replaces a record
    pub fn upsert(&self, record: &TradeRecord) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO trade_records (
                trade_id, symbol, exchange, sector, signal_type, status,
                entry_price, target_price, stop_loss_price, initial_stop_price,
                risk_reward_ratio, capital_allocation,
                confidence_score, fundamental_score, technical_score, macro_score, risk_reward_score,
                generated_at, expires_at, approved_at, executed_at, closed_at,
                exit_price, realised_pnl, realised_pnl_pct, exit_reason,
                target_hit, partial_alert_sent, rejection_reason, broker_order_id,
                fundamental_summary, technical_summary, macro_context
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                ?27, ?28, ?29, ?30, ?31, ?32, ?33
            )",
            params![
                record.trade_id,
                record.symbol,
                record.exchange,
                record.sector,
                record.signal_type,
                record.status,
                record.entry_price,
                record.target_price,
                record.stop_loss_price,
                record.initial_stop_price,
                record.risk_reward_ratio,
                record.capital_allocation,
                record.confidence_score,
                record.fundamental_score,
                record.technical_score,
                record.macro_score,
                record.risk_reward_score,
                record.generated_at.to_rfc3339(),
                record.expires_at.map(|t| t.to_rfc3339()),
                record.approved_at.map(|t| t.to_rfc3339()),
                record.executed_at.map(|t| t.to_rfc3339()),
                record.closed_at.map(|t| t.to_rfc3339()),
                record.exit_price,
                record.realised_pnl,
                record.realised_pnl_pct,
                record.exit_reason,
                record.target_hit as i64,
                record.partial_alert_sent as i64,
                record.rejection_reason,
                record.broker_order_id,
                record.fundamental_summary,
                record.technical_summary,
                record.macro_context,
            ],
        )
        .with_context(|| format!("Failed to upsert trade {}", record.trade_id))?;
        Ok(())
    }

    /// Applies a status change and the matching transition timestamp
    pub fn set_status(&self, trade_id: &str, status: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        let timestamp_column = match status {
            "APPROVED" => Some("approved_at"),
            "EXECUTED" => Some("executed_at"),
            _ => None,
        };
        match timestamp_column {
            Some(column) => {
                let sql = format!(
                    "UPDATE trade_records SET status = ?1, {} = ?2 WHERE trade_id = ?3",
                    column
                );
                conn.execute(&sql, params![status, now, trade_id])?;
            }
            None => {
                conn.execute(
                    "UPDATE trade_records SET status = ?1 WHERE trade_id = ?2",
                    params![status, trade_id],
                )?;
            }
        }
        Ok(())
    }

    pub fn set_rejection(&self, trade_id: &str, reason: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE trade_records SET status = 'REJECTED', rejection_reason = ?1
             WHERE trade_id = ?2",
            params![reason, trade_id],
        )?;
        Ok(())
    }

    pub fn set_broker_order_id(&self, trade_id: &str, order_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE trade_records SET broker_order_id = ?1 WHERE trade_id = ?2",
            params![order_id, trade_id],
        )?;
        Ok(())
    }

    /// Raises the current stop. The write is refused below the initial stop
    /// so the monotone invariant survives even a buggy caller.
    pub fn update_stop(&self, trade_id: &str, new_stop: f64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE trade_records SET stop_loss_price = ?1
             WHERE trade_id = ?2 AND ?1 >= initial_stop_price",
            params![new_stop, trade_id],
        )?;
        Ok(())
    }

    pub fn mark_partial_alert_sent(&self, trade_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE trade_records SET partial_alert_sent = 1 WHERE trade_id = ?1",
            params![trade_id],
        )?;
        Ok(())
    }

    /// Closes a position with exit price, reason and realised P&L
    pub fn close_trade(
        &self,
        trade_id: &str,
        exit_price: f64,
        exit_reason: &str,
        realised_pnl: f64,
        realised_pnl_pct: f64,
        target_hit: bool,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE trade_records SET
                status = 'CLOSED',
                exit_price = ?1,
                exit_reason = ?2,
                realised_pnl = ?3,
                realised_pnl_pct = ?4,
                target_hit = ?5,
                closed_at = ?6
             WHERE trade_id = ?7",
            params![
                exit_price,
                exit_reason,
                realised_pnl,
                realised_pnl_pct,
                target_hit as i64,
                Utc::now().to_rfc3339(),
                trade_id
            ],
        )?;
        Ok(())
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn get(&self, trade_id: &str) -> Result<Option<TradeRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM trade_records WHERE trade_id = ?1")?;
        let mut rows = stmt.query(params![trade_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_status(&self, status: &str) -> Result<Vec<TradeRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM trade_records WHERE status = ?1 ORDER BY generated_at DESC",
        )?;
        let rows = stmt.query_map(params![status], |row| {
            row_to_record(row).map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.into()))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Open positions = EXECUTED records that have not been closed
    pub fn open_positions(&self) -> Result<Vec<TradeRecord>> {
        self.find_by_status("EXECUTED")
    }

    pub fn find_generated_after(&self, since: DateTime<Utc>) -> Result<Vec<TradeRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM trade_records WHERE generated_at > ?1 ORDER BY generated_at DESC",
        )?;
        let rows = stmt.query_map(params![since.to_rfc3339()], |row| {
            row_to_record(row).map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.into()))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Number of BUY proposals generated since the given instant
    pub fn count_new_buys_since(&self, since: DateTime<Utc>) -> Result<u32> {
        let conn = self.lock();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM trade_records
             WHERE signal_type = 'BUY' AND generated_at > ?1",
            params![since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All closed trades, most recently closed first
    pub fn find_all_closed(&self) -> Result<Vec<TradeRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM trade_records WHERE closed_at IS NOT NULL ORDER BY closed_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            row_to_record(row).map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.into()))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Closed trades whose close time falls on or after the given instant
    pub fn find_closed_since(&self, since: DateTime<Utc>) -> Result<Vec<TradeRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM trade_records
             WHERE closed_at IS NOT NULL AND closed_at >= ?1
             ORDER BY closed_at DESC",
        )?;
        let rows = stmt.query_map(params![since.to_rfc3339()], |row| {
            row_to_record(row).map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.into()))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

// =============================================================================
// ROW MAPPING
// =============================================================================

fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    })
}

fn row_to_record(row: &Row<'_>) -> Result<TradeRecord> {
    let generated_at: String = row.get("generated_at")?;
    Ok(TradeRecord {
        trade_id: row.get("trade_id")?,
        symbol: row.get("symbol")?,
        exchange: row.get("exchange")?,
        sector: row.get("sector")?,
        signal_type: row.get("signal_type")?,
        status: row.get("status")?,
        entry_price: row.get("entry_price")?,
        target_price: row.get("target_price")?,
        stop_loss_price: row.get("stop_loss_price")?,
        initial_stop_price: row.get("initial_stop_price")?,
        risk_reward_ratio: row.get("risk_reward_ratio")?,
        capital_allocation: row.get("capital_allocation")?,
        confidence_score: row.get("confidence_score")?,
        fundamental_score: row.get("fundamental_score")?,
        technical_score: row.get("technical_score")?,
        macro_score: row.get("macro_score")?,
        risk_reward_score: row.get("risk_reward_score")?,
        generated_at: DateTime::parse_from_rfc3339(&generated_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        expires_at: parse_ts(row.get("expires_at")?),
        approved_at: parse_ts(row.get("approved_at")?),
        executed_at: parse_ts(row.get("executed_at")?),
        closed_at: parse_ts(row.get("closed_at")?),
        exit_price: row.get("exit_price")?,
        realised_pnl: row.get("realised_pnl")?,
        realised_pnl_pct: row.get("realised_pnl_pct")?,
        exit_reason: row.get("exit_reason")?,
        target_hit: row.get::<_, i64>("target_hit")? != 0,
        partial_alert_sent: row.get::<_, i64>("partial_alert_sent")? != 0,
        rejection_reason: row.get("rejection_reason")?,
        broker_order_id: row.get("broker_order_id")?,
        fundamental_summary: row.get("fundamental_summary")?,
        technical_summary: row.get("technical_summary")?,
        macro_context: row.get("macro_context")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceScore, SignalStatus, SignalType, TradeProposal};
    use chrono::Duration;

    fn sample_proposal(trade_id: &str, symbol: &str) -> TradeProposal {
        TradeProposal {
            trade_id: trade_id.to_string(),
            symbol: symbol.to_string(),
            exchange: "NSE".to_string(),
            signal_type: SignalType::Buy,
            entry_price: 100.0,
            target_price: 120.0,
            stop_loss_price: 95.0,
            risk_reward_ratio: 4.0,
            expected_holding_days: 20,
            risk_level: crate::types::RiskLevel::Moderate,
            confidence: ConfidenceScore {
                fundamental_score: 80.0,
                technical_score: 70.0,
                macro_score: 65.0,
                risk_reward_score: 100.0,
                composite: 77.0,
                ..Default::default()
            },
            capital_allocation: 50_000.0,
            capital_allocation_pct: 10.0,
            post_trade_cash: 350_000.0,
            cash_buffer_safe: true,
            sector: "Energy".to_string(),
            fundamental_summary: "strong".to_string(),
            technical_summary: "above dmas".to_string(),
            macro_context: "sideways".to_string(),
            worst_case: String::new(),
            bull_case: String::new(),
            invalidation_level: String::new(),
            status: SignalStatus::PendingApproval,
            generated_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(30),
        }
    }

    #[test]
    fn test_upsert_and_read_back() {
        let store = TradeStore::open_in_memory().expect("store");
        let record = TradeRecord::from_proposal(&sample_proposal("TRD-000000000001", "RELIANCE"));
        store.upsert(&record).expect("upsert");

        let loaded = store.get("TRD-000000000001").expect("get").expect("found");
        assert_eq!(loaded.symbol, "RELIANCE");
        assert_eq!(loaded.status, "PENDING_APPROVAL");
        assert_eq!(loaded.initial_stop_price, 95.0);
        assert_eq!(loaded.quantity(), 500);
    }

    #[test]
    fn test_status_transitions_and_queries() {
        let store = TradeStore::open_in_memory().expect("store");
        let record = TradeRecord::from_proposal(&sample_proposal("TRD-000000000002", "TCS"));
        store.upsert(&record).expect("upsert");

        store.set_status("TRD-000000000002", "APPROVED").expect("approve");
        store.set_status("TRD-000000000002", "EXECUTED").expect("execute");

        let open = store.open_positions().expect("open");
        assert_eq!(open.len(), 1);
        assert!(open[0].approved_at.is_some());
        assert!(open[0].executed_at.is_some());

        store
            .close_trade("TRD-000000000002", 94.5, "STOP_LOSS_HIT", -2750.0, -5.5, false)
            .expect("close");
        assert!(store.open_positions().expect("open").is_empty());
        let closed = store.find_all_closed().expect("closed");
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason.as_deref(), Some("STOP_LOSS_HIT"));
        assert_eq!(closed[0].exit_price, Some(94.5));
    }

    #[test]
    fn test_update_stop_never_below_initial() {
        let store = TradeStore::open_in_memory().expect("store");
        let record = TradeRecord::from_proposal(&sample_proposal("TRD-000000000003", "INFY"));
        store.upsert(&record).expect("upsert");

        store.update_stop("TRD-000000000003", 107.0).expect("raise");
        let loaded = store.get("TRD-000000000003").expect("get").expect("found");
        assert_eq!(loaded.stop_loss_price, 107.0);

        // A lower-than-initial write is refused at the SQL layer
        store.update_stop("TRD-000000000003", 90.0).expect("refused");
        let loaded = store.get("TRD-000000000003").expect("get").expect("found");
        assert_eq!(loaded.stop_loss_price, 107.0);
        assert_eq!(loaded.initial_stop_price, 95.0);
    }

    #[test]
    fn test_count_new_buys_since() {
        let store = TradeStore::open_in_memory().expect("store");
        for (i, symbol) in ["A", "B", "C"].iter().enumerate() {
            let record = TradeRecord::from_proposal(&sample_proposal(
                &format!("TRD-00000000000{}", i + 4),
                symbol,
            ));
            store.upsert(&record).expect("upsert");
        }
        let count = store
            .count_new_buys_since(Utc::now() - Duration::days(7))
            .expect("count");
        assert_eq!(count, 3);
        let count_future = store
            .count_new_buys_since(Utc::now() + Duration::days(1))
            .expect("count");
        assert_eq!(count_future, 0);
    }
}
