// =============================================================================
// Durable Storage — SQLite-backed patterns and trades ledgers
// =============================================================================
//
// Single-writer (wrapped in a `parking_lot::Mutex`), per-batch-commit
// semantics: a transaction commits whatever rows succeeded even if one row's
// insert failed (logged per row). `trades.trade_id` carries a UNIQUE index;
// duplicate inserts are ignored.
// =============================================================================

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::warn;

use crate::messages::{ArchivedPattern, Trade, TradeResult};

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) the SQLite database at `path` and ensure the schema
    /// exists.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open sqlite database")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, primarily for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id INTEGER NOT NULL,
                timestamp REAL NOT NULL,
                pattern_value REAL NOT NULL,
                raw_features TEXT NOT NULL,
                age_minutes REAL NOT NULL,
                decay_factor REAL NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trade_id TEXT NOT NULL UNIQUE,
                pair TEXT NOT NULL,
                strategy_type TEXT NOT NULL,
                agent_id INTEGER NOT NULL,
                pattern_id INTEGER,
                entry_ts REAL NOT NULL,
                exit_ts REAL NOT NULL,
                hold_seconds REAL NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL NOT NULL,
                price_change_pct REAL NOT NULL,
                pnl_pct REAL NOT NULL,
                pnl_absolute REAL NOT NULL,
                result TEXT NOT NULL,
                signal_source TEXT NOT NULL,
                prediction_score REAL,
                cross_moat_score REAL NOT NULL,
                collision_detected INTEGER NOT NULL,
                position_size REAL NOT NULL,
                fees_paid REAL NOT NULL,
                slippage_pct REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_trades_pair ON trades(pair);
            CREATE INDEX IF NOT EXISTS idx_trades_strategy ON trades(strategy_type);
            CREATE INDEX IF NOT EXISTS idx_trades_agent ON trades(agent_id);
            CREATE INDEX IF NOT EXISTS idx_trades_entry_ts ON trades(entry_ts);
            CREATE INDEX IF NOT EXISTS idx_trades_result ON trades(result);
            ",
        )
        .context("failed to initialise storage schema")?;
        Ok(())
    }

    /// Insert a batch of archived patterns in a single transaction. Failures
    /// on individual rows are logged; the batch commits the rest.
    pub fn insert_pattern_batch(&self, patterns: &[ArchivedPattern]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("failed to start transaction")?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO patterns (agent_id, timestamp, pattern_value, raw_features, age_minutes, decay_factor)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for p in patterns {
                match stmt.execute(params![
                    p.agent_id as i64,
                    p.timestamp,
                    p.pattern_value,
                    p.raw_features,
                    p.age_minutes,
                    p.decay_factor,
                ]) {
                    Ok(_) => inserted += 1,
                    Err(e) => warn!(agent_id = p.agent_id, error = %e, "failed to archive pattern row"),
                }
            }
        }
        tx.commit().context("failed to commit pattern batch")?;
        Ok(inserted)
    }

    /// Insert a single trade. Duplicate `trade_id` is ignored.
    pub fn insert_trade(&self, trade: &Trade) -> Result<()> {
        let conn = self.conn.lock();
        let result_str = match trade.result {
            TradeResult::Win => "WIN",
            TradeResult::Loss => "LOSS",
        };
        conn.execute(
            "INSERT OR IGNORE INTO trades (
                trade_id, pair, strategy_type, agent_id, pattern_id, entry_ts, exit_ts,
                hold_seconds, entry_price, exit_price, price_change_pct, pnl_pct,
                pnl_absolute, result, signal_source, prediction_score, cross_moat_score,
                collision_detected, position_size, fees_paid, slippage_pct
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21)",
            params![
                trade.trade_id,
                trade.pair,
                trade.strategy_type,
                trade.agent_id as i64,
                trade.pattern_id.map(|p| p as i64),
                trade.entry_ts,
                trade.exit_ts,
                trade.hold_seconds,
                trade.entry_price,
                trade.exit_price,
                trade.price_change_pct,
                trade.pnl_pct,
                trade.pnl_absolute,
                result_str,
                trade.signal_source,
                trade.prediction_score,
                trade.cross_moat_score,
                trade.collision_detected as i64,
                trade.position_size,
                trade.fees_paid,
                trade.slippage_pct,
            ],
        )
        .context("failed to insert trade")?;
        Ok(())
    }

    pub fn pattern_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get(0))
            .context("failed to count patterns")
    }

    pub fn trade_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))
            .context("failed to count trades")
    }
}
