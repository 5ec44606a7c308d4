//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Components call store methods and never execute SQL directly.
//!
//! One LedgerStore wraps one connection. Workers that run
//! concurrently each open their own store on the same file.

use crate::{
    account::Account,
    error::LedgerResult,
    types::EpochMillis,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, TransactionBehavior};
use std::time::Duration;

mod account;
mod event_log;
mod leaderboard;
mod ledger;

pub use leaderboard::LeaderboardRow;
pub use ledger::{LedgerTotals, LedgerTx};

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Column list matching `account_from_row`.
const ACCOUNT_COLUMNS: &str = "a.account_id, a.display_name, a.contact, a.referral_code,
     a.referred_by, a.coin_balance, a.referral_count, a.is_verified, a.is_active,
     a.deleted_at, a.created_at";

pub struct LedgerStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
    busy_timeout: Duration,
}

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    /// Open a new connection to the same database.
    /// For in-memory databases this returns a new, isolated database.
    pub fn reopen(&self) -> LedgerResult<Self> {
        let mut store = match &self.path {
            Some(p) => Self::open(p)?,
            None => Self::in_memory()?,
        };
        store.set_busy_timeout(self.busy_timeout)?;
        Ok(store)
    }

    pub fn set_busy_timeout(&mut self, timeout: Duration) -> LedgerResult<()> {
        self.conn.busy_timeout(timeout)?;
        self.busy_timeout = timeout;
        Ok(())
    }

    /// Apply all schema migrations in order. Safe to run repeatedly.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_accounts.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/003_event_log.sql"))?;
        Ok(())
    }

    /// Start the write transaction a reward is credited in.
    ///
    /// IMMEDIATE takes the write lock up front, so the duplicate check
    /// and the ledger append see the same state.
    pub fn begin_write(&mut self) -> LedgerResult<LedgerTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(LedgerTx::new(tx))
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> EpochMillis {
    at.timestamp_millis()
}

/// Out-of-range values read back as the epoch and are logged.
pub(crate) fn from_millis(ms: EpochMillis) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(|| {
        log::warn!("timestamp {ms}ms is out of range, reading it as the epoch");
        DateTime::<Utc>::default()
    })
}

/// Map a row selected with ACCOUNT_COLUMNS.
fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        account_id: row.get(0)?,
        display_name: row.get(1)?,
        contact: row.get(2)?,
        referral_code: row.get(3)?,
        referred_by: row.get(4)?,
        coin_balance: row.get::<_, i64>(5)?.max(0) as u64,
        referral_count: row.get::<_, i64>(6)?.max(0) as u64,
        verified: row.get::<_, i32>(7)? != 0,
        active: row.get::<_, i32>(8)? != 0,
        deleted_at: row.get::<_, Option<i64>>(9)?.map(from_millis),
        created_at: from_millis(row.get(10)?),
    })
}
