use super::{account::load_account, event_log, to_millis, LedgerStore};
use crate::{
    account::{Account, AccountFilter, EntryStatus, RawLedgerRow},
    error::LedgerResult,
    event::ReferralEvent,
    history::{HistoryFilter, HistorySortBy, SortOrder},
    types::Coins,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row, Transaction};

const LEDGER_COLUMNS: &str = "l.entry_id, l.referrer_id, l.referred_account_id, r.display_name,
     l.coins_earned, l.occurred_at, l.status";

/// Rows with a known status and a positive amount. Anything else is
/// malformed history and is left out of aggregates.
const WELL_FORMED: &str = "l.coins_earned > 0 AND l.status IN ('pending', 'verified')";

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawLedgerRow> {
    Ok(RawLedgerRow {
        entry_id: row.get(0)?,
        referrer_id: row.get(1)?,
        referred_account_id: row.get(2)?,
        referred_name: row.get(3)?,
        coins_earned: row.get(4)?,
        occurred_at_ms: row.get(5)?,
        status: row.get(6)?,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub entries: u64,
    pub coins:   Coins,
}

/// The write transaction a reward is credited in. Dropping it
/// without `commit` rolls everything back.
pub struct LedgerTx<'c> {
    tx: Transaction<'c>,
}

impl<'c> LedgerTx<'c> {
    pub(super) fn new(tx: Transaction<'c>) -> Self {
        Self { tx }
    }

    /// Load an account inside the transaction, unfiltered, so the
    /// caller can report why it is not usable.
    pub fn account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        Ok(load_account(&self.tx, account_id, AccountFilter::Any)?)
    }

    /// Conditional append keyed on (referrer, referred). Returns false
    /// when the pair was already credited; nothing is written then.
    pub fn insert_entry_if_absent(
        &self,
        referrer_id: &str,
        referred_account_id: &str,
        coins: Coins,
        status: EntryStatus,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let inserted = self.tx.execute(
            "INSERT INTO ledger_entry
                (referrer_id, referred_account_id, coins_earned, occurred_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (referrer_id, referred_account_id) DO NOTHING",
            params![
                referrer_id,
                referred_account_id,
                coins as i64,
                to_millis(occurred_at),
                status.as_str(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Add `coins` to the balance and one to the count.
    /// Returns the new (balance, count).
    pub fn apply_credit(&self, referrer_id: &str, coins: Coins) -> LedgerResult<(Coins, u64)> {
        self.tx.execute(
            "UPDATE account
             SET coin_balance = coin_balance + ?2, referral_count = referral_count + 1
             WHERE account_id = ?1",
            params![referrer_id, coins as i64],
        )?;
        let (balance, count): (i64, i64) = self.tx.query_row(
            "SELECT coin_balance, referral_count FROM account WHERE account_id = ?1",
            params![referrer_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((balance as Coins, count as u64))
    }

    pub fn append_event(&self, event: &ReferralEvent, now: DateTime<Utc>) -> LedgerResult<()> {
        event_log::append(&self.tx, event, now)
    }

    pub fn commit(self) -> LedgerResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

impl LedgerStore {
    // ── Ledger reads ──────────────────────────────────────────────

    /// Every ledger row of a referrer, oldest first, optionally only
    /// rows at or after `since`.
    pub fn ledger_rows(
        &self,
        referrer_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> LedgerResult<Vec<RawLedgerRow>> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS}
             FROM ledger_entry l
             LEFT JOIN account r ON r.account_id = l.referred_account_id
             WHERE l.referrer_id = ?1 AND (?2 IS NULL OR l.occurred_at >= ?2)
             ORDER BY l.occurred_at ASC, l.entry_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![referrer_id, since.map(to_millis)], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The `limit` most recent rows of a referrer.
    pub fn recent_ledger_rows(&self, referrer_id: &str, limit: u32) -> LedgerResult<Vec<RawLedgerRow>> {
        let sql = format!(
            "SELECT {LEDGER_COLUMNS}
             FROM ledger_entry l
             LEFT JOIN account r ON r.account_id = l.referred_account_id
             WHERE l.referrer_id = ?1
             ORDER BY l.occurred_at DESC, l.entry_id DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![referrer_id, limit as i64], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// One page of filtered, sorted history.
    pub fn history_rows(
        &self,
        referrer_id: &str,
        filter: &HistoryFilter,
        sort_by: HistorySortBy,
        order: SortOrder,
        limit: u32,
        offset: u64,
    ) -> LedgerResult<Vec<RawLedgerRow>> {
        let column = match sort_by {
            HistorySortBy::OccurredAt  => "l.occurred_at",
            HistorySortBy::CoinsEarned => "l.coins_earned",
        };
        let direction = match order {
            SortOrder::Asc  => "ASC",
            SortOrder::Desc => "DESC",
        };
        let sql = format!(
            "SELECT {LEDGER_COLUMNS}
             FROM ledger_entry l
             LEFT JOIN account r ON r.account_id = l.referred_account_id
             WHERE l.referrer_id = ?1
               AND (?2 IS NULL OR l.status = ?2)
               AND (?3 IS NULL OR l.occurred_at >= ?3)
               AND (?4 IS NULL OR l.occurred_at < ?4)
             ORDER BY {column} {direction}, l.entry_id {direction}
             LIMIT ?5 OFFSET ?6"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    referrer_id,
                    filter.status.map(EntryStatus::as_str),
                    filter.since.map(to_millis),
                    filter.until.map(to_millis),
                    limit as i64,
                    offset as i64,
                ],
                raw_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count and coin sum of well-formed rows matching `filter`.
    pub fn ledger_totals(&self, referrer_id: &str, filter: &HistoryFilter) -> LedgerResult<LedgerTotals> {
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(l.coins_earned), 0)
             FROM ledger_entry l
             WHERE l.referrer_id = ?1 AND {WELL_FORMED}
               AND (?2 IS NULL OR l.status = ?2)
               AND (?3 IS NULL OR l.occurred_at >= ?3)
               AND (?4 IS NULL OR l.occurred_at < ?4)"
        );
        let (entries, coins): (i64, i64) = self.conn.query_row(
            &sql,
            params![
                referrer_id,
                filter.status.map(EntryStatus::as_str),
                filter.since.map(to_millis),
                filter.until.map(to_millis),
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(LedgerTotals { entries: entries as u64, coins: coins as Coins })
    }

    /// Rows matching `filter` regardless of shape, for page counts.
    pub fn history_row_count(&self, referrer_id: &str, filter: &HistoryFilter) -> LedgerResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entry l
             WHERE l.referrer_id = ?1
               AND (?2 IS NULL OR l.status = ?2)
               AND (?3 IS NULL OR l.occurred_at >= ?3)
               AND (?4 IS NULL OR l.occurred_at < ?4)",
            params![
                referrer_id,
                filter.status.map(EntryStatus::as_str),
                filter.since.map(to_millis),
                filter.until.map(to_millis),
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ── Test / summary helpers ────────────────────────────────────

    /// Number of ledger rows owned by a referrer, well-formed or not.
    pub fn ledger_entry_count(&self, referrer_id: &str) -> LedgerResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entry WHERE referrer_id = ?1",
            params![referrer_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Accounts whose balance or count disagrees with their ledger.
    /// Empty when the ledger invariants hold.
    pub fn inconsistent_accounts(&self) -> LedgerResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.account_id
             FROM account a
             LEFT JOIN (
                 SELECT referrer_id, COUNT(*) AS n, SUM(coins_earned) AS coins
                 FROM ledger_entry GROUP BY referrer_id
             ) l ON l.referrer_id = a.account_id
             WHERE a.referral_count <> COALESCE(l.n, 0)
                OR a.coin_balance   <> COALESCE(l.coins, 0)
             ORDER BY a.account_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Insert a ledger row verbatim, bypassing the reward path.
    /// Only for tests that need malformed history.
    #[doc(hidden)]
    pub fn insert_raw_ledger_row(&self, row: &RawLedgerRow) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO ledger_entry
                (referrer_id, referred_account_id, coins_earned, occurred_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &row.referrer_id,
                &row.referred_account_id,
                row.coins_earned,
                row.occurred_at_ms,
                &row.status,
            ],
        )?;
        Ok(())
    }
}
