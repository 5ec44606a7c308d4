use super::{from_millis, to_millis, LedgerStore};
use crate::{
    account::{Account, AccountFilter},
    error::LedgerResult,
    types::{AccountId, Coins},
};
use chrono::{DateTime, Utc};
use rusqlite::params;

/// The ranking order. Total: account_id breaks identical timestamps.
const RANK_ORDER: &str =
    "a.referral_count DESC, a.coin_balance DESC, a.created_at ASC, a.account_id ASC";

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub account_id:     AccountId,
    pub display_name:   String,
    pub referral_code:  String,
    pub referral_count: u64,
    pub coin_balance:   Coins,
    pub created_at:     DateTime<Utc>,
}

fn ranked_where() -> String {
    format!("{} AND a.referral_count > 0", AccountFilter::Eligible.sql())
}

impl LedgerStore {
    // ── Leaderboard ───────────────────────────────────────────────

    /// Eligible accounts with at least one referral.
    pub fn ranked_account_count(&self) -> LedgerResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM account a WHERE {}", ranked_where());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn leaderboard_rows(&self, limit: u32, offset: u64) -> LedgerResult<Vec<LeaderboardRow>> {
        let sql = format!(
            "SELECT a.account_id, a.display_name, a.referral_code,
                    a.referral_count, a.coin_balance, a.created_at
             FROM account a
             WHERE {}
             ORDER BY {RANK_ORDER}
             LIMIT ?1 OFFSET ?2",
            ranked_where()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(LeaderboardRow {
                    account_id: row.get(0)?,
                    display_name: row.get(1)?,
                    referral_code: row.get(2)?,
                    referral_count: row.get::<_, i64>(3)? as u64,
                    coin_balance: row.get::<_, i64>(4)? as Coins,
                    created_at: from_millis(row.get(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of ranked accounts strictly ahead of `account` in RANK_ORDER.
    pub fn accounts_ranked_ahead(&self, account: &Account) -> LedgerResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM account a
             WHERE {}
               AND (a.referral_count > ?1
                 OR (a.referral_count = ?1 AND (a.coin_balance > ?2
                 OR (a.coin_balance = ?2 AND (a.created_at < ?3
                 OR (a.created_at = ?3 AND a.account_id < ?4))))))",
            ranked_where()
        );
        let count: i64 = self.conn.query_row(
            &sql,
            params![
                account.referral_count as i64,
                account.coin_balance as i64,
                to_millis(account.created_at),
                &account.account_id,
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
