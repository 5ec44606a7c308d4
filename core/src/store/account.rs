use super::{account_from_row, event_log, to_millis, LedgerStore, ACCOUNT_COLUMNS};
use crate::{
    account::{Account, AccountFilter},
    error::{is_unique_violation, LedgerError, LedgerResult},
    event::ReferralEvent,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub(super) fn load_account(
    conn: &Connection,
    account_id: &str,
    filter: AccountFilter,
) -> rusqlite::Result<Option<Account>> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM account a WHERE a.account_id = ?1 AND {}",
        filter.sql()
    );
    conn.query_row(&sql, params![account_id], account_from_row)
        .optional()
}

fn referral_code_taken(err: &rusqlite::Error) -> bool {
    is_unique_violation(err)
        && matches!(err, rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("referral_code"))
}

impl LedgerStore {
    // ── Account ───────────────────────────────────────────────────

    /// Insert a new account together with its registration event.
    /// Returns Ok(false) when the referral code is already taken, so
    /// the caller can regenerate and retry.
    pub fn insert_account(
        &mut self,
        account: &Account,
        event: &ReferralEvent,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO account (
                account_id, display_name, contact, referral_code, referred_by,
                coin_balance, referral_count, is_verified, is_active, deleted_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, NULL, 0, 0, ?5, ?6, NULL, ?7)",
            params![
                &account.account_id,
                &account.display_name,
                &account.contact,
                &account.referral_code,
                account.verified as i32,
                account.active as i32,
                to_millis(account.created_at),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if referral_code_taken(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        event_log::append(&tx, event, now)?;
        tx.commit()?;
        Ok(true)
    }

    pub fn account(
        &self,
        account_id: &str,
        filter: AccountFilter,
    ) -> LedgerResult<Option<Account>> {
        Ok(load_account(&self.conn, account_id, filter)?)
    }

    /// Like `account`, but a missing record is an error.
    pub fn require_account(
        &self,
        account_id: &str,
        filter: AccountFilter,
    ) -> LedgerResult<Account> {
        self.account(account_id, filter)?
            .ok_or_else(|| LedgerError::AccountNotFound { account_id: account_id.to_string() })
    }

    /// Look up by an already-normalised referral code.
    pub fn account_by_code(
        &self,
        code: &str,
        filter: AccountFilter,
    ) -> LedgerResult<Option<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account a WHERE a.referral_code = ?1 AND {}",
            filter.sql()
        );
        Ok(self
            .conn
            .query_row(&sql, params![code], account_from_row)
            .optional()?)
    }

    /// Record `referred_by` once. The conditional write enforces that
    /// the link is never reassigned and never points at the account
    /// itself, even if two requests race. Returns whether it was set.
    pub fn link_referrer(
        &mut self,
        account_id: &str,
        referrer_id: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE account SET referred_by = ?2
             WHERE account_id = ?1 AND referred_by IS NULL AND account_id <> ?2",
            params![account_id, referrer_id],
        )?;
        if changed == 1 {
            let event = ReferralEvent::ReferralLinked {
                account_id: account_id.to_string(),
                referrer_id: referrer_id.to_string(),
            };
            event_log::append(&tx, &event, now)?;
        }
        tx.commit()?;
        Ok(changed == 1)
    }

    /// Live accounts whose `referred_by` is this referrer, rewarded or not.
    pub fn referred_signup_count(&self, referrer_id: &str) -> LedgerResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM account a WHERE a.referred_by = ?1 AND {}",
            AccountFilter::Live.sql()
        );
        let count: i64 = self.conn.query_row(&sql, params![referrer_id], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ── Identity collaborator hooks ───────────────────────────────

    pub fn set_verified(&self, account_id: &str, verified: bool) -> LedgerResult<()> {
        self.update_flag(
            "UPDATE account SET is_verified = ?2 WHERE account_id = ?1",
            account_id,
            verified,
        )
    }

    pub fn set_active(&self, account_id: &str, active: bool) -> LedgerResult<()> {
        self.update_flag(
            "UPDATE account SET is_active = ?2 WHERE account_id = ?1",
            account_id,
            active,
        )
    }

    pub fn soft_delete(&self, account_id: &str, at: DateTime<Utc>) -> LedgerResult<()> {
        let changed = self.conn.execute(
            "UPDATE account SET deleted_at = COALESCE(deleted_at, ?2) WHERE account_id = ?1",
            params![account_id, to_millis(at)],
        )?;
        if changed == 0 {
            return Err(LedgerError::AccountNotFound { account_id: account_id.to_string() });
        }
        Ok(())
    }

    fn update_flag(&self, sql: &str, account_id: &str, value: bool) -> LedgerResult<()> {
        let changed = self.conn.execute(sql, params![account_id, value as i32])?;
        if changed == 0 {
            return Err(LedgerError::AccountNotFound { account_id: account_id.to_string() });
        }
        Ok(())
    }

    // ── Test / summary helpers ────────────────────────────────────

    pub fn account_count(&self, filter: AccountFilter) -> LedgerResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM account a WHERE {}", filter.sql());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
