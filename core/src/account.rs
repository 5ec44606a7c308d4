//! Account and ledger records owned by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Coins};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub account_id:     AccountId,
    pub display_name:   String,
    pub contact:        String,
    pub referral_code:  String,
    pub referred_by:    Option<AccountId>,
    pub coin_balance:   Coins,
    pub referral_count: u64,
    pub verified:       bool,
    pub active:         bool,
    pub deleted_at:     Option<DateTime<Utc>>,
    pub created_at:     DateTime<Utc>,
}

impl Account {
    /// Verified, active and not soft-deleted. Mirrors AccountFilter::Eligible.
    pub fn eligible(&self) -> bool {
        self.verified && self.active && self.deleted_at.is_none()
    }
}

/// Read-path predicate applied at every account lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountFilter {
    /// Every record, including soft-deleted ones.
    Any,
    /// Not soft-deleted.
    Live,
    /// Verified, active and not soft-deleted.
    Eligible,
}

impl AccountFilter {
    /// SQL predicate over an `account` table aliased as `a`.
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Any      => "1 = 1",
            Self::Live     => "a.deleted_at IS NULL",
            Self::Eligible => "a.deleted_at IS NULL AND a.is_verified = 1 AND a.is_active = 1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Verified,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending  => "pending",
            Self::Verified => "verified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending"  => Some(Self::Pending),
            "verified" => Some(Self::Verified),
            _ => None,
        }
    }
}

/// An immutable record that a referrer was credited for one referral.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub entry_id:            i64,
    pub referrer_id:         AccountId,
    pub referred_account_id: AccountId,
    /// Display name of the referred account, if it still exists.
    pub referred_name:       Option<String>,
    pub coins_earned:        Coins,
    pub occurred_at:         DateTime<Utc>,
    pub status:              EntryStatus,
}

/// A ledger row as stored, before validation.
#[derive(Debug, Clone)]
pub struct RawLedgerRow {
    pub entry_id:            i64,
    pub referrer_id:         AccountId,
    pub referred_account_id: AccountId,
    pub referred_name:       Option<String>,
    pub coins_earned:        i64,
    pub occurred_at_ms:      i64,
    pub status:              String,
}

impl RawLedgerRow {
    /// Validate a stored row. Returns None for malformed history,
    /// which readers skip and count rather than failing.
    pub fn into_entry(self) -> Option<LedgerEntry> {
        let status = EntryStatus::parse(&self.status)?;
        if self.coins_earned <= 0 {
            return None;
        }
        let occurred_at = DateTime::<Utc>::from_timestamp_millis(self.occurred_at_ms)?;
        Some(LedgerEntry {
            entry_id: self.entry_id,
            referrer_id: self.referrer_id,
            referred_account_id: self.referred_account_id,
            referred_name: self.referred_name,
            coins_earned: self.coins_earned as Coins,
            occurred_at,
            status,
        })
    }
}

/// Split raw rows into valid entries and a count of skipped ones.
pub fn validate_rows(rows: Vec<RawLedgerRow>) -> (Vec<LedgerEntry>, u64) {
    let mut skipped = 0u64;
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.entry_id;
        match row.into_entry() {
            Some(entry) => entries.push(entry),
            None => {
                skipped += 1;
                log::warn!("skipping malformed ledger entry id={id}");
            }
        }
    }
    (entries, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(coins: i64, status: &str) -> RawLedgerRow {
        RawLedgerRow {
            entry_id: 1,
            referrer_id: "r".into(),
            referred_account_id: "u".into(),
            referred_name: None,
            coins_earned: coins,
            occurred_at_ms: 1_700_000_000_000,
            status: status.into(),
        }
    }

    #[test]
    fn malformed_rows_are_counted_not_fatal() {
        let rows = vec![raw(10, "verified"), raw(0, "verified"), raw(10, "refunded")];
        let (entries, skipped) = validate_rows(rows);
        assert_eq!(entries.len(), 1);
        assert_eq!(skipped, 2);
    }
}
