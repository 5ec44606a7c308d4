//! Audit events for every state change the engine makes.
//!
//! RULE: Events are appended in the same transaction as the change
//! they describe. The log never shows a change that did not commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Coins};

/// Variants are appended only, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReferralEvent {
    AccountRegistered {
        account_id: AccountId,
        referral_code: String,
        code_attempts: u32,
    },
    ReferralLinked {
        account_id: AccountId,
        referrer_id: AccountId,
    },
    RewardCredited {
        referrer_id: AccountId,
        referred_account_id: AccountId,
        coins_earned: Coins,
        new_balance: Coins,
        new_referral_count: u64,
    },
}

impl ReferralEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AccountRegistered { .. } => "account_registered",
            Self::ReferralLinked { .. }    => "referral_linked",
            Self::RewardCredited { .. }    => "reward_credited",
        }
    }

    /// The account whose history this event belongs to.
    pub fn subject(&self) -> &str {
        match self {
            Self::AccountRegistered { account_id, .. } => account_id,
            Self::ReferralLinked { account_id, .. }    => account_id,
            Self::RewardCredited { referrer_id, .. }   => referrer_id,
        }
    }
}

/// One persisted row of the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:          Option<i64>,
    pub account_id:  AccountId,
    pub event_type:  String,
    pub payload:     String,
    pub recorded_at: DateTime<Utc>,
}
