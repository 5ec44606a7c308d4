//! Reward processor: the only code path that moves coins.
//!
//! One verification event becomes one write transaction:
//!   1. load referrer and referred account
//!   2. check eligibility and verification
//!   3. conditional ledger append keyed on (referrer, referred)
//!   4. balance and count update
//!   5. audit event
//!   6. commit
//!
//! The duplicate check in step 3 runs inside the write transaction,
//! so duplicate or concurrent deliveries of the same event credit
//! exactly once, across threads and processes alike.
//! On a lock conflict the whole transaction is retried with backoff.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::{
    account::EntryStatus,
    config::{EngineConfig, RetryConfig},
    error::{is_conflict, LedgerError, LedgerResult},
    event::ReferralEvent,
    store::LedgerStore,
    types::Coins,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewardOutcome {
    pub credited:     bool,
    pub coins_earned: Coins,
}

impl RewardOutcome {
    pub const ALREADY_CREDITED: Self = Self { credited: false, coins_earned: 0 };
}

#[derive(Debug, Clone)]
pub struct RewardProcessor {
    coins_per_referral: Coins,
    retry:              RetryConfig,
}

impl RewardProcessor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            coins_per_referral: config.reward.coins_per_referral,
            retry: config.retry.clone(),
        }
    }

    pub fn coins_per_referral(&self) -> Coins {
        self.coins_per_referral
    }

    /// Credit `referrer_id` for `referred_id` at most once.
    /// `now` is read per attempt so a retried entry carries the time
    /// it actually committed.
    pub fn process(
        &self,
        store: &mut LedgerStore,
        now: impl Fn() -> DateTime<Utc>,
        referrer_id: &str,
        referred_id: &str,
    ) -> LedgerResult<RewardOutcome> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.credit_once(store, now(), referrer_id, referred_id) {
                Err(LedgerError::Database(ref e)) if is_conflict(e) => {
                    if attempt >= self.retry.max_attempts {
                        log::error!(
                            "reward {referrer_id}<-{referred_id} abandoned after {attempt} conflicting attempts"
                        );
                        return Err(LedgerError::TransientStoreConflict { attempts: attempt });
                    }
                    let delay = backoff_delay(&self.retry, attempt);
                    log::warn!(
                        "reward {referrer_id}<-{referred_id} conflicted (attempt {attempt}), retrying in {delay:?}"
                    );
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
    }

    fn credit_once(
        &self,
        store: &mut LedgerStore,
        now: DateTime<Utc>,
        referrer_id: &str,
        referred_id: &str,
    ) -> LedgerResult<RewardOutcome> {
        let tx = store.begin_write()?;

        let referrer = tx.account(referrer_id)?.ok_or_else(|| LedgerError::AccountNotFound {
            account_id: referrer_id.to_string(),
        })?;
        let referred = tx.account(referred_id)?.ok_or_else(|| LedgerError::AccountNotFound {
            account_id: referred_id.to_string(),
        })?;

        if !referrer.eligible() {
            return Err(LedgerError::ReferrerNotEligible { referrer_id: referrer_id.to_string() });
        }
        if !referred.verified {
            return Err(LedgerError::ReferredNotVerified { account_id: referred_id.to_string() });
        }
        if referred.referred_by.as_deref() != Some(referrer_id) {
            return Err(LedgerError::ReferrerMismatch {
                referrer_id: referrer_id.to_string(),
                referred_id: referred_id.to_string(),
            });
        }

        let coins = self.coins_per_referral;
        let appended =
            tx.insert_entry_if_absent(referrer_id, referred_id, coins, EntryStatus::Verified, now)?;
        if !appended {
            log::debug!("reward {referrer_id}<-{referred_id} already credited, ignoring redelivery");
            return Ok(RewardOutcome::ALREADY_CREDITED);
        }

        let (new_balance, new_referral_count) = tx.apply_credit(referrer_id, coins)?;
        tx.append_event(
            &ReferralEvent::RewardCredited {
                referrer_id: referrer_id.to_string(),
                referred_account_id: referred_id.to_string(),
                coins_earned: coins,
                new_balance,
                new_referral_count,
            },
            now,
        )?;
        tx.commit()?;

        log::info!(
            "credited {coins} coins to {referrer_id} for {referred_id} (balance {new_balance}, referrals {new_referral_count})"
        );
        Ok(RewardOutcome { credited: true, coins_earned: coins })
    }
}

/// Exponential backoff for the given 1-based attempt, capped.
pub fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let ms = retry.base_backoff_ms.saturating_mul(factor).min(retry.max_backoff_ms);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let retry = RetryConfig { base_backoff_ms: 10, max_backoff_ms: 500, ..RetryConfig::default() };
        let delays: Vec<u64> = (1..=8).map(|a| backoff_delay(&retry, a).as_millis() as u64).collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 320, 500, 500]);
        assert_eq!(backoff_delay(&retry, 200), Duration::from_millis(500));
    }
}
