//! Account creation path used by the identity collaborator.
//!
//! The referral code is assigned in the same insert that creates the
//! account. A code collision surfaces as a unique-constraint failure,
//! and the generator is asked for another candidate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    account::Account,
    code_generator::CodeGenerator,
    code_validator::{link_referrer, LinkOutcome},
    error::{LedgerError, LedgerResult},
    event::ReferralEvent,
    store::LedgerStore,
};

#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub display_name:  &'a str,
    pub contact:       &'a str,
    /// Code typed in at sign-up, if any.
    pub referral_code: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub account:       Account,
    /// Present when a referral code was supplied.
    pub referral:      Option<LinkOutcome>,
    pub code_attempts: u32,
}

pub fn register_account(
    store: &mut LedgerStore,
    generator: &mut CodeGenerator,
    new: &NewAccount<'_>,
    now: DateTime<Utc>,
) -> LedgerResult<Registration> {
    let account_id = Uuid::new_v4().to_string();
    // Name-derived attempts, then as many fallback attempts.
    let attempts = generator.max_attempts().saturating_mul(2).max(1);

    let mut created = None;
    for attempt in 0..attempts {
        let code = generator.candidate(new.display_name, new.contact, now, attempt);
        let account = Account {
            account_id: account_id.clone(),
            display_name: new.display_name.to_string(),
            contact: new.contact.to_string(),
            referral_code: code.clone(),
            referred_by: None,
            coin_balance: 0,
            referral_count: 0,
            verified: false,
            active: true,
            deleted_at: None,
            created_at: now,
        };
        let event = ReferralEvent::AccountRegistered {
            account_id: account_id.clone(),
            referral_code: code.clone(),
            code_attempts: attempt + 1,
        };
        if store.insert_account(&account, &event, now)? {
            created = Some((account, attempt + 1));
            break;
        }
        log::debug!("referral code {code} taken, regenerating (attempt {})", attempt + 1);
    }

    let Some((mut account, code_attempts)) = created else {
        log::error!("no unique referral code for {account_id} after {attempts} attempts");
        return Err(LedgerError::CodeSpaceExhausted { attempts });
    };
    log::info!("registered account {} with code {}", account.account_id, account.referral_code);

    let referral = match new.referral_code {
        Some(raw) if !raw.trim().is_empty() => {
            let outcome = link_referrer(store, &account.account_id, raw, now)?;
            if let LinkOutcome::Linked { referrer_id } = &outcome {
                account.referred_by = Some(referrer_id.clone());
            }
            Some(outcome)
        }
        _ => None,
    };

    Ok(Registration { account, referral, code_attempts })
}
