//! Referral code validation and referrer linking.
//!
//! "No such code" and "code owned by an ineligible account" produce the
//! same public result. Only the internal `reason` tells them apart, so
//! callers cannot tell which codes exist.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    account::{Account, AccountFilter},
    code_generator::MAX_CODE_LEN,
    error::LedgerResult,
    store::LedgerStore,
    types::AccountId,
};

/// Shorter input is rejected before touching the store.
pub const MIN_LOOKUP_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidCodeReason {
    InvalidCodeFormat,
    CodeNotFound,
    ReferrerNotEligible,
    SelfReferral,
}

impl InvalidCodeReason {
    /// User-facing text.
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidCodeFormat => "Referral code format is invalid",
            Self::SelfReferral      => "You cannot use your own referral code",
            Self::CodeNotFound | Self::ReferrerNotEligible => "Invalid referral code",
        }
    }

    /// Internal text for logs.
    pub fn diagnostic(self) -> &'static str {
        match self {
            Self::InvalidCodeFormat   => "malformed code rejected without lookup",
            Self::CodeNotFound        => "no account owns this code",
            Self::ReferrerNotEligible => "code owner is unverified, inactive or deleted",
            Self::SelfReferral        => "code belongs to the applicant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferrerSummary {
    pub account_id:    AccountId,
    pub display_name:  String,
    pub referral_code: String,
}

impl From<&Account> for ReferrerSummary {
    fn from(a: &Account) -> Self {
        Self {
            account_id: a.account_id.clone(),
            display_name: a.display_name.clone(),
            referral_code: a.referral_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeValidation {
    pub valid:    bool,
    pub referrer: Option<ReferrerSummary>,
    pub message:  &'static str,
    #[serde(skip)]
    pub reason:   Option<InvalidCodeReason>,
}

impl CodeValidation {
    fn valid(referrer: &Account) -> Self {
        Self {
            valid: true,
            referrer: Some(referrer.into()),
            message: "Valid referral code",
            reason: None,
        }
    }

    fn invalid(reason: InvalidCodeReason) -> Self {
        log::debug!("referral code rejected: {}", reason.diagnostic());
        Self {
            valid: false,
            referrer: None,
            message: reason.message(),
            reason: Some(reason),
        }
    }
}

/// Strip all whitespace and uppercase.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn format_ok(code: &str) -> bool {
    (MIN_LOOKUP_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Resolve `raw` to an eligible referrer. `applicant` is the account
/// that wants to use the code, when known; its own code is refused.
pub fn validate_code(
    store: &LedgerStore,
    raw: &str,
    applicant: Option<&str>,
) -> LedgerResult<CodeValidation> {
    let code = normalize_code(raw);
    if !format_ok(&code) {
        return Ok(CodeValidation::invalid(InvalidCodeReason::InvalidCodeFormat));
    }

    let Some(owner) = store.account_by_code(&code, AccountFilter::Any)? else {
        return Ok(CodeValidation::invalid(InvalidCodeReason::CodeNotFound));
    };
    if applicant == Some(owner.account_id.as_str()) {
        return Ok(CodeValidation::invalid(InvalidCodeReason::SelfReferral));
    }
    if !owner.eligible() {
        return Ok(CodeValidation::invalid(InvalidCodeReason::ReferrerNotEligible));
    }
    Ok(CodeValidation::valid(&owner))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LinkOutcome {
    Linked { referrer_id: AccountId },
    AlreadyLinked,
    Rejected { message: &'static str, #[serde(skip)] reason: InvalidCodeReason },
}

/// Record that `account_id` was referred by the owner of `raw_code`.
/// A link is set at most once and never to the account itself.
pub fn link_referrer(
    store: &mut LedgerStore,
    account_id: &str,
    raw_code: &str,
    now: DateTime<Utc>,
) -> LedgerResult<LinkOutcome> {
    let account = store.require_account(account_id, AccountFilter::Live)?;
    if account.referred_by.is_some() {
        return Ok(LinkOutcome::AlreadyLinked);
    }

    let validation = validate_code(store, raw_code, Some(account_id))?;
    let referrer = match (validation.valid, validation.referrer, validation.reason) {
        (true, Some(referrer), _) => referrer,
        (_, _, reason) => {
            let reason = reason.unwrap_or(InvalidCodeReason::CodeNotFound);
            return Ok(LinkOutcome::Rejected { message: reason.message(), reason });
        }
    };

    if store.link_referrer(account_id, &referrer.account_id, now)? {
        log::info!("account {account_id} linked to referrer {}", referrer.account_id);
        Ok(LinkOutcome::Linked { referrer_id: referrer.account_id })
    } else {
        Ok(LinkOutcome::AlreadyLinked)
    }
}
