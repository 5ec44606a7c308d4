use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Account '{account_id}' not found")]
    AccountNotFound { account_id: String },

    #[error("Referrer '{referrer_id}' is not eligible to earn referral rewards")]
    ReferrerNotEligible { referrer_id: String },

    #[error("Referred account '{account_id}' is not verified yet")]
    ReferredNotVerified { account_id: String },

    #[error("Account '{referred_id}' was not referred by '{referrer_id}'")]
    ReferrerMismatch {
        referrer_id: String,
        referred_id: String,
    },

    #[error("Store conflict persisted after {attempts} attempts; redeliver the event")]
    TransientStoreConflict { attempts: u32 },

    #[error("Could not assign a unique referral code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    /// True when the caller should re-deliver the triggering event later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStoreConflict { .. })
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// SQLite reports a competing writer as BUSY (file lock) or LOCKED
/// (shared-cache table lock). Both are transaction conflicts.
pub(crate) fn is_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}
