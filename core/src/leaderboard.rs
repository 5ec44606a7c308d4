//! Leaderboard ranker.
//!
//! ORDER (total, stable while data is static):
//!   1. referral_count DESC
//!   2. coin_balance   DESC
//!   3. created_at     ASC  (earlier accounts win a full tie)
//!   4. account_id     ASC  (identical timestamps)
//!
//! Ranks are global: rank = (page - 1) * page_size + index + 1.
//! Each call reads current state; ranks may shift between page
//! fetches while referrals are being credited.

use serde::Serialize;

use crate::{
    account::AccountFilter,
    config::EngineConfig,
    error::LedgerResult,
    pagination::{clamp_page, clamp_page_size, Pagination},
    store::LedgerStore,
    types::{AccountId, Coins},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank:           u64,
    pub account_id:     AccountId,
    pub name:           String,
    pub referral_code:  String,
    pub referral_count: u64,
    pub coin_balance:   Coins,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardPage {
    pub entries:    Vec<LeaderboardEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountRank {
    pub rank:         u64,
    pub total_ranked: u64,
}

pub fn get_leaderboard(
    store: &LedgerStore,
    config: &EngineConfig,
    page: u32,
    page_size: u32,
) -> LedgerResult<LeaderboardPage> {
    let page_size = clamp_page_size(
        page_size,
        config.leaderboard.default_page_size,
        config.leaderboard.max_page_size,
    );
    let total = store.ranked_account_count()?;
    let pagination = Pagination::new(clamp_page(page), page_size, total);
    let first_rank = pagination.offset() + 1;

    let entries = store
        .leaderboard_rows(page_size, pagination.offset())?
        .into_iter()
        .enumerate()
        .map(|(i, row)| LeaderboardEntry {
            rank: first_rank + i as u64,
            account_id: row.account_id,
            name: row.display_name,
            referral_code: row.referral_code,
            referral_count: row.referral_count,
            coin_balance: row.coin_balance,
        })
        .collect();

    Ok(LeaderboardPage { entries, pagination })
}

/// The account's own global rank, or None when it is not on the board
/// (ineligible or no referrals yet).
pub fn account_rank(store: &LedgerStore, account_id: &str) -> LedgerResult<Option<AccountRank>> {
    let account = store.require_account(account_id, AccountFilter::Any)?;
    if !account.eligible() || account.referral_count == 0 {
        return Ok(None);
    }
    let ahead = store.accounts_ranked_ahead(&account)?;
    let total_ranked = store.ranked_account_count()?;
    Ok(Some(AccountRank { rank: ahead + 1, total_ranked }))
}
