//! Paginated, filterable ledger history for one referrer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    account::{validate_rows, AccountFilter, EntryStatus, LedgerEntry},
    config::EngineConfig,
    error::LedgerResult,
    pagination::{clamp_page, clamp_page_size, Pagination},
    store::LedgerStore,
    types::Coins,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySortBy {
    #[default]
    OccurredAt,
    CoinsEarned,
}

impl HistorySortBy {
    /// Lenient parse for query-string style input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "occurredat" | "occurred_at" | "createdat" | "created_at" | "date" => Some(Self::OccurredAt),
            "coinsearned" | "coins_earned" | "coins" => Some(Self::CoinsEarned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Some(Self::Asc),
            "desc" | "descending" | "-1" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// All fields optional; `until` is exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    pub status: Option<EntryStatus>,
    pub since:  Option<DateTime<Utc>>,
    pub until:  Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.since.is_none() && self.until.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryRequest {
    /// 1-based; 0 reads as 1.
    pub page:       u32,
    /// 0 means the configured default.
    pub page_size:  u32,
    pub sort_by:    HistorySortBy,
    pub sort_order: SortOrder,
    pub filter:     HistoryFilter,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistorySummary {
    pub total_entries:    u64,
    pub total_coins:      Coins,
    pub filtered_entries: u64,
    pub filtered_coins:   Coins,
    /// Malformed rows dropped from this page.
    pub skipped_entries:  u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub entries:    Vec<LedgerEntry>,
    pub pagination: Pagination,
    pub summary:    HistorySummary,
}

pub fn get_history(
    store: &LedgerStore,
    config: &EngineConfig,
    account_id: &str,
    request: &HistoryRequest,
) -> LedgerResult<HistoryPage> {
    store.require_account(account_id, AccountFilter::Live)?;

    let page_size = clamp_page_size(
        request.page_size,
        config.stats.default_history_page_size,
        config.stats.max_history_page_size,
    );
    let matching = store.history_row_count(account_id, &request.filter)?;
    let pagination = Pagination::new(clamp_page(request.page), page_size, matching);

    let rows = store.history_rows(
        account_id,
        &request.filter,
        request.sort_by,
        request.sort_order,
        page_size,
        pagination.offset(),
    )?;
    let (entries, skipped) = validate_rows(rows);

    let all = store.ledger_totals(account_id, &HistoryFilter::default())?;
    let filtered = if request.filter.is_empty() {
        all
    } else {
        store.ledger_totals(account_id, &request.filter)?
    };

    Ok(HistoryPage {
        entries,
        pagination,
        summary: HistorySummary {
            total_entries: all.entries,
            total_coins: all.coins,
            filtered_entries: filtered.entries,
            filtered_coins: filtered.coins,
            skipped_entries: skipped,
        },
    })
}
