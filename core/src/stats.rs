//! Stats aggregator: read-only summaries of one referrer's ledger.
//!
//! Every ratio returns 0.0 when its denominator is zero. Malformed
//! ledger rows are skipped and reported in `skipped_entries` so one
//! bad row never takes down a whole summary.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::{
    account::{validate_rows, AccountFilter, LedgerEntry},
    config::EngineConfig,
    error::LedgerResult,
    milestones::{milestones, MilestoneProgress},
    store::LedgerStore,
    types::{AccountId, Coins},
};

#[derive(Debug, Clone, Serialize)]
pub struct ReferralStats {
    pub account_id:                 AccountId,
    pub referral_code:              String,
    pub total_referrals:            u64,
    pub total_coins:                Coins,
    pub total_coins_from_referrals: Coins,
    pub recent_referrals:           u64,
    pub recent_window_days:         u32,
    pub referred_signups:           u64,
    pub conversion_rate:            f64,
    pub average_coins_per_referral: f64,
    /// Most recent entries first.
    pub referral_history:           Vec<LedgerEntry>,
    pub skipped_entries:            u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyBucket {
    pub date:      NaiveDate,
    pub referrals: u64,
    pub coins:     Coins,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsPeriod {
    pub days:  u32,
    pub start: NaiveDate,
    pub end:   NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsTotals {
    pub total_referrals:            u64,
    pub total_coins:                Coins,
    pub period_referrals:           u64,
    pub period_coins:               Coins,
    pub conversion_rate:            f64,
    pub average_coins_per_referral: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralAnalytics {
    pub period:          AnalyticsPeriod,
    pub totals:          AnalyticsTotals,
    /// One bucket per calendar day, most recent first.
    pub chart_data:      Vec<DailyBucket>,
    pub milestones:      MilestoneProgress,
    pub skipped_entries: u64,
}

/// Rewarded referrals as a percentage of referred sign-ups.
pub fn conversion_rate(referral_count: u64, referred_signups: u64) -> f64 {
    if referral_count == 0 || referred_signups == 0 {
        return 0.0;
    }
    referral_count as f64 / referred_signups as f64 * 100.0
}

pub fn average_coins_per_referral(coins: Coins, referral_count: u64) -> f64 {
    if referral_count == 0 {
        return 0.0;
    }
    coins as f64 / referral_count as f64
}

/// Entries with `occurred_at` inside `(now - window, now]`.
pub fn recent_count(entries: &[LedgerEntry], now: DateTime<Utc>, window: Duration) -> u64 {
    let cutoff = now - window;
    entries
        .iter()
        .filter(|e| e.occurred_at > cutoff && e.occurred_at <= now)
        .count() as u64
}

/// Build `days` empty buckets ending at `today`, then fold entries in.
/// Days without activity stay in the series with zero counts.
pub fn daily_buckets(entries: &[LedgerEntry], today: NaiveDate, days: u32) -> Vec<DailyBucket> {
    let mut buckets: Vec<DailyBucket> = (0..days as i64)
        .map(|back| DailyBucket {
            date: today - Duration::days(back),
            referrals: 0,
            coins: 0,
        })
        .collect();

    for entry in entries {
        let back = (today - entry.occurred_at.date_naive()).num_days();
        if (0..days as i64).contains(&back) {
            let bucket = &mut buckets[back as usize];
            bucket.referrals += 1;
            bucket.coins += entry.coins_earned;
        }
    }
    buckets
}

/// Clamp a requested horizon; 0 means the configured default.
pub fn clamp_period_days(requested: u32, config: &EngineConfig) -> u32 {
    let days = if requested == 0 { config.stats.default_period_days } else { requested };
    days.clamp(1, config.stats.max_period_days)
}

pub fn get_stats(
    store: &LedgerStore,
    config: &EngineConfig,
    now: DateTime<Utc>,
    account_id: &str,
) -> LedgerResult<ReferralStats> {
    let account = store.require_account(account_id, AccountFilter::Live)?;
    let (entries, skipped) = validate_rows(store.ledger_rows(account_id, None)?);

    let coins_from_referrals: Coins = entries.iter().map(|e| e.coins_earned).sum();
    let window_days = config.stats.recent_window_days;
    let recent = recent_count(&entries, now, Duration::days(window_days as i64));
    let signups = store.referred_signup_count(account_id)?;

    let (mut history, history_skipped) =
        validate_rows(store.recent_ledger_rows(account_id, config.stats.history_preview_len)?);
    history.truncate(config.stats.history_preview_len as usize);
    log::debug!(
        "stats for {account_id}: {} entries, {skipped} skipped, {history_skipped} skipped in preview",
        entries.len()
    );

    Ok(ReferralStats {
        account_id: account.account_id,
        referral_code: account.referral_code,
        total_referrals: account.referral_count,
        total_coins: account.coin_balance,
        total_coins_from_referrals: coins_from_referrals,
        recent_referrals: recent,
        recent_window_days: window_days,
        referred_signups: signups,
        conversion_rate: conversion_rate(account.referral_count, signups),
        average_coins_per_referral: average_coins_per_referral(coins_from_referrals, account.referral_count),
        referral_history: history,
        skipped_entries: skipped,
    })
}

pub fn get_analytics(
    store: &LedgerStore,
    config: &EngineConfig,
    now: DateTime<Utc>,
    account_id: &str,
    period_days: u32,
) -> LedgerResult<ReferralAnalytics> {
    let account = store.require_account(account_id, AccountFilter::Live)?;
    let days = clamp_period_days(period_days, config);
    let today = now.date_naive();
    let start = today - Duration::days(days as i64 - 1);
    let since = start.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());

    let (all_entries, skipped) = validate_rows(store.ledger_rows(account_id, None)?);
    let coins_from_referrals: Coins = all_entries.iter().map(|e| e.coins_earned).sum();
    let period_entries: Vec<LedgerEntry> = all_entries
        .into_iter()
        .filter(|e| since.map_or(true, |s| e.occurred_at >= s))
        .collect();

    let chart_data = daily_buckets(&period_entries, today, days);
    let period_referrals = chart_data.iter().map(|b| b.referrals).sum();
    let period_coins = chart_data.iter().map(|b| b.coins).sum();
    let signups = store.referred_signup_count(account_id)?;

    Ok(ReferralAnalytics {
        period: AnalyticsPeriod { days, start, end: today },
        totals: AnalyticsTotals {
            total_referrals: account.referral_count,
            total_coins: account.coin_balance,
            period_referrals,
            period_coins,
            conversion_rate: conversion_rate(account.referral_count, signups),
            average_coins_per_referral: average_coins_per_referral(coins_from_referrals, account.referral_count),
        },
        chart_data,
        milestones: milestones(&config.milestones, account.referral_count),
        skipped_entries: skipped,
    })
}
