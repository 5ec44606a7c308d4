//! Stats, analytics and history over a ledger built on a pinned clock.

use chrono::{DateTime, Duration, TimeZone, Utc};
use referral_core::{
    account::{EntryStatus, RawLedgerRow},
    clock::{Clock, ManualClock},
    history::{HistoryFilter, HistoryRequest, HistorySortBy, SortOrder},
    milestones::NextMilestone,
    LedgerError, ReferralEngine,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap()
}

struct Fixture {
    clock:    ManualClock,
    engine:   ReferralEngine,
    referrer: String,
}

/// One referrer with six rewarded referrals spread over 40 days and
/// one referred sign-up that never verified:
///   day 0  → 1 referral
///   day 35 → 3 referrals
///   day 40 → 2 referrals (today)
fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = ManualClock::new(start());
    let mut engine = ReferralEngine::build_test(clock.clone(), 5).expect("build test engine");

    let reg = engine.register_account("Stella", "stella@example.com", None).unwrap();
    let referrer = reg.account.account_id;
    let code = reg.account.referral_code;
    engine.set_verified(&referrer, true).unwrap();

    let refer = |engine: &mut ReferralEngine, n: usize| {
        for i in 0..n {
            let reg = engine
                .register_account(&format!("Friend{i}"), "friend@example.com", Some(&code))
                .unwrap();
            engine.handle_user_verified(&reg.account.account_id).unwrap();
        }
    };
    refer(&mut engine, 1);
    clock.advance(Duration::days(35));
    refer(&mut engine, 3);
    clock.advance(Duration::days(5));
    refer(&mut engine, 2);

    engine.register_account("Lurker", "lurker@example.com", Some(&code)).unwrap();

    Fixture { clock, engine, referrer }
}

impl Fixture {
    fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[test]
fn stats_summarise_the_ledger() {
    let f = fixture();
    let stats = f.engine.get_stats(&f.referrer).unwrap();

    assert_eq!(stats.total_referrals, 6);
    assert_eq!(stats.total_coins, 60);
    assert_eq!(stats.total_coins_from_referrals, 60);
    assert_eq!(stats.recent_referrals, 5, "day-0 referral is outside 30 days");
    assert_eq!(stats.recent_window_days, 30);
    assert_eq!(stats.referred_signups, 7);
    assert!((stats.conversion_rate - 6.0 / 7.0 * 100.0).abs() < 1e-9);
    assert_eq!(stats.average_coins_per_referral, 10.0);
    assert_eq!(stats.skipped_entries, 0);

    assert_eq!(stats.referral_history.len(), 6);
    assert!(stats
        .referral_history
        .windows(2)
        .all(|w| w[0].occurred_at >= w[1].occurred_at));
    assert_eq!(stats.referral_history[0].occurred_at, f.clock_now());
}

#[test]
fn analytics_buckets_by_day() {
    let f = fixture();
    let analytics = f.engine.get_analytics(&f.referrer, 7).unwrap();

    assert_eq!(analytics.period.days, 7);
    assert_eq!(analytics.period.end, f.clock_now().date_naive());
    assert_eq!(analytics.period.start, f.clock_now().date_naive() - Duration::days(6));
    assert_eq!(analytics.chart_data.len(), 7);
    assert_eq!(analytics.chart_data[0].referrals, 2);
    assert_eq!(analytics.chart_data[0].coins, 20);
    assert_eq!(analytics.chart_data[5].referrals, 3);
    assert!(analytics
        .chart_data
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 0 && *i != 5)
        .all(|(_, b)| b.referrals == 0 && b.coins == 0));

    assert_eq!(analytics.totals.total_referrals, 6);
    assert_eq!(analytics.totals.period_referrals, 5);
    assert_eq!(analytics.totals.period_coins, 50);

    let achieved: Vec<u64> = analytics.milestones.achieved.iter().map(|m| m.target).collect();
    assert_eq!(achieved, vec![1, 5]);
    assert!(matches!(
        analytics.milestones.next,
        NextMilestone::Pending { target: 10, remaining: 4, .. }
    ));
    // Milestone rewards are advisory: the balance only holds referral coins.
    assert_eq!(f.engine.account(&f.referrer).unwrap().coin_balance, 60);
}

#[test]
fn analytics_horizon_is_clamped() {
    let f = fixture();
    assert_eq!(f.engine.get_analytics(&f.referrer, 0).unwrap().chart_data.len(), 30);
    let long = f.engine.get_analytics(&f.referrer, 5000).unwrap();
    assert_eq!(long.period.days, 365);
    assert_eq!(long.totals.period_referrals, 6);
}

#[test]
fn history_sorts_pages_and_filters() {
    let f = fixture();

    let newest = f.engine.get_history(&f.referrer, &HistoryRequest::default()).unwrap();
    assert_eq!(newest.entries.len(), 6);
    assert_eq!(newest.pagination.page_size, 10);
    assert!(newest.entries.windows(2).all(|w| {
        (w[0].occurred_at, w[0].entry_id) > (w[1].occurred_at, w[1].entry_id)
    }));
    assert!(newest.entries.iter().all(|e| e.status == EntryStatus::Verified));
    assert!(newest.entries.iter().all(|e| e.referred_name.is_some()));

    let oldest_first = f
        .engine
        .get_history(
            &f.referrer,
            &HistoryRequest { sort_order: SortOrder::Asc, page_size: 2, page: 3, ..Default::default() },
        )
        .unwrap();
    assert_eq!(oldest_first.entries.len(), 2);
    assert_eq!(oldest_first.pagination.total_pages, 3);
    assert!(!oldest_first.pagination.has_next);
    assert_eq!(oldest_first.entries[1].occurred_at, f.clock_now());

    let by_coins = f
        .engine
        .get_history(
            &f.referrer,
            &HistoryRequest { sort_by: HistorySortBy::CoinsEarned, ..Default::default() },
        )
        .unwrap();
    let ids: Vec<i64> = by_coins.entries.iter().map(|e| e.entry_id).collect();
    let mut expected = ids.clone();
    expected.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(ids, expected, "equal amounts fall back to entry order");

    let recent = f
        .engine
        .get_history(
            &f.referrer,
            &HistoryRequest {
                filter: HistoryFilter { since: Some(start() + Duration::days(30)), ..Default::default() },
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(recent.entries.len(), 5);
    assert_eq!(recent.summary.filtered_entries, 5);
    assert_eq!(recent.summary.filtered_coins, 50);
    assert_eq!(recent.summary.total_entries, 6);
    assert_eq!(recent.summary.total_coins, 60);

    let window = f
        .engine
        .get_history(
            &f.referrer,
            &HistoryRequest {
                filter: HistoryFilter {
                    since: Some(start()),
                    until: Some(start() + Duration::days(40)),
                    status: Some(EntryStatus::Verified),
                },
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(window.summary.filtered_entries, 4, "until is exclusive");

    let pending = f
        .engine
        .get_history(
            &f.referrer,
            &HistoryRequest {
                filter: HistoryFilter { status: Some(EntryStatus::Pending), ..Default::default() },
                ..Default::default()
            },
        )
        .unwrap();
    assert!(pending.entries.is_empty());
    assert_eq!(pending.pagination.total_pages, 0);
}

#[test]
fn history_page_size_is_capped() {
    let f = fixture();
    let page = f
        .engine
        .get_history(&f.referrer, &HistoryRequest { page_size: 1000, ..Default::default() })
        .unwrap();
    assert_eq!(page.pagination.page_size, 100);
}

#[test]
fn malformed_rows_are_skipped_not_fatal() {
    let f = fixture();
    let now_ms = f.clock_now().timestamp_millis();
    let raw = |referred: &str, coins: i64, status: &str| RawLedgerRow {
        entry_id: 0,
        referrer_id: f.referrer.clone(),
        referred_account_id: referred.to_string(),
        referred_name: None,
        coins_earned: coins,
        occurred_at_ms: now_ms,
        status: status.to_string(),
    };
    f.engine.store().insert_raw_ledger_row(&raw("corrupt-1", -5, "verified")).unwrap();
    f.engine.store().insert_raw_ledger_row(&raw("corrupt-2", 10, "bogus")).unwrap();

    let stats = f.engine.get_stats(&f.referrer).unwrap();
    assert_eq!(stats.skipped_entries, 2);
    assert_eq!(stats.total_coins_from_referrals, 60);
    assert_eq!(stats.referral_history.len(), 6);

    let page = f
        .engine
        .get_history(&f.referrer, &HistoryRequest { page_size: 100, ..Default::default() })
        .unwrap();
    assert_eq!(page.entries.len(), 6);
    assert_eq!(page.summary.skipped_entries, 2);
    assert_eq!(page.summary.total_entries, 6);

    let analytics = f.engine.get_analytics(&f.referrer, 7).unwrap();
    assert_eq!(analytics.skipped_entries, 2);
    assert_eq!(analytics.chart_data[0].referrals, 2);
}

#[test]
fn fresh_account_has_zero_ratios() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut engine = ReferralEngine::build_test(ManualClock::new(start()), 9).unwrap();
    let id = engine.register_account("Nova", "nova@example.com", None).unwrap().account.account_id;

    let stats = engine.get_stats(&id).unwrap();
    assert_eq!(stats.total_referrals, 0);
    assert_eq!(stats.conversion_rate, 0.0);
    assert_eq!(stats.average_coins_per_referral, 0.0);
    assert!(stats.referral_history.is_empty());

    let analytics = engine.get_analytics(&id, 0).unwrap();
    assert_eq!(analytics.chart_data.len(), 30);
    assert!(analytics.chart_data.iter().all(|b| b.referrals == 0));
    assert_eq!(analytics.milestones.next.target(), Some(1));
}

#[test]
fn unknown_or_deleted_accounts_are_not_found() {
    let f = fixture();
    let err = f.engine.get_stats("nobody").unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound { .. }), "{err}");

    f.engine.soft_delete(&f.referrer).unwrap();
    let err = f.engine.get_history(&f.referrer, &HistoryRequest::default()).unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound { .. }), "{err}");
}
