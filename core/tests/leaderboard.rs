//! Leaderboard ranking: order, tie-breaks, global ranks across pages,
//! and exclusion of ineligible accounts.

use chrono::{DateTime, Duration, TimeZone, Utc};
use referral_core::{clock::ManualClock, config::EngineConfig, rng::CodeRng, ReferralEngine};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn build(clock: &ManualClock) -> ReferralEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    ReferralEngine::build_test(clock.clone(), 42).expect("build test engine")
}

/// Register and verify a referrer. Returns (id, code).
fn referrer(engine: &mut ReferralEngine, name: &str) -> (String, String) {
    let reg = engine.register_account(name, "lb@example.com", None).expect("register");
    engine.set_verified(&reg.account.account_id, true).expect("verify");
    (reg.account.account_id, reg.account.referral_code)
}

/// Sign up `n` accounts with `code` and verify each, crediting the referrer.
fn refer(engine: &mut ReferralEngine, code: &str, n: u64) {
    for _ in 0..n {
        let reg = engine.register_account("Guest", "guest@example.com", Some(code)).expect("register");
        let outcome = engine.handle_user_verified(&reg.account.account_id).expect("verify");
        assert!(outcome.is_some_and(|o| o.credited));
    }
}

#[test]
fn pages_carry_global_ranks() {
    let clock = ManualClock::new(start());
    let mut engine = build(&clock);
    for count in 1..=25u64 {
        let (_, code) = referrer(&mut engine, &format!("Ranked{count:02}"));
        refer(&mut engine, &code, count);
    }

    let page = engine.get_leaderboard(2, 10).expect("leaderboard");
    assert_eq!(page.entries.len(), 10);
    assert_eq!(page.pagination.total_items, 25);
    assert_eq!(page.pagination.total_pages, 3);
    assert!(page.pagination.has_next && page.pagination.has_prev);

    let ranks: Vec<u64> = page.entries.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, (11..=20).collect::<Vec<_>>());
    let counts: Vec<u64> = page.entries.iter().map(|e| e.referral_count).collect();
    assert_eq!(counts, (6..=15).rev().collect::<Vec<_>>());
    assert!(page.entries.iter().all(|e| e.coin_balance == e.referral_count * 10));

    let last = engine.get_leaderboard(3, 10).unwrap();
    assert_eq!(last.entries.len(), 5);
    assert_eq!(last.entries.last().unwrap().rank, 25);
    assert!(!last.pagination.has_next);

    let beyond = engine.get_leaderboard(4, 10).unwrap();
    assert!(beyond.entries.is_empty());
}

#[test]
fn repeated_reads_are_identical_and_pages_stitch() {
    let clock = ManualClock::new(start());
    let mut engine = build(&clock);
    // Many exact ties: every referrer has two referrals and 20 coins.
    for i in 0..12 {
        let (_, code) = referrer(&mut engine, &format!("Tied{i:02}"));
        refer(&mut engine, &code, 2);
    }

    let full = engine.get_leaderboard(1, 50).unwrap();
    assert_eq!(full.entries, engine.get_leaderboard(1, 50).unwrap().entries);

    let stitched: Vec<_> = (1..=3)
        .flat_map(|p| engine.get_leaderboard(p, 5).unwrap().entries)
        .collect();
    assert_eq!(stitched, full.entries);
}

/// Rebuild the engine over the same store with another reward amount.
fn with_reward(engine: ReferralEngine, clock: &ManualClock, coins: u64, seed: u64) -> ReferralEngine {
    let mut config = EngineConfig::default_test();
    config.reward.coins_per_referral = coins;
    ReferralEngine::new(engine.into_store(), config, Box::new(clock.clone()), CodeRng::from_seed(seed))
        .expect("rebuild engine")
}

#[test]
fn coin_balance_breaks_count_ties() {
    let clock = ManualClock::new(start());
    let mut engine = build(&clock);
    let (low, low_code) = referrer(&mut engine, "Lowpay");
    let (mid, mid_code) = referrer(&mut engine, "Midpay");
    let (high, high_code) = referrer(&mut engine, "Highpay");
    refer(&mut engine, &low_code, 1);

    let mut engine = with_reward(engine, &clock, 25, 43);
    refer(&mut engine, &high_code, 1);

    let mut engine = with_reward(engine, &clock, 40, 44);
    refer(&mut engine, &mid_code, 1);

    let board = engine.get_leaderboard(1, 10).unwrap().entries;
    let order: Vec<(&str, u64, u64)> = board
        .iter()
        .map(|e| (e.account_id.as_str(), e.referral_count, e.coin_balance))
        .collect();
    assert_eq!(
        order,
        vec![(mid.as_str(), 1, 40), (high.as_str(), 1, 25), (low.as_str(), 1, 10)]
    );
    let ranks: Vec<u64> = board.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    assert_eq!(engine.account_rank(&low).unwrap().map(|r| r.rank), Some(3));
}

#[test]
fn earlier_account_wins_a_full_tie() {
    let clock = ManualClock::new(start());
    let mut engine = build(&clock);

    clock.set(start() + Duration::hours(1));
    let (newer, newer_code) = referrer(&mut engine, "Newer");
    clock.set(start());
    let (older, older_code) = referrer(&mut engine, "Older");
    clock.set(start() + Duration::hours(2));

    refer(&mut engine, &newer_code, 3);
    refer(&mut engine, &older_code, 3);

    let board = engine.get_leaderboard(1, 10).unwrap().entries;
    assert_eq!(board[0].account_id, older);
    assert_eq!(board[1].account_id, newer);
    assert_eq!(engine.account_rank(&older).unwrap().map(|r| r.rank), Some(1));
    assert_eq!(engine.account_rank(&newer).unwrap().map(|r| r.rank), Some(2));
}

#[test]
fn ineligible_accounts_drop_off_the_board() {
    let clock = ManualClock::new(start());
    let mut engine = build(&clock);
    let (a, a_code) = referrer(&mut engine, "Alpha");
    let (b, b_code) = referrer(&mut engine, "Bravo");
    let (c, c_code) = referrer(&mut engine, "Charlie");
    let (idle, _) = referrer(&mut engine, "Idle");
    refer(&mut engine, &a_code, 3);
    refer(&mut engine, &b_code, 2);
    refer(&mut engine, &c_code, 1);

    // No referrals: never ranked.
    assert_eq!(engine.account_rank(&idle).unwrap(), None);
    assert_eq!(engine.get_leaderboard(1, 10).unwrap().pagination.total_items, 3);

    engine.set_active(&a, false).unwrap();
    engine.soft_delete(&b).unwrap();

    let board = engine.get_leaderboard(1, 10).unwrap();
    assert_eq!(board.pagination.total_items, 1);
    assert_eq!(board.entries[0].account_id, c);
    assert_eq!(board.entries[0].rank, 1);
    assert_eq!(engine.account_rank(&a).unwrap(), None);

    let rank = engine.account_rank(&c).unwrap().expect("ranked");
    assert_eq!((rank.rank, rank.total_ranked), (1, 1));
}

#[test]
fn account_rank_matches_board_position() {
    let clock = ManualClock::new(start());
    let mut engine = build(&clock);
    let mut ids = Vec::new();
    for (i, n) in [4u64, 1, 3, 3, 2].into_iter().enumerate() {
        clock.advance(Duration::minutes(1));
        let (id, code) = referrer(&mut engine, &format!("P{i}"));
        refer(&mut engine, &code, n);
        ids.push(id);
    }

    let board = engine.get_leaderboard(1, 10).unwrap().entries;
    for entry in &board {
        let rank = engine.account_rank(&entry.account_id).unwrap().expect("ranked");
        assert_eq!(rank.rank, entry.rank);
        assert_eq!(rank.total_ranked, 5);
    }
    assert_eq!(board[0].account_id, ids[0]);
    assert_eq!(board[1].account_id, ids[2]);
    assert_eq!(board[2].account_id, ids[3]);
}

#[test]
fn page_size_is_clamped() {
    let clock = ManualClock::new(start());
    let mut engine = build(&clock);
    let (_, code) = referrer(&mut engine, "Only");
    refer(&mut engine, &code, 1);

    let huge = engine.get_leaderboard(0, 10_000).unwrap();
    assert_eq!(huge.pagination.page, 1);
    assert_eq!(huge.pagination.page_size, 50);

    let default = engine.get_leaderboard(1, 0).unwrap();
    assert_eq!(default.pagination.page_size, 10);
}
