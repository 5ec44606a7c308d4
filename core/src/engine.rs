//! The referral engine, one entry point for every operation.
//!
//! RULES:
//!   - One engine owns one store connection. It is request-scoped and
//!     holds no background tasks.
//!   - Concurrent workers each get their own engine via `fork()`;
//!     engines never share a connection.
//!   - Coins move only through `process_referral_reward`.
//!   - All timestamps come from the engine's Clock.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{
    account::{Account, AccountFilter},
    clock::{Clock, ManualClock, SystemClock},
    code_generator::CodeGenerator,
    code_validator::{self, CodeValidation, LinkOutcome},
    config::EngineConfig,
    error::LedgerResult,
    history::{self, HistoryPage, HistoryRequest},
    leaderboard::{self, AccountRank, LeaderboardPage},
    milestones::{self, MilestoneProgress},
    registration::{self, NewAccount, Registration},
    reward_processor::{RewardOutcome, RewardProcessor},
    rng::CodeRng,
    stats::{self, ReferralAnalytics, ReferralStats},
    store::LedgerStore,
};

pub struct ReferralEngine {
    store:     LedgerStore,
    config:    EngineConfig,
    clock:     Box<dyn Clock>,
    generator: CodeGenerator,
    processor: RewardProcessor,
}

impl ReferralEngine {
    pub fn new(
        mut store: LedgerStore,
        config: EngineConfig,
        clock: Box<dyn Clock>,
        rng: CodeRng,
    ) -> LedgerResult<Self> {
        config.validate()?;
        store.set_busy_timeout(Duration::from_millis(config.retry.busy_timeout_ms))?;
        Ok(Self {
            generator: CodeGenerator::new(config.code.clone(), rng),
            processor: RewardProcessor::new(&config),
            store,
            config,
            clock,
        })
    }

    /// Open (or create) the database at `path`, apply migrations and
    /// wire the production clock and RNG.
    pub fn open(path: &str, config: EngineConfig) -> LedgerResult<Self> {
        let store = LedgerStore::open(path)?;
        store.migrate()?;
        Self::new(store, config, Box::new(SystemClock), CodeRng::from_entropy())
    }

    /// Migrated in-memory engine with a pinned clock and seeded RNG.
    pub fn build_test(clock: ManualClock, seed: u64) -> LedgerResult<Self> {
        let store = LedgerStore::in_memory()?;
        store.migrate()?;
        Self::new(store, EngineConfig::default_test(), Box::new(clock), CodeRng::from_seed(seed))
    }

    /// A sibling engine on a new connection to the same database, for
    /// another worker thread. In-memory stores cannot be shared this way.
    pub fn fork(&mut self) -> LedgerResult<Self> {
        let config = self.config.clone();
        self.fork_with_config(config)
    }

    /// Like `fork`, with a different policy (e.g. a new reward amount).
    pub fn fork_with_config(&mut self, config: EngineConfig) -> LedgerResult<Self> {
        config.validate()?;
        let mut store = self.store.reopen()?;
        store.set_busy_timeout(Duration::from_millis(config.retry.busy_timeout_ms))?;
        Ok(Self {
            generator: self.generator.fork(),
            processor: RewardProcessor::new(&config),
            store,
            config,
            clock: self.clock.boxed_clone(),
        })
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Give the connection back, e.g. to rebuild with another policy.
    pub fn into_store(self) -> LedgerStore {
        self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Code generator / validator ─────────────────────────────

    /// A candidate code. Not reserved: use `register_account` to
    /// persist one atomically with the account.
    pub fn generate_code(&mut self, display_name: &str, contact: &str) -> String {
        let now = self.clock.now();
        self.generator.generate(display_name, contact, now)
    }

    pub fn validate_code(&self, code: &str) -> LedgerResult<CodeValidation> {
        code_validator::validate_code(&self.store, code, None)
    }

    /// Validate on behalf of a known applicant; its own code is refused.
    pub fn validate_code_for(&self, code: &str, applicant_id: &str) -> LedgerResult<CodeValidation> {
        code_validator::validate_code(&self.store, code, Some(applicant_id))
    }

    pub fn register_account(
        &mut self,
        display_name: &str,
        contact: &str,
        referral_code: Option<&str>,
    ) -> LedgerResult<Registration> {
        let now = self.clock.now();
        let new = NewAccount { display_name, contact, referral_code };
        registration::register_account(&mut self.store, &mut self.generator, &new, now)
    }

    pub fn link_referrer(&mut self, account_id: &str, code: &str) -> LedgerResult<LinkOutcome> {
        let now = self.clock.now();
        code_validator::link_referrer(&mut self.store, account_id, code, now)
    }

    // ── Reward processor ───────────────────────────────────────

    pub fn process_referral_reward(
        &mut self,
        referrer_id: &str,
        referred_account_id: &str,
    ) -> LedgerResult<RewardOutcome> {
        let clock = &self.clock;
        self.processor
            .process(&mut self.store, || clock.now(), referrer_id, referred_account_id)
    }

    /// Identity hook: mark the account verified and, when it was
    /// referred, credit its referrer. Safe to call repeatedly.
    pub fn handle_user_verified(&mut self, account_id: &str) -> LedgerResult<Option<RewardOutcome>> {
        self.store.set_verified(account_id, true)?;
        let account = self.store.require_account(account_id, AccountFilter::Any)?;
        match account.referred_by {
            Some(referrer_id) => self.process_referral_reward(&referrer_id, account_id).map(Some),
            None => Ok(None),
        }
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn get_stats(&self, account_id: &str) -> LedgerResult<ReferralStats> {
        stats::get_stats(&self.store, &self.config, self.clock.now(), account_id)
    }

    pub fn get_history(&self, account_id: &str, request: &HistoryRequest) -> LedgerResult<HistoryPage> {
        history::get_history(&self.store, &self.config, account_id, request)
    }

    pub fn get_leaderboard(&self, page: u32, page_size: u32) -> LedgerResult<LeaderboardPage> {
        leaderboard::get_leaderboard(&self.store, &self.config, page, page_size)
    }

    pub fn account_rank(&self, account_id: &str) -> LedgerResult<Option<AccountRank>> {
        leaderboard::account_rank(&self.store, account_id)
    }

    pub fn get_analytics(&self, account_id: &str, period_days: u32) -> LedgerResult<ReferralAnalytics> {
        stats::get_analytics(&self.store, &self.config, self.clock.now(), account_id, period_days)
    }

    pub fn milestones(&self, referral_count: u64) -> MilestoneProgress {
        milestones::milestones(&self.config.milestones, referral_count)
    }

    pub fn account(&self, account_id: &str) -> LedgerResult<Account> {
        self.store.require_account(account_id, AccountFilter::Live)
    }

    // ── Identity collaborator hooks ────────────────────────────

    pub fn set_verified(&self, account_id: &str, verified: bool) -> LedgerResult<()> {
        self.store.set_verified(account_id, verified)
    }

    pub fn set_active(&self, account_id: &str, active: bool) -> LedgerResult<()> {
        self.store.set_active(account_id, active)
    }

    pub fn soft_delete(&self, account_id: &str) -> LedgerResult<()> {
        self.store.soft_delete(account_id, self.clock.now())
    }
}
