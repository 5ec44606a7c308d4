//! Referral reward ledger and leaderboard engine.
//!
//! Component order, leaves first:
//!   code_generator → code_validator → store (ledger) → reward_processor
//!   → stats / history → leaderboard → milestones
//!
//! `engine::ReferralEngine` is the public entry point.

pub mod account;
pub mod clock;
pub mod code_generator;
pub mod code_validator;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod history;
pub mod leaderboard;
pub mod milestones;
pub mod pagination;
pub mod registration;
pub mod reward_processor;
pub mod rng;
pub mod stats;
pub mod store;
pub mod types;

pub use engine::ReferralEngine;
pub use error::{LedgerError, LedgerResult};
