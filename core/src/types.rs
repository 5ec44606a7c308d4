//! Shared primitive types used across the engine.

/// A stable, opaque account identifier (UUID v4 in practice).
pub type AccountId = String;

/// Coin amounts. Balances are never negative.
pub type Coins = u64;

/// Milliseconds since the Unix epoch, as persisted in SQLite.
pub type EpochMillis = i64;
