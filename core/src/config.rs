use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Coins credited to the referrer per verified referral.
    pub coins_per_referral: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self { coins_per_referral: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for one reward transaction, including the first.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// SQLite busy handler timeout per statement.
    pub busy_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 500,
            busy_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeConfig {
    /// Attempts with the name-derived shape before the fallback shape.
    pub max_attempts: u32,
    pub prefix_len: usize,
    pub random_len: usize,
    pub suffix_len: usize,
    pub fallback_marker: String,
    pub fallback_random_len: usize,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            prefix_len: 3,
            random_len: 4,
            suffix_len: 3,
            fallback_marker: "REF".into(),
            fallback_random_len: 9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self { default_page_size: 10, max_page_size: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Window for `recent_referrals`.
    pub recent_window_days: u32,
    /// Number of entries embedded in the stats summary.
    pub history_preview_len: u32,
    pub default_history_page_size: u32,
    pub max_history_page_size: u32,
    pub default_period_days: u32,
    pub max_period_days: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            recent_window_days: 30,
            history_preview_len: 10,
            default_history_page_size: 10,
            max_history_page_size: 100,
            default_period_days: 30,
            max_period_days: 365,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MilestoneConfig {
    /// Strictly ascending referral-count thresholds.
    pub thresholds: Vec<u64>,
    /// Advisory bonus per threshold unit. Display only.
    pub bonus_per_target: u64,
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![1, 5, 10, 25, 50, 100, 250, 500, 1000],
            bonus_per_target: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub reward: RewardConfig,
    pub retry: RetryConfig,
    pub code: CodeConfig,
    pub leaderboard: LeaderboardConfig,
    pub stats: StatsConfig,
    pub milestones: MilestoneConfig,
}

impl EngineConfig {
    /// Load from `{data_dir}/engine.json`. Missing sections fall back
    /// to defaults. In tests, use EngineConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/engine.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::debug!("Loaded engine config from {path}");
        Ok(config)
    }

    /// In-code configuration for tests. Backoff is kept short so
    /// contention tests stay fast.
    pub fn default_test() -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: 8,
                base_backoff_ms: 1,
                max_backoff_ms: 50,
                busy_timeout_ms: 5_000,
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.reward.coins_per_referral == 0 {
            return Err(LedgerError::Config("reward.coins_per_referral must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(LedgerError::Config("retry.max_attempts must be > 0".into()));
        }
        let code_len = self.code.prefix_len + self.code.random_len + self.code.suffix_len;
        let fallback_len = self.code.fallback_marker.len() + self.code.fallback_random_len;
        if !(6..=20).contains(&code_len) || !(6..=20).contains(&fallback_len) {
            return Err(LedgerError::Config("referral code shapes must be 6..=20 chars".into()));
        }
        if !self.code.fallback_marker.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            return Err(LedgerError::Config("code.fallback_marker must be [A-Z0-9]".into()));
        }
        if self.leaderboard.max_page_size == 0 || self.stats.max_history_page_size == 0 {
            return Err(LedgerError::Config("page size caps must be >= 1".into()));
        }
        if self.stats.max_period_days == 0 {
            return Err(LedgerError::Config("stats.max_period_days must be >= 1".into()));
        }
        let ascending = self.milestones.thresholds.windows(2).all(|w| w[0] < w[1]);
        if self.milestones.thresholds.is_empty() || !ascending || self.milestones.thresholds[0] == 0 {
            return Err(LedgerError::Config(
                "milestones.thresholds must be non-empty, positive and strictly ascending".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
        EngineConfig::default_test().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{ "reward": { "coins_per_referral": 25 } }"#).unwrap();
        assert_eq!(cfg.reward.coins_per_referral, 25);
        assert_eq!(cfg.leaderboard.max_page_size, 50);
        assert_eq!(cfg.milestones.thresholds.last(), Some(&1000));
    }

    #[test]
    fn shipped_config_loads() {
        let cfg = EngineConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/../data")).unwrap();
        assert_eq!(cfg.reward.coins_per_referral, 10);
        assert_eq!(cfg.code.fallback_marker, "REF");
        assert!(EngineConfig::load("/nonexistent").is_err());
    }

    #[test]
    fn rejects_unsorted_thresholds() {
        let mut cfg = EngineConfig::default();
        cfg.milestones.thresholds = vec![1, 10, 5];
        assert!(cfg.validate().is_err());
    }
}
