//! Milestone badges as a pure function of the referral count.
//!
//! Rewards shown here are advisory. Nothing credits them to a
//! balance; only the reward processor moves coins.

use serde::Serialize;

use crate::{config::MilestoneConfig, types::Coins};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Milestone {
    pub target: u64,
    pub badge:  String,
    pub reward: Coins,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NextMilestone {
    Pending {
        target:           u64,
        remaining:        u64,
        reward:           Coins,
        progress_percent: f64,
    },
    MaxAchieved,
}

impl NextMilestone {
    pub fn target(&self) -> Option<u64> {
        match self {
            Self::Pending { target, .. } => Some(*target),
            Self::MaxAchieved => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneProgress {
    pub current:  u64,
    pub achieved: Vec<Milestone>,
    pub next:     NextMilestone,
}

fn badge_name(target: u64) -> String {
    match target {
        1    => "First Referral".into(),
        5    => "Connector".into(),
        10   => "Promoter".into(),
        25   => "Influencer".into(),
        50   => "Ambassador".into(),
        100  => "Champion".into(),
        250  => "Legend".into(),
        500  => "Icon".into(),
        1000 => "Hall of Fame".into(),
        n    => format!("{n} Referrals"),
    }
}

fn milestone(config: &MilestoneConfig, target: u64) -> Milestone {
    Milestone {
        target,
        badge: badge_name(target),
        reward: target.saturating_mul(config.bonus_per_target),
    }
}

/// Achieved thresholds (ascending) and the next one to reach.
/// `config.thresholds` must be strictly ascending.
pub fn milestones(config: &MilestoneConfig, referral_count: u64) -> MilestoneProgress {
    let achieved: Vec<Milestone> = config
        .thresholds
        .iter()
        .take_while(|&&t| t <= referral_count)
        .map(|&t| milestone(config, t))
        .collect();

    let next = match config.thresholds.iter().find(|&&t| t > referral_count) {
        Some(&target) => {
            let floor = achieved.last().map(|m| m.target).unwrap_or(0);
            let span = (target - floor) as f64;
            NextMilestone::Pending {
                target,
                remaining: target - referral_count,
                reward: milestone(config, target).reward,
                progress_percent: ((referral_count - floor) as f64 / span * 100.0).clamp(0.0, 100.0),
            }
        }
        None => NextMilestone::MaxAchieved,
    };

    MilestoneProgress { current: referral_count, achieved, next }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MilestoneConfig {
        MilestoneConfig::default()
    }

    #[test]
    fn zero_referrals_points_at_first() {
        let p = milestones(&cfg(), 0);
        assert!(p.achieved.is_empty());
        assert_eq!(
            p.next,
            NextMilestone::Pending { target: 1, remaining: 1, reward: 10, progress_percent: 0.0 }
        );
    }

    #[test]
    fn exact_threshold_counts_as_achieved() {
        let p = milestones(&cfg(), 25);
        let targets: Vec<u64> = p.achieved.iter().map(|m| m.target).collect();
        assert_eq!(targets, vec![1, 5, 10, 25]);
        assert_eq!(p.next.target(), Some(50));
    }

    #[test]
    fn progress_is_measured_from_previous_threshold() {
        let p = milestones(&cfg(), 30);
        match p.next {
            NextMilestone::Pending { target, remaining, progress_percent, .. } => {
                assert_eq!(target, 50);
                assert_eq!(remaining, 20);
                assert!((progress_percent - 20.0).abs() < 1e-9);
            }
            NextMilestone::MaxAchieved => panic!("expected a pending milestone"),
        }
    }

    #[test]
    fn top_threshold_is_max_achieved() {
        let p = milestones(&cfg(), 1000);
        assert_eq!(p.achieved.len(), 9);
        assert_eq!(p.next, NextMilestone::MaxAchieved);
        assert_eq!(milestones(&cfg(), 5000).next, NextMilestone::MaxAchieved);
    }

    #[test]
    fn achieved_is_monotone_and_next_is_ahead() {
        let config = cfg();
        let mut previous: Vec<u64> = Vec::new();
        for count in 0..=1200u64 {
            let p = milestones(&config, count);
            let current: Vec<u64> = p.achieved.iter().map(|m| m.target).collect();
            assert!(
                previous.iter().all(|t| current.contains(t)),
                "achieved shrank at count {count}"
            );
            assert!(current.windows(2).all(|w| w[0] < w[1]));
            if let Some(target) = p.next.target() {
                assert!(target > count, "next {target} not ahead of {count}");
            }
            previous = current;
        }
    }
}
