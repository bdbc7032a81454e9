//! Pairing algorithms for the matching pass
//!
//! A strategy only plans: it looks at the queued candidates and decides who
//! plays whom. Applying the plan (notifying players, removing them, recording
//! misses) is the engine's job.

use crate::queue::registry::Candidate;
use crate::types::{PlayerId, Stake};
use std::collections::BTreeMap;

/// Two players paired at a stake. `first` waited longer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub first: PlayerId,
    pub second: PlayerId,
    pub stake: Stake,
}

/// Result of planning one matching pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassPlan {
    pub pairings: Vec<Pairing>,
    /// Candidates left without a partner, in queue order
    pub unmatched: Vec<Candidate>,
}

impl PassPlan {
    /// Number of players this plan pairs up
    pub fn matched_players(&self) -> usize {
        self.pairings.len() * 2
    }
}

/// Trait for pairing algorithms
pub trait PairingStrategy: Send + Sync {
    /// Plan one pass over `candidates`, which arrive in queue order
    /// (enqueue instant, then identity)
    fn plan(&self, candidates: &[Candidate]) -> PassPlan;
}

/// Pairs players whose stakes are exactly equal.
///
/// Candidates are bucketed by decimal value, so `10` and `10.0` share a bucket
/// while `10` and `10.01` never do. Within a bucket the two longest-waiting
/// players are paired first.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactStakeMatcher;

impl ExactStakeMatcher {
    pub fn new() -> Self {
        Self
    }

    fn bucket(candidates: &[Candidate]) -> BTreeMap<Stake, Vec<&Candidate>> {
        let mut buckets: BTreeMap<Stake, Vec<&Candidate>> = BTreeMap::new();
        for candidate in candidates {
            buckets
                .entry(candidate.stake.normalize())
                .or_default()
                .push(candidate);
        }

        for bucket in buckets.values_mut() {
            bucket.sort_by(|a, b| {
                a.enqueued_at
                    .cmp(&b.enqueued_at)
                    .then_with(|| a.player_id.cmp(&b.player_id))
            });
        }
        buckets
    }
}

impl PairingStrategy for ExactStakeMatcher {
    fn plan(&self, candidates: &[Candidate]) -> PassPlan {
        let mut plan = PassPlan::default();

        for (stake, bucket) in Self::bucket(candidates) {
            let mut waiting = bucket.into_iter();
            loop {
                match (waiting.next(), waiting.next()) {
                    (Some(first), Some(second)) => plan.pairings.push(Pairing {
                        first: first.player_id.clone(),
                        second: second.player_id.clone(),
                        stake,
                    }),
                    (Some(leftover), None) => plan.unmatched.push(leftover.clone()),
                    _ => break,
                }
            }
        }

        plan.unmatched.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::time::{Duration, Instant};

    fn candidate(id: &str, stake: Decimal, waited_secs: u64, base: Instant) -> Candidate {
        Candidate {
            player_id: id.to_string(),
            stake,
            enqueued_at: base + Duration::from_secs(waited_secs),
        }
    }

    #[test]
    fn test_equal_stakes_are_paired() {
        let base = Instant::now();
        let plan = ExactStakeMatcher::new().plan(&[
            candidate("p1", Decimal::from(10), 0, base),
            candidate("p2", Decimal::from(10), 1, base),
        ]);

        assert_eq!(
            plan.pairings,
            vec![Pairing {
                first: "p1".to_string(),
                second: "p2".to_string(),
                stake: Decimal::from(10),
            }]
        );
        assert!(plan.unmatched.is_empty());
    }

    #[test]
    fn test_different_stakes_never_pair() {
        let base = Instant::now();
        let plan = ExactStakeMatcher::new().plan(&[
            candidate("p1", Decimal::from(10), 0, base),
            candidate("p2", Decimal::new(1001, 2), 1, base),
        ]);

        assert!(plan.pairings.is_empty());
        assert_eq!(plan.unmatched.len(), 2);
    }

    #[test]
    fn test_scale_does_not_split_buckets() {
        let base = Instant::now();
        let plan = ExactStakeMatcher::new().plan(&[
            candidate("p1", Decimal::new(10, 0), 0, base),
            candidate("p2", Decimal::new(1000, 2), 1, base),
        ]);

        assert_eq!(plan.pairings.len(), 1);
    }

    #[test]
    fn test_longest_waiting_pair_first() {
        let base = Instant::now();
        let plan = ExactStakeMatcher::new().plan(&[
            candidate("late", Decimal::from(5), 9, base),
            candidate("b", Decimal::from(5), 1, base),
            candidate("a", Decimal::from(5), 1, base),
        ]);

        assert_eq!(plan.pairings.len(), 1);
        assert_eq!(plan.pairings[0].first, "a");
        assert_eq!(plan.pairings[0].second, "b");
        assert_eq!(plan.unmatched.len(), 1);
        assert_eq!(plan.unmatched[0].player_id, "late");
    }

    #[test]
    fn test_empty_queue_plans_nothing() {
        let plan = ExactStakeMatcher::new().plan(&[]);
        assert_eq!(plan, PassPlan::default());
        assert_eq!(plan.matched_players(), 0);
    }

    proptest! {
        #[test]
        fn prop_plan_partitions_candidates(stakes in prop::collection::vec(1i64..5, 0..40)) {
            let base = Instant::now();
            let candidates: Vec<_> = stakes
                .iter()
                .enumerate()
                .map(|(i, stake)| {
                    candidate(&format!("p{}", i), Decimal::from(*stake), i as u64, base)
                })
                .collect();

            let plan = ExactStakeMatcher::new().plan(&candidates);

            let mut seen = HashSet::new();
            for pairing in &plan.pairings {
                prop_assert!(seen.insert(pairing.first.clone()));
                prop_assert!(seen.insert(pairing.second.clone()));
                let first = candidates.iter().find(|c| c.player_id == pairing.first).unwrap();
                let second = candidates.iter().find(|c| c.player_id == pairing.second).unwrap();
                prop_assert_eq!(first.stake, second.stake);
            }
            for leftover in &plan.unmatched {
                prop_assert!(seen.insert(leftover.player_id.clone()));
            }
            prop_assert_eq!(seen.len(), candidates.len());

            let leftover_stakes: HashSet<_> = plan.unmatched.iter().map(|c| c.stake).collect();
            prop_assert_eq!(leftover_stakes.len(), plan.unmatched.len());
        }
    }
}
