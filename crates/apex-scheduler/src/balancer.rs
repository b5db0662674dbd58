//! Gas-balanced partitioning for speculative workers
//!
//! Ignores conflicts entirely: the goal is K groups of roughly equal cost,
//! each executed by one worker in tid order.

use crate::error::{SchedulerError, SchedulerResult};
use apex_primitives::Gas;
use apex_types::TxId;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// One worker's share of a batch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerGroup {
    /// Transactions, ascending by tid
    pub txs: Vec<TxId>,
    /// Sum of their costs
    pub cost: Gas,
}

impl WorkerGroup {
    /// Number of transactions
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Whether the group received nothing
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}

/// Greedy K-way balancer
#[derive(Clone, Copy, Debug)]
pub struct GreedyBalancer {
    workers: usize,
}

impl GreedyBalancer {
    /// Balancer producing `workers` groups
    pub fn new(workers: usize) -> SchedulerResult<Self> {
        if workers == 0 {
            return Err(SchedulerError::InvalidWorkerCount(workers));
        }
        Ok(Self { workers })
    }

    /// Number of groups produced
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Split `txs` into exactly `workers` groups
    ///
    /// Each group is seeded with the largest remaining transaction and then
    /// filled with the largest transaction that still fits under the
    /// average. Leftovers go to whichever group is lightest at the time.
    /// While filling, one transaction per later group is held back, so no
    /// group is empty when there are at least as many transactions as
    /// groups.
    pub fn partition(&self, txs: &[(TxId, Gas)]) -> Vec<WorkerGroup> {
        let k = self.workers;
        let mut pool: BTreeSet<(Gas, TxId)> = txs.iter().map(|&(tid, cost)| (cost, tid)).collect();
        let total: Gas = txs.iter().fold(0, |acc, (_, c)| acc.saturating_add(*c));
        let target = total / k as Gas;

        let mut groups = vec![WorkerGroup::default(); k];

        for (i, group) in groups.iter_mut().enumerate() {
            let Some(seed) = pool.pop_last() else {
                break;
            };
            group.txs.push(seed.1);
            group.cost = seed.0;

            let reserved = k - i - 1;
            while pool.len() > reserved {
                let room = target.saturating_sub(group.cost);
                let Some(&fit) = pool.range(..=(room, TxId(u32::MAX))).next_back() else {
                    break;
                };
                pool.remove(&fit);
                group.txs.push(fit.1);
                group.cost += fit.0;
            }
        }

        let mut lightest: BinaryHeap<Reverse<(Gas, usize)>> = groups
            .iter()
            .enumerate()
            .map(|(i, g)| Reverse((g.cost, i)))
            .collect();
        while let Some((cost, tid)) = pool.pop_last() {
            let Some(Reverse((_, i))) = lightest.pop() else {
                break;
            };
            groups[i].txs.push(tid);
            groups[i].cost += cost;
            lightest.push(Reverse((groups[i].cost, i)));
        }

        for group in &mut groups {
            group.txs.sort_unstable();
        }

        tracing::debug!(
            workers = k,
            transactions = txs.len(),
            target,
            heaviest = groups.iter().map(|g| g.cost).max().unwrap_or(0),
            "batch balanced"
        );
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(costs: &[Gas]) -> Vec<(TxId, Gas)> {
        costs
            .iter()
            .enumerate()
            .map(|(i, c)| (TxId::from(i), *c))
            .collect()
    }

    fn total(groups: &[WorkerGroup]) -> Gas {
        groups.iter().map(|g| g.cost).sum()
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            GreedyBalancer::new(0),
            Err(SchedulerError::InvalidWorkerCount(0))
        ));
    }

    #[test]
    fn test_even_split() {
        let txs = batch(&[10, 10, 10, 10]);
        let groups = GreedyBalancer::new(2).unwrap().partition(&txs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].cost, 20);
        assert_eq!(groups[1].cost, 20);
    }

    #[test]
    fn test_groups_sorted_by_tid() {
        let txs = batch(&[5, 40, 3, 22, 17, 8, 30]);
        let groups = GreedyBalancer::new(3).unwrap().partition(&txs);
        for g in &groups {
            assert!(g.txs.windows(2).all(|w| w[0] < w[1]));
        }
        assert_eq!(total(&groups), 125);
    }

    #[test]
    fn test_seed_larger_than_target() {
        // Target is 4; the first seed alone is 10 and must not swallow the rest
        let txs = batch(&[10, 1, 1]);
        let groups = GreedyBalancer::new(3).unwrap().partition(&txs);
        assert!(groups.iter().all(|g| !g.is_empty()));
        assert_eq!(groups[0].txs, vec![TxId(0)]);
    }

    #[test]
    fn test_zero_cost_transactions_reserved() {
        let txs = batch(&[10, 0, 0]);
        let groups = GreedyBalancer::new(3).unwrap().partition(&txs);
        assert!(groups.iter().all(|g| g.len() == 1));
    }

    #[test]
    fn test_more_workers_than_transactions() {
        let txs = batch(&[4, 2]);
        let groups = GreedyBalancer::new(4).unwrap().partition(&txs);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups.iter().filter(|g| g.is_empty()).count(), 2);
        assert_eq!(total(&groups), 6);
    }

    #[test]
    fn test_fill_to_target() {
        // target 15: {12} takes 3, {9} takes 6
        let txs = batch(&[12, 9, 6, 3]);
        let groups = GreedyBalancer::new(2).unwrap().partition(&txs);
        assert_eq!(groups[0].txs, vec![TxId(0), TxId(3)]);
        assert_eq!(groups[1].txs, vec![TxId(1), TxId(2)]);
        assert_eq!(groups[0].cost, 15);
        assert_eq!(groups[1].cost, 15);
    }

    #[test]
    fn test_leftovers_go_to_lightest_group() {
        // target 17: both groups reach 17 exactly, the leftover 1 goes to
        // the lighter group, ties broken by group index
        let txs = batch(&[10, 10, 7, 7, 1]);
        let groups = GreedyBalancer::new(2).unwrap().partition(&txs);
        assert_eq!(groups[0].txs, vec![TxId(1), TxId(3), TxId(4)]);
        assert_eq!(groups[1].txs, vec![TxId(0), TxId(2)]);
        assert_eq!(total(&groups), 35);
    }
}
