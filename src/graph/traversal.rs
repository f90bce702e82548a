//! Kick traversal: a bounded uniform random walk over the communication
//! graph, modeling repeated message relay.
//!
//! No cycle detection — revisiting an agent is valid and expected. Each hop
//! re-reads the current agent's out-edges, so edges added mid-walk are
//! observed. The random source is injected so tests can seed it.

use super::CommGraphStore;
use crate::error::SimlabError;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One hop of a completed walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hop {
    pub from: String,
    pub to: String,
}

/// Outcome of one kick invocation.
#[derive(Debug, Clone, Serialize)]
pub struct TraversalReport {
    pub start: String,
    pub hops: Vec<Hop>,
    /// True when the walk hit an agent with no out-edges before the step
    /// budget ran out.
    pub dead_end: bool,
}

impl TraversalReport {
    /// Agent the walk stopped at.
    pub fn terminal(&self) -> &str {
        self.hops.last().map(|h| h.to.as_str()).unwrap_or(&self.start)
    }
}

/// Randomized walk driver over a [`CommGraphStore`].
pub struct TraversalSimulator {
    graph: Arc<CommGraphStore>,
}

impl TraversalSimulator {
    pub fn new(graph: Arc<CommGraphStore>) -> Self {
        Self { graph }
    }

    /// Walk up to `max_steps` hops from `start`, choosing uniformly among
    /// the current agent's out-edges at every step.
    ///
    /// Terminates when the step budget is exhausted or a dead end is
    /// reached; `max_steps == 0` performs no hops at all.
    pub fn kick<R: Rng>(
        &self,
        tenant: &str,
        start: &str,
        max_steps: u32,
        rng: &mut R,
    ) -> Result<TraversalReport, SimlabError> {
        let mut current = start.to_string();
        let mut hops = Vec::new();
        let mut dead_end = false;

        for _ in 0..max_steps {
            let out_edges = self.graph.out_edges(tenant, &current)?;
            if out_edges.is_empty() {
                dead_end = true;
                break;
            }
            let target = out_edges[rng.gen_range(0..out_edges.len())].clone();
            debug!(tenant, from = %current, to = %target, "kick hop");
            hops.push(Hop {
                from: current,
                to: target.clone(),
            });
            current = target;
        }

        Ok(TraversalReport {
            start: start.to_string(),
            hops,
            dead_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::time::Duration;
    use tempfile::TempDir;

    fn simulator() -> (TraversalSimulator, Arc<CommGraphStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let graph = Arc::new(CommGraphStore::new(dir.path(), Duration::from_secs(5)));
        (TraversalSimulator::new(graph.clone()), graph, dir)
    }

    #[test]
    fn test_zero_step_budget_performs_no_hops() {
        let (sim, graph, _dir) = simulator();
        graph.add_edge("u1", "a", "b").unwrap();

        let report = sim.kick("u1", "a", 0, &mut StdRng::seed_from_u64(7)).unwrap();
        assert!(report.hops.is_empty());
        assert!(!report.dead_end);
        assert_eq!(report.terminal(), "a");
    }

    #[test]
    fn test_dead_end_terminates_regardless_of_budget() {
        let (sim, _graph, _dir) = simulator();
        let report = sim
            .kick("u1", "isolated", 100, &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert!(report.hops.is_empty());
        assert!(report.dead_end);
    }

    #[test]
    fn test_walk_consumes_full_budget_in_a_cycle() {
        let (sim, graph, _dir) = simulator();
        graph.add_edge("u1", "a", "b").unwrap();
        graph.add_edge("u1", "b", "a").unwrap();

        let report = sim.kick("u1", "a", 9, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(report.hops.len(), 9);
        assert!(!report.dead_end);
        // a→b→a→… nine hops from "a" ends on "b".
        assert_eq!(report.terminal(), "b");
    }

    #[test]
    fn test_single_hop_reaches_both_targets_over_trials() {
        let (sim, graph, _dir) = simulator();
        graph.add_edge("u1", "a", "b").unwrap();
        graph.add_edge("u1", "a", "c").unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let mut reached = HashSet::new();
        for _ in 0..64 {
            let report = sim.kick("u1", "a", 1, &mut rng).unwrap();
            reached.insert(report.terminal().to_string());
        }
        assert!(reached.contains("b"));
        assert!(reached.contains("c"));
    }

    #[test]
    fn test_seeded_walks_are_reproducible() {
        let (sim, graph, _dir) = simulator();
        graph.add_edge("u1", "a", "b").unwrap();
        graph.add_edge("u1", "a", "c").unwrap();
        graph.add_edge("u1", "b", "a").unwrap();
        graph.add_edge("u1", "c", "a").unwrap();

        let first = sim.kick("u1", "a", 12, &mut StdRng::seed_from_u64(99)).unwrap();
        let second = sim.kick("u1", "a", 12, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(first.hops, second.hops);
    }

    #[test]
    fn test_triangle_walks() {
        let (sim, graph, _dir) = simulator();
        graph.add_edge("u1", "A", "B").unwrap();
        graph.add_edge("u1", "A", "C").unwrap();
        graph.add_edge("u1", "B", "C").unwrap();

        assert_eq!(graph.out_edges("u1", "A").unwrap(), vec!["B", "C"]);

        // C has no out-edges: immediate dead end.
        let report = sim.kick("u1", "C", 5, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!(report.dead_end);
        assert!(report.hops.is_empty());

        // One hop from A lands on B or C.
        let report = sim.kick("u1", "A", 1, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(report.hops.len(), 1);
        assert!(matches!(report.terminal(), "B" | "C"));
    }
}
