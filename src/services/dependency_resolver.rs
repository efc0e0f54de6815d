use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use crate::domain::models::{
    DeadlockConfig, HistoryBuffer, IssueKind, IssueState, PhaseProgressSample, Verdict,
};

/// Directed "depends-on" graph over task identifiers.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

static NO_DEPENDENCIES: BTreeSet<String> = BTreeSet::new();

/// Depth-first walk from `start` with an explicit frame stack, so chain
/// length is bounded by heap rather than thread stack.
fn collect_cycles_from<'a>(
    start: &'a str,
    graph: &'a BTreeMap<String, BTreeSet<String>>,
    visited: &mut HashSet<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    let neighbors_of = |node: &str| graph.get(node).unwrap_or(&NO_DEPENDENCIES).iter();

    let mut rec_stack: HashSet<&'a str> = HashSet::new();
    let mut path: Vec<&'a str> = vec![start];
    let mut frames = vec![neighbors_of(start)];
    visited.insert(start);
    rec_stack.insert(start);

    while let Some(frame) = frames.last_mut() {
        let Some(neighbor) = frame.next() else {
            frames.pop();
            if let Some(node) = path.pop() {
                rec_stack.remove(node);
            }
            continue;
        };
        let neighbor = neighbor.as_str();
        if !visited.contains(neighbor) {
            visited.insert(neighbor);
            rec_stack.insert(neighbor);
            path.push(neighbor);
            frames.push(neighbors_of(neighbor));
        } else if rec_stack.contains(neighbor) {
            // Back edge: the path slice from `neighbor` to the top closes a cycle
            if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                cycles.push(path[cycle_start..].iter().map(|id| (*id).to_string()).collect());
            }
        }
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the edge `task -> depends_on`; returns false if it already existed.
    pub fn declare_dependency(&mut self, task: &str, depends_on: &str) -> bool {
        self.edges.entry(depends_on.to_string()).or_default();
        self.edges
            .entry(task.to_string())
            .or_default()
            .insert(depends_on.to_string())
    }

    /// Remove the edge `task -> depends_on`; returns false if it was absent.
    pub fn remove_dependency(&mut self, task: &str, depends_on: &str) -> bool {
        self.edges
            .get_mut(task)
            .is_some_and(|deps| deps.remove(depends_on))
    }

    pub fn dependencies_of(&self, task: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(task)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// One representative cycle per back edge found by a depth-first walk
    /// from every unvisited node.
    ///
    /// This is not an enumeration of every simple cycle: overlapping cycles
    /// that share a back edge are reported once.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut visited = HashSet::new();
        let mut cycles = Vec::new();

        for task in self.edges.keys() {
            if !visited.contains(task.as_str()) {
                collect_cycles_from(task, &self.edges, &mut visited, &mut cycles);
            }
        }

        cycles
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }
}

/// Why and since when a task has been waiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedEntry {
    pub since: DateTime<Utc>,
    pub reason: String,
}

/// Tasks currently waiting on something.
#[derive(Debug, Clone, Default)]
pub struct BlockedRegistry {
    entries: HashMap<String, BlockedEntry>,
}

impl BlockedRegistry {
    /// Returns false when the task was already blocked; the original start of
    /// the wait is kept and only the reason is updated.
    pub fn mark_blocked(&mut self, task: &str, reason: &str, at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(task) {
            Some(entry) => {
                entry.reason = reason.to_string();
                false
            }
            None => {
                self.entries.insert(
                    task.to_string(),
                    BlockedEntry {
                        since: at,
                        reason: reason.to_string(),
                    },
                );
                true
            }
        }
    }

    /// Returns how long the task waited, or `None` if it was not blocked.
    pub fn mark_unblocked(&mut self, task: &str, at: DateTime<Utc>) -> Option<Duration> {
        self.entries.remove(task).map(|entry| at - entry.since)
    }

    pub fn get(&self, task: &str) -> Option<&BlockedEntry> {
        self.entries.get(task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Supporting statistics for the deadlock issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadlockStats {
    /// Each cycle rendered as `a -> b -> c`.
    pub cycles: Vec<String>,
    pub blocked_tasks: usize,
    pub avg_wait_minutes: f64,
    pub max_wait_minutes: f64,
    /// Blocked tasks whose individual wait exceeds the stall threshold.
    pub stalled_tasks: Vec<String>,
    /// Tasks completed per minute across the phase-progress history.
    pub progress_rate: f64,
}

/// Wait-time summary over currently blocked tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StallReport {
    pub avg_wait_minutes: f64,
    pub max_wait_minutes: f64,
    pub stalled_tasks: Vec<String>,
}

/// Structural detector for one PRD execution: the dependency graph plus the
/// blocked-task registry.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    graph: DependencyGraph,
    blocked: BlockedRegistry,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_dependency(&mut self, task: &str, depends_on: &str) -> bool {
        self.graph.declare_dependency(task, depends_on)
    }

    pub fn remove_dependency(&mut self, task: &str, depends_on: &str) -> bool {
        self.graph.remove_dependency(task, depends_on)
    }

    pub fn mark_blocked(&mut self, task: &str, reason: &str, at: DateTime<Utc>) -> bool {
        self.blocked.mark_blocked(task, reason, at)
    }

    pub fn mark_unblocked(&mut self, task: &str, at: DateTime<Utc>) -> Option<Duration> {
        self.blocked.mark_unblocked(task, at)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn blocked(&self) -> &BlockedRegistry {
        &self.blocked
    }

    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        self.graph.find_cycles()
    }

    /// Wait times of the currently blocked tasks as of `now`.
    pub fn check_stall(&self, now: DateTime<Utc>, stall_threshold_minutes: f64) -> StallReport {
        let waits: Vec<(&String, f64)> = self
            .blocked
            .entries
            .iter()
            .map(|(task, entry)| (task, minutes(now - entry.since)))
            .collect();
        if waits.is_empty() {
            return StallReport::default();
        }

        let mut stalled_tasks: Vec<String> = waits
            .iter()
            .filter(|(_, wait)| *wait > stall_threshold_minutes)
            .map(|(task, _)| (*task).clone())
            .collect();
        stalled_tasks.sort();

        StallReport {
            avg_wait_minutes: waits.iter().map(|(_, wait)| wait).sum::<f64>() / waits.len() as f64,
            max_wait_minutes: waits.iter().map(|(_, wait)| *wait).fold(0.0, f64::max),
            stalled_tasks,
        }
    }

    /// Evaluate cycles and stalls. Unlike the trend detectors there is no
    /// minimum-sample gate: one cycle is enough.
    pub fn check(
        &self,
        state: &IssueState<DeadlockStats>,
        config: &DeadlockConfig,
        now: DateTime<Utc>,
        phase_progress: &HistoryBuffer<PhaseProgressSample>,
    ) -> (IssueState<DeadlockStats>, bool) {
        let mut next = state.clone();
        next.alert_threshold = config.stall_threshold_minutes;
        next.sample_count = self.graph.edge_count() + self.blocked.len();
        if !config.enabled {
            return (next, false);
        }

        let cycles: Vec<String> = self
            .find_cycles()
            .into_iter()
            .map(|cycle| cycle.join(" -> "))
            .collect();
        let stall = self.check_stall(now, config.stall_threshold_minutes);
        let stats = DeadlockStats {
            cycles,
            blocked_tasks: self.blocked.len(),
            avg_wait_minutes: stall.avg_wait_minutes,
            max_wait_minutes: stall.max_wait_minutes,
            stalled_tasks: stall.stalled_tasks,
            progress_rate: progress_rate(phase_progress),
        };

        let verdict = if let Some(cycle) = stats.cycles.first() {
            Verdict {
                detected: true,
                reason: format!("dependency cycle {cycle}"),
                value: stats.cycles.len() as f64,
                stats,
            }
        } else if !stats.stalled_tasks.is_empty() {
            Verdict {
                detected: true,
                reason: format!(
                    "{} task(s) blocked longer than {:.0} minutes",
                    stats.stalled_tasks.len(),
                    config.stall_threshold_minutes
                ),
                value: stats.max_wait_minutes,
                stats,
            }
        } else {
            Verdict::clear(stats)
        };

        if verdict.detected && !state.detected {
            warn!(reason = %verdict.reason, "dependency deadlock detected");
        } else {
            debug!(
                detector = %IssueKind::DependencyDeadlock,
                blocked = verdict.stats.blocked_tasks,
                "deadlock check"
            );
        }
        let fired = next.apply(verdict, now);
        (next, fired)
    }

    pub fn clear(&mut self) {
        self.graph.clear();
        self.blocked.clear();
    }
}

fn minutes(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 60_000.0
}

/// Completed-task delta per phase between its earliest and latest sample,
/// summed, over the time spanned by the whole buffer.
fn progress_rate(history: &HistoryBuffer<PhaseProgressSample>) -> f64 {
    let (Some(first), Some(last)) = (history.iter().next(), history.iter().next_back()) else {
        return 0.0;
    };
    let span = minutes(last.at - first.at);
    if span <= 0.0 {
        return 0.0;
    }

    let mut bounds: HashMap<&str, (u32, u32)> = HashMap::new();
    for sample in history.values() {
        bounds
            .entry(sample.phase_id.as_str())
            .and_modify(|(_, latest)| *latest = sample.completed_tasks)
            .or_insert((sample.completed_tasks, sample.completed_tasks));
    }
    let completed: u32 = bounds
        .values()
        .map(|(earliest, latest)| latest.saturating_sub(*earliest))
        .sum();
    f64::from(completed) / span
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with(edges: &[(&str, &str)]) -> DependencyResolver {
        let mut resolver = DependencyResolver::new();
        for (task, dep) in edges {
            resolver.declare_dependency(task, dep);
        }
        resolver
    }

    #[test]
    fn test_find_cycles_no_cycle() {
        let resolver = resolver_with(&[("b", "a"), ("c", "b"), ("c", "a")]);
        assert!(resolver.find_cycles().is_empty());
    }

    #[test]
    fn test_find_cycles_three_node_cycle() {
        let resolver = resolver_with(&[("A", "B"), ("B", "C"), ("C", "A")]);
        let cycles = resolver.find_cycles();
        assert_eq!(cycles.len(), 1);
        let members: BTreeSet<&str> = cycles[0].iter().map(String::as_str).collect();
        assert_eq!(members, BTreeSet::from(["A", "B", "C"]));
    }

    #[test]
    fn test_find_cycles_disjoint_regions() {
        let resolver = resolver_with(&[("a", "b"), ("b", "a"), ("x", "y"), ("y", "z"), ("z", "x")]);
        assert_eq!(resolver.find_cycles().len(), 2);
    }

    #[test]
    fn test_find_cycles_on_very_long_chain() {
        let mut graph = DependencyGraph::new();
        let len = 200_000;
        for i in 0..len - 1 {
            graph.declare_dependency(&format!("t{i}"), &format!("t{}", i + 1));
        }
        assert!(graph.find_cycles().is_empty());

        graph.declare_dependency(&format!("t{}", len - 1), "t0");
        let cycles = graph.find_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), len);
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let resolver = resolver_with(&[("a", "a")]);
        assert_eq!(resolver.find_cycles(), vec![vec!["a".to_string()]]);
    }

    #[test]
    fn test_remove_dependency_breaks_cycle() {
        let mut resolver = resolver_with(&[("A", "B"), ("B", "C"), ("C", "A")]);
        assert!(resolver.remove_dependency("B", "C"));
        assert!(!resolver.remove_dependency("B", "C"));
        assert!(resolver.find_cycles().is_empty());
        assert_eq!(resolver.graph().edge_count(), 2);
    }

    #[test]
    fn test_blocked_registry_keeps_first_wait() {
        let now = Utc::now();
        let mut resolver = DependencyResolver::new();
        assert!(resolver.mark_blocked("t1", "waiting on t0", now - Duration::minutes(10)));
        assert!(!resolver.mark_blocked("t1", "still waiting", now));
        assert_eq!(resolver.blocked().get("t1").unwrap().reason, "still waiting");

        let waited = resolver.mark_unblocked("t1", now).unwrap();
        assert_eq!(waited.num_minutes(), 10);
        assert!(resolver.mark_unblocked("t1", now).is_none());
    }

    #[test]
    fn test_check_stall() {
        let now = Utc::now();
        let mut resolver = DependencyResolver::new();
        resolver.mark_blocked("slow", "r", now - Duration::minutes(45));
        resolver.mark_blocked("fast", "r", now - Duration::minutes(5));

        let report = resolver.check_stall(now, 30.0);
        assert_eq!(report.stalled_tasks, vec!["slow".to_string()]);
        assert!((report.avg_wait_minutes - 25.0).abs() < 1e-6);
        assert!((report.max_wait_minutes - 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_check_detects_cycle_and_fires_once() {
        let now = Utc::now();
        let resolver = resolver_with(&[("A", "B"), ("B", "A")]);
        let config = DeadlockConfig::default();
        let progress = HistoryBuffer::new(10);

        let state = IssueState::new(config.stall_threshold_minutes, 50);
        let (state, fired) = resolver.check(&state, &config, now, &progress);
        assert!(fired);
        assert!(state.detected);
        assert_eq!(state.stats.cycles.len(), 1);

        let (state, fired) = resolver.check(&state, &config, now, &progress);
        assert!(!fired);
        assert!(state.detected);
    }

    #[test]
    fn test_check_short_waits_are_clear() {
        let now = Utc::now();
        let mut resolver = DependencyResolver::new();
        resolver.mark_blocked("a", "r", now - Duration::minutes(20));
        let config = DeadlockConfig {
            stall_threshold_minutes: 30.0,
            ..DeadlockConfig::default()
        };
        let (state, fired) = resolver.check(
            &IssueState::new(30.0, 50),
            &config,
            now,
            &HistoryBuffer::new(10),
        );
        assert!(!fired);
        assert_eq!(state.stats.blocked_tasks, 1);
    }

    #[test]
    fn test_progress_rate() {
        let now = Utc::now();
        let mut history = HistoryBuffer::new(10);
        let sample = |phase: &str, completed| PhaseProgressSample {
            phase_id: phase.to_string(),
            completed_tasks: completed,
            total_tasks: 10,
        };
        history.push(sample("p1", 0), now - Duration::minutes(10));
        history.push(sample("p2", 2), now - Duration::minutes(5));
        history.push(sample("p1", 6), now);
        history.push(sample("p2", 6), now);

        // (6 + 4) tasks over 10 minutes.
        assert!((progress_rate(&history) - 1.0).abs() < 1e-9);
        assert_eq!(progress_rate(&HistoryBuffer::new(10)), 0.0);
    }

    #[test]
    fn test_clear() {
        let now = Utc::now();
        let mut resolver = resolver_with(&[("A", "B"), ("B", "A")]);
        resolver.mark_blocked("A", "r", now);
        resolver.clear();
        assert!(resolver.find_cycles().is_empty());
        assert!(resolver.blocked().is_empty());
    }
}
