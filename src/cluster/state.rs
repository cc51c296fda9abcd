//! Worker bookkeeping owned by the supervisor event loop.
//!
//! Pure state: no I/O, no tasks. Every mutation happens on the supervisor's
//! single event-handling path, so nothing here is synchronized.

use std::collections::BTreeMap;

use serde::Serialize;

/// One launched worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerRecord {
    pub pid: u32,
    /// Launch index (offset port mode binds `port + index`).
    pub index: usize,
    /// `notifyRequest` messages received. Best-effort, never decreases.
    pub request_count: u64,
    pub alive: bool,
    pub exit_reason: Option<String>,
}

/// Aggregate request counts at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterSnapshot {
    /// pid → request count, including workers that died since the last snapshot.
    pub counts: BTreeMap<u32, u64>,
    /// Workers still running.
    pub alive: usize,
}

impl ClusterSnapshot {
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

#[derive(Debug, Default)]
pub struct ClusterState {
    records: BTreeMap<u32, WorkerRecord>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record for a freshly launched worker.
    ///
    /// Returns `false` if a live worker with this pid is already known.
    pub fn register(&mut self, pid: u32, index: usize) -> bool {
        if self.records.get(&pid).is_some_and(|r| r.alive) {
            return false;
        }
        self.records.insert(
            pid,
            WorkerRecord {
                pid,
                index,
                request_count: 0,
                alive: true,
                exit_reason: None,
            },
        );
        true
    }

    /// Count one completed request. Unknown pids are left alone.
    pub fn record_request(&mut self, pid: u32) -> bool {
        match self.records.get_mut(&pid) {
            Some(record) => {
                record.request_count += 1;
                true
            }
            None => false,
        }
    }

    /// Mark a worker dead. Returns `false` for unknown or already-dead pids.
    pub fn mark_exited(&mut self, pid: u32, reason: impl Into<String>) -> bool {
        match self.records.get_mut(&pid) {
            Some(record) if record.alive => {
                record.alive = false;
                record.exit_reason = Some(reason.into());
                true
            }
            _ => false,
        }
    }

    /// Remove dead records, returning them.
    pub fn reap_dead(&mut self) -> Vec<WorkerRecord> {
        let dead: Vec<u32> = self
            .records
            .values()
            .filter(|r| !r.alive)
            .map(|r| r.pid)
            .collect();
        dead.iter().filter_map(|pid| self.records.remove(pid)).collect()
    }

    pub fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            counts: self
                .records
                .values()
                .map(|r| (r.pid, r.request_count))
                .collect(),
            alive: self.alive_count(),
        }
    }

    pub fn alive_count(&self) -> usize {
        self.records.values().filter(|r| r.alive).count()
    }

    pub fn alive_pids(&self) -> Vec<u32> {
        self.records
            .values()
            .filter(|r| r.alive)
            .map(|r| r.pid)
            .collect()
    }

    pub fn get(&self, pid: u32) -> Option<&WorkerRecord> {
        self.records.get(&pid)
    }

    pub fn records(&self) -> impl Iterator<Item = &WorkerRecord> {
        self.records.values()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_workers() -> ClusterState {
        let mut state = ClusterState::new();
        for (index, pid) in [101, 102, 103].into_iter().enumerate() {
            assert!(state.register(pid, index));
        }
        state
    }

    #[test]
    fn counts_requests_per_worker() {
        let mut state = three_workers();
        for pid in [101, 102, 103] {
            for _ in 0..5 {
                assert!(state.record_request(pid));
            }
        }

        let snapshot = state.snapshot();
        assert_eq!(snapshot.counts, BTreeMap::from([(101, 5), (102, 5), (103, 5)]));
        assert_eq!(snapshot.alive, 3);
        assert_eq!(snapshot.total(), 15);
    }

    #[test]
    fn unknown_pid_changes_nothing() {
        let mut state = three_workers();
        state.record_request(101);
        let before = state.snapshot();

        assert!(!state.record_request(999));
        assert_eq!(state.snapshot(), before);
        assert!(state.get(999).is_none());
    }

    #[test]
    fn exit_marks_dead_and_reap_removes() {
        let mut state = three_workers();
        state.record_request(102);

        assert!(state.mark_exited(102, "exit status: 1"));
        assert!(!state.mark_exited(102, "again"));
        assert_eq!(state.alive_count(), 2);

        // Dead workers stay visible until reaped.
        assert_eq!(state.snapshot().counts.get(&102), Some(&1));

        let reaped = state.reap_dead();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].exit_reason.as_deref(), Some("exit status: 1"));
        assert!(state.get(102).is_none());
        assert_eq!(state.alive_pids(), vec![101, 103]);
    }

    #[test]
    fn duplicate_live_pid_is_rejected() {
        let mut state = three_workers();
        assert!(!state.register(101, 7));
        assert_eq!(state.get(101).map(|r| r.index), Some(0));

        state.mark_exited(101, "gone");
        assert!(state.register(101, 7));
        assert_eq!(state.get(101).map(|r| r.request_count), Some(0));
    }
}
