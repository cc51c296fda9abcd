//! Master-side worker supervision.
//!
//! # Responsibilities
//! - Launch N worker processes and keep one `WorkerRecord` per pid
//! - Count `notifyRequest` messages per worker
//! - Publish an aggregate snapshot every report interval
//! - Log worker exits (no respawn)
//! - Stop workers gracefully or by force
//!
//! # Data Flow
//! ```text
//! worker stdout ─▶ monitor task ─┐
//! worker exit   ─▶ monitor task ─┴─▶ events channel ─▶ run loop ─▶ ClusterState
//! report ticker ──────────────────────────────────────▶ run loop ─▶ log + metrics + watch
//! ```
//!
//! # Design Decisions
//! - One event loop owns every record; monitor tasks only forward events
//! - A worker is asked to drain by closing its stdin
//! - Dead records are reaped after the snapshot that first shows them dead

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use crate::cluster::ipc::{IpcMessage, WORKER_INDEX_ENV};
use crate::cluster::state::{ClusterSnapshot, ClusterState, WorkerRecord};
use crate::config::HttpConfig;
use crate::lifecycle::shutdown::{recv_force, recv_stop, StopMode};
use crate::observability::metrics;

const EVENT_QUEUE_CAPACITY: usize = 4096;
/// Extra time past the grace period before stragglers are killed.
const STOP_SLACK: Duration = Duration::from_secs(1);
const KILL_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("cannot locate current executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("failed to launch worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {index} exited before its pid was known")]
    MissingPid { index: usize },

    #[error("worker {index} has no IPC pipe")]
    MissingPipe { index: usize },
}

/// Input to the supervisor event loop.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// A parsed IPC line from worker `from`.
    Message { from: u32, message: IpcMessage },
    /// Worker `pid` terminated.
    Exited { pid: u32, reason: String, success: bool },
}

/// How to launch one worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Re-execute the running binary with its original arguments.
    pub fn current_exe() -> Result<Self, ClusterError> {
        let program = std::env::current_exe().map_err(ClusterError::CurrentExe)?;
        Ok(Self {
            program,
            args: std::env::args_os().skip(1).collect(),
            envs: Vec::new(),
        })
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command(&self, index: usize) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env(WORKER_INDEX_ENV, index.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

/// Final state of every worker the supervisor launched or tracked.
#[derive(Debug, Clone, Default)]
pub struct ClusterReport {
    pub workers: Vec<WorkerRecord>,
}

impl ClusterReport {
    pub fn counts(&self) -> BTreeMap<u32, u64> {
        self.workers.iter().map(|w| (w.pid, w.request_count)).collect()
    }

    pub fn total_requests(&self) -> u64 {
        self.workers.iter().map(|w| w.request_count).sum()
    }
}

struct WorkerLink {
    stdin: Option<ChildStdin>,
    kill: Option<oneshot::Sender<()>>,
}

pub struct ClusterSupervisor {
    state: ClusterState,
    links: HashMap<u32, WorkerLink>,
    retired: Vec<WorkerRecord>,
    events_tx: mpsc::Sender<SupervisorEvent>,
    events_rx: mpsc::Receiver<SupervisorEvent>,
    snapshots: watch::Sender<ClusterSnapshot>,
    report_interval: Duration,
    grace_period: Duration,
    stopping: bool,
}

impl std::fmt::Debug for ClusterSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSupervisor")
            .field("state", &self.state)
            .field("report_interval", &self.report_interval)
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

impl ClusterSupervisor {
    pub fn new(report_interval: Duration, grace_period: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (snapshots, _) = watch::channel(ClusterSnapshot::default());
        Self {
            state: ClusterState::new(),
            links: HashMap::new(),
            retired: Vec::new(),
            events_tx,
            events_rx,
            snapshots,
            report_interval,
            grace_period,
            stopping: false,
        }
    }

    pub fn from_config(config: &HttpConfig) -> Self {
        Self::new(
            Duration::from_millis(config.cluster.report_interval_ms),
            Duration::from_millis(config.timeouts.grace_period_ms),
        )
    }

    /// Sender for injecting events, used by monitors and tests.
    pub fn events(&self) -> mpsc::Sender<SupervisorEvent> {
        self.events_tx.clone()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<ClusterSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn state(&self) -> &ClusterState {
        &self.state
    }

    /// Record a worker that this supervisor did not launch.
    ///
    /// Tracked workers have no process handle; they are marked dead on stop.
    pub fn track(&mut self, pid: u32, index: usize) -> bool {
        self.state.register(pid, index)
    }

    /// Launch `count` workers. On failure, workers launched so far are killed.
    pub fn spawn_workers(&mut self, count: usize, command: &WorkerCommand) -> Result<Vec<u32>, ClusterError> {
        let mut pids = Vec::with_capacity(count);
        for index in 0..count {
            match self.spawn_one(index, command) {
                Ok(pid) => pids.push(pid),
                Err(e) => {
                    self.kill_all();
                    return Err(e);
                }
            }
        }
        Ok(pids)
    }

    fn spawn_one(&mut self, index: usize, command: &WorkerCommand) -> Result<u32, ClusterError> {
        let mut child = command
            .command(index)
            .spawn()
            .map_err(|source| ClusterError::Spawn { index, source })?;

        let pid = child.id().ok_or(ClusterError::MissingPid { index })?;
        let stdout = child.stdout.take().ok_or(ClusterError::MissingPipe { index })?;
        let stdin = child.stdin.take();
        let (kill_tx, kill_rx) = oneshot::channel();

        self.state.register(pid, index);
        self.links.insert(
            pid,
            WorkerLink {
                stdin,
                kill: Some(kill_tx),
            },
        );
        tokio::spawn(monitor_worker(pid, child, stdout, kill_rx, self.events_tx.clone()));

        tracing::info!(pid, index, "Worker launched");
        Ok(pid)
    }

    /// Process events until a stop request arrives, then stop every worker.
    pub async fn run(mut self, mut stop: broadcast::Receiver<StopMode>) -> ClusterReport {
        let mut ticker = tokio::time::interval(self.report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::info!(
            workers = self.state.alive_count(),
            report_interval_ms = self.report_interval.as_millis() as u64,
            "Cluster supervisor running"
        );

        let mode = loop {
            tokio::select! {
                biased;
                mode = recv_stop(&mut stop) => break mode,
                _ = ticker.tick() => self.report(),
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        };

        self.shutdown(mode, &mut stop).await;
        self.into_report()
    }

    fn handle_event(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::Message { from, message } => match message {
                IpcMessage::NotifyRequest { pid } => {
                    if !self.state.record_request(pid) {
                        tracing::warn!(pid, from, "notifyRequest for unknown worker ignored");
                    }
                }
                IpcMessage::Other => tracing::trace!(from, "Ignoring unsupported IPC command"),
            },
            SupervisorEvent::Exited { pid, reason, success } => {
                self.links.remove(&pid);
                if !self.state.mark_exited(pid, reason.as_str()) {
                    tracing::debug!(pid, "Exit reported for unknown worker");
                    return;
                }

                if self.stopping || success {
                    tracing::info!(pid, reason = %reason, "Worker exited");
                } else {
                    tracing::warn!(pid, reason = %reason, "Worker exited unexpectedly, not respawning");
                }
                if !self.stopping && self.state.alive_count() == 0 {
                    tracing::error!("All workers have exited");
                }
            }
        }
    }

    fn report(&mut self) {
        let snapshot = self.state.snapshot();
        tracing::info!(
            alive = snapshot.alive,
            total = snapshot.total(),
            counts = ?snapshot.counts,
            "Worker request counts"
        );
        metrics::record_cluster_snapshot(&snapshot);
        self.snapshots.send_replace(snapshot);
        self.retired.extend(self.state.reap_dead());
    }

    async fn shutdown(&mut self, mode: StopMode, stop: &mut broadcast::Receiver<StopMode>) {
        self.stopping = true;
        tracing::info!(mode = ?mode, workers = self.state.alive_count(), "Stopping workers");

        for pid in self.state.alive_pids() {
            if !self.links.contains_key(&pid) {
                self.state.mark_exited(pid, "no process handle");
            }
        }

        let drained = match mode {
            StopMode::Graceful => {
                for link in self.links.values_mut() {
                    link.stdin.take();
                }
                let deadline = self.grace_period + STOP_SLACK;
                let outcome = tokio::select! {
                    result = tokio::time::timeout(deadline, self.drain_exits()) => {
                        result.map_err(|_| "Workers did not stop in time, killing")
                    }
                    _ = recv_force(stop) => Err("Forced stop requested while draining, killing"),
                };
                match outcome {
                    Ok(()) => true,
                    Err(reason) => {
                        tracing::warn!(remaining = self.state.alive_count(), "{reason}");
                        false
                    }
                }
            }
            StopMode::Force => {
                self.kill_all();
                tokio::time::timeout(KILL_WAIT, self.drain_exits()).await.is_ok()
            }
        };

        if !drained {
            self.kill_all();
            if tokio::time::timeout(KILL_WAIT, self.drain_exits()).await.is_err() {
                tracing::error!(remaining = self.state.alive_count(), "Workers still running after kill");
            }
        }

        self.report();
    }

    async fn drain_exits(&mut self) {
        while self.state.alive_count() > 0 {
            match self.events_rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
    }

    fn kill_all(&mut self) {
        for link in self.links.values_mut() {
            if let Some(kill) = link.kill.take() {
                let _ = kill.send(());
            }
        }
    }

    fn into_report(mut self) -> ClusterReport {
        let mut workers = std::mem::take(&mut self.retired);
        workers.extend(self.state.records().cloned());
        workers.sort_by_key(|w| w.pid);
        ClusterReport { workers }
    }
}

/// Forward a worker's IPC lines and its exit to the event loop.
async fn monitor_worker(
    pid: u32,
    mut child: Child,
    stdout: ChildStdout,
    mut kill: oneshot::Receiver<()>,
    events: mpsc::Sender<SupervisorEvent>,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut stdout_open = true;
    let mut killed = false;

    let status = loop {
        tokio::select! {
            biased;
            _ = &mut kill, if !killed => {
                killed = true;
                if let Err(e) = child.start_kill() {
                    tracing::debug!(pid, error = %e, "Kill failed");
                }
            }
            line = lines.next_line(), if stdout_open => match line {
                Ok(Some(line)) => match IpcMessage::parse(&line) {
                    Some(message) => {
                        let _ = events.send(SupervisorEvent::Message { from: pid, message }).await;
                    }
                    None => tracing::debug!(pid, line = %line, "Ignoring non-IPC worker output"),
                },
                Ok(None) => stdout_open = false,
                Err(e) => {
                    tracing::debug!(pid, error = %e, "Worker IPC pipe failed");
                    stdout_open = false;
                }
            },
            status = child.wait(), if !stdout_open || killed => break status,
        }
    };

    let (reason, success) = match status {
        Ok(status) => (status.to_string(), status.success()),
        Err(e) => (format!("wait failed: {e}"), false),
    };
    let _ = events.send(SupervisorEvent::Exited { pid, reason, success }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;

    fn notify(from: u32, pid: u32) -> SupervisorEvent {
        SupervisorEvent::Message {
            from,
            message: IpcMessage::NotifyRequest { pid },
        }
    }

    async fn wait_for(
        rx: &mut watch::Receiver<ClusterSnapshot>,
        ready: impl FnMut(&ClusterSnapshot) -> bool,
    ) -> ClusterSnapshot {
        tokio::time::timeout(Duration::from_secs(10), rx.wait_for(ready))
            .await
            .expect("snapshot timed out")
            .expect("supervisor gone")
            .clone()
    }

    #[tokio::test]
    async fn aggregates_simulated_workers() {
        let mut supervisor = ClusterSupervisor::new(Duration::from_millis(20), Duration::from_millis(100));
        for (index, pid) in [101, 102, 103].into_iter().enumerate() {
            assert!(supervisor.track(pid, index));
        }
        let events = supervisor.events();
        let mut snapshots = supervisor.subscribe_snapshots();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(supervisor.run(shutdown.subscribe()));

        events.send(notify(999, 999)).await.unwrap();
        for pid in [101, 102, 103] {
            for _ in 0..5 {
                events.send(notify(pid, pid)).await.unwrap();
            }
        }
        events
            .send(SupervisorEvent::Message {
                from: 101,
                message: IpcMessage::Other,
            })
            .await
            .unwrap();

        let snapshot = wait_for(&mut snapshots, |s| s.total() == 15).await;
        assert_eq!(snapshot.counts, BTreeMap::from([(101, 5), (102, 5), (103, 5)]));
        assert_eq!(snapshot.alive, 3);

        shutdown.trigger(StopMode::Graceful);
        let report = task.await.unwrap();
        assert_eq!(report.counts(), BTreeMap::from([(101, 5), (102, 5), (103, 5)]));
        assert!(report.workers.iter().all(|w| !w.alive));
    }

    #[tokio::test]
    async fn exited_worker_is_reaped_without_respawn() {
        let mut supervisor = ClusterSupervisor::new(Duration::from_millis(20), Duration::from_millis(100));
        supervisor.track(201, 0);
        supervisor.track(202, 1);
        let events = supervisor.events();
        let mut snapshots = supervisor.subscribe_snapshots();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(supervisor.run(shutdown.subscribe()));

        events.send(notify(201, 201)).await.unwrap();
        events
            .send(SupervisorEvent::Exited {
                pid: 201,
                reason: "exit status: 3".to_string(),
                success: false,
            })
            .await
            .unwrap();

        let snapshot = wait_for(&mut snapshots, |s| s.alive == 1 && !s.counts.contains_key(&201)).await;
        assert_eq!(snapshot.counts, BTreeMap::from([(202, 0)]));

        // Messages for a reaped worker are ignored.
        events.send(notify(201, 201)).await.unwrap();

        shutdown.trigger(StopMode::Force);
        let report = task.await.unwrap();
        let dead = report.workers.iter().find(|w| w.pid == 201).unwrap();
        assert_eq!(dead.request_count, 1);
        assert_eq!(dead.exit_reason.as_deref(), Some("exit status: 3"));
        assert_eq!(report.workers.len(), 2);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let mut supervisor = ClusterSupervisor::new(Duration::from_secs(1), Duration::from_secs(1));
        let err = supervisor
            .spawn_workers(2, &WorkerCommand::new("/nonexistent/http-front-worker"))
            .unwrap_err();
        assert!(matches!(err, ClusterError::Spawn { index: 0, .. }));
        assert!(supervisor.state().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn counts_messages_from_real_processes() {
        let script = r#"for i in 1 2 3 4 5; do echo "{\"cmd\":\"notifyRequest\",\"pid\":$$}"; done; exec cat >/dev/null"#;
        let command = WorkerCommand::new("sh").arg("-c").arg(script);

        let mut supervisor = ClusterSupervisor::new(Duration::from_millis(20), Duration::from_secs(2));
        let pids = supervisor.spawn_workers(3, &command).unwrap();
        assert_eq!(pids.len(), 3);

        let mut snapshots = supervisor.subscribe_snapshots();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(supervisor.run(shutdown.subscribe()));

        let snapshot = wait_for(&mut snapshots, |s| s.total() == 15).await;
        let expected: BTreeMap<u32, u64> = pids.iter().map(|pid| (*pid, 5)).collect();
        assert_eq!(snapshot.counts, expected);

        shutdown.trigger(StopMode::Graceful);
        let report = task.await.unwrap();
        assert_eq!(report.counts(), expected);
        assert!(report.workers.iter().all(|w| !w.alive && w.exit_reason.is_some()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn force_stop_kills_workers() {
        let command = WorkerCommand::new("sh").arg("-c").arg("exec sleep 30");
        let mut supervisor = ClusterSupervisor::new(Duration::from_millis(50), Duration::from_secs(30));
        supervisor.spawn_workers(2, &command).unwrap();

        let shutdown = Shutdown::new();
        let task = tokio::spawn(supervisor.run(shutdown.subscribe()));
        shutdown.trigger(StopMode::Force);

        let report = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.workers.len(), 2);
        assert!(report.workers.iter().all(|w| !w.alive));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn force_after_graceful_cuts_the_drain_short() {
        // Workers ignore stdin EOF, so only a kill ends them.
        let command = WorkerCommand::new("sh").arg("-c").arg("exec sleep 30");
        let mut supervisor = ClusterSupervisor::new(Duration::from_millis(50), Duration::from_secs(30));
        supervisor.spawn_workers(2, &command).unwrap();

        let shutdown = Shutdown::new();
        let mut task = tokio::spawn(supervisor.run(shutdown.subscribe()));
        shutdown.trigger(StopMode::Graceful);

        assert!(tokio::time::timeout(Duration::from_millis(300), &mut task).await.is_err());

        shutdown.trigger(StopMode::Force);
        let report = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("forced stop ends the drain")
            .unwrap();
        assert_eq!(report.workers.len(), 2);
        assert!(report.workers.iter().all(|w| !w.alive));
    }
}
