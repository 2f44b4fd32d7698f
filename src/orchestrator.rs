//! Bounded-concurrency batch orchestration
//!
//! One tokio task per selected host, gated by a semaphore of size
//! `max_threads`. A shared atomic stop flag prevents new dispatch; tasks
//! already past the gate run to completion. All task state lives in
//! [`TaskStateStore`], mutated only by whoever consumes the event channel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use crate::config::RunConfig;
use crate::events::{Event, EventSink, LogEvent, TaskStatus};
use crate::hosts::HostTarget;
use crate::worker;

/// Accumulated state for one host task; exactly one exists per host per run
#[derive(Debug)]
pub struct TaskState {
    pub status: TaskStatus,
    pub transcript: Vec<LogEvent>,
}

impl Default for TaskState {
    fn default() -> Self {
        Self {
            status: TaskStatus::Waiting,
            transcript: Vec::new(),
        }
    }
}

/// Single-writer store over all task states, fed by applying events in
/// the order they arrive
#[derive(Debug, Default)]
pub struct TaskStateStore {
    tasks: HashMap<String, TaskState>,
    pub completed: usize,
    pub total: usize,
    pub done: bool,
}

impl TaskStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Per-host events arrive in emission order, so the
    /// stored status is always the host's latest.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::Status { host, status } => {
                self.tasks.entry(host.clone()).or_default().status = *status;
            }
            Event::Log(log) => {
                self.tasks
                    .entry(log.host.clone())
                    .or_default()
                    .transcript
                    .push(log.clone());
            }
            Event::Progress { completed, total } => {
                self.completed = *completed;
                self.total = *total;
            }
            Event::Done => self.done = true,
        }
    }

    pub fn status_of(&self, host: &str) -> Option<TaskStatus> {
        self.tasks.get(host).map(|t| t.status)
    }

    pub fn task(&self, host: &str) -> Option<&TaskState> {
        self.tasks.get(host)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TaskState)> {
        self.tasks.iter()
    }
}

/// Dispatches one worker per host under a bounded pool and reports
/// progress on the event channel
pub struct Orchestrator {
    config: Arc<RunConfig>,
    stop: Arc<AtomicBool>,
    tx: UnboundedSender<Event>,
}

impl Orchestrator {
    /// Create an orchestrator and the receiving end of its event channel
    pub fn new(config: Arc<RunConfig>) -> (Self, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                stop: Arc::new(AtomicBool::new(false)),
                tx,
            },
            rx,
        )
    }

    /// Shared cancellation flag. Setting it prevents any not-yet-dispatched
    /// task from running; in-flight sessions finish naturally.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run the batch: one SSH worker per host
    pub async fn run(&self, hosts: Vec<HostTarget>) {
        let config = self.config.clone();
        self.run_with(hosts, move |host, sink| {
            let config = config.clone();
            worker::run_host(host, config, sink)
        })
        .await;
    }

    /// Run the batch with an arbitrary worker body. Status bookkeeping
    /// (Waiting, Running, terminal, Stopped) is owned here so every worker
    /// follows the same lifecycle.
    pub(crate) async fn run_with<F, Fut>(&self, hosts: Vec<HostTarget>, make_worker: F)
    where
        F: Fn(HostTarget, EventSink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskStatus> + Send + 'static,
    {
        let total = hosts.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_threads));
        let make_worker = Arc::new(make_worker);
        let mut tasks = JoinSet::new();

        for host in hosts {
            let sink = EventSink::new(host.ip.clone(), self.tx.clone());
            sink.status(TaskStatus::Waiting);

            let semaphore = semaphore.clone();
            let stop = self.stop.clone();
            let make_worker = make_worker.clone();

            tasks.spawn(async move {
                // The semaphore is never closed while tasks exist, but a
                // failed acquire must still settle the task's status.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    sink.status(TaskStatus::Stopped);
                    return;
                };

                if stop.load(Ordering::SeqCst) {
                    sink.log("stopped before dispatch");
                    sink.status(TaskStatus::Stopped);
                    return;
                }

                sink.status(TaskStatus::Running);
                let status = make_worker(host, sink.clone()).await;
                sink.status(status);
            });
        }

        let mut completed = 0usize;
        while tasks.join_next().await.is_some() {
            completed += 1;
            let _ = self.tx.send(Event::Progress { completed, total });
        }

        info!("batch finished: {}/{} tasks completed", completed, total);
        let _ = self.tx.send(Event::Done);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Args, RunConfig};
    use crate::credentials::CredentialInput;
    use clap::Parser;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn test_config(max_threads: usize) -> Arc<RunConfig> {
        let mut args = Args::parse_from(["ssh-batch", "--hosts", "hosts.json"]);
        args.max_threads = max_threads;
        Arc::new(RunConfig::from_args(&args).unwrap())
    }

    fn test_hosts(n: usize) -> Vec<HostTarget> {
        (1..=n)
            .map(|i| HostTarget {
                ip: format!("10.0.0.{}", i),
                user: None,
                pwd: CredentialInput::Absent,
                root_pwd: CredentialInput::Absent,
                hostname: None,
            })
            .collect()
    }

    async fn drain(mut rx: UnboundedReceiver<Event>) -> (TaskStateStore, Vec<Event>) {
        let mut store = TaskStateStore::new();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            store.apply(&event);
            let is_done = matches!(event, Event::Done);
            events.push(event);
            if is_done {
                break;
            }
        }
        (store, events)
    }

    #[tokio::test]
    async fn test_bounded_concurrency() {
        let (orchestrator, rx) = Orchestrator::new(test_config(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let running_w = running.clone();
        let peak_w = peak.clone();
        orchestrator
            .run_with(test_hosts(5), move |_host, _sink| {
                let running = running_w.clone();
                let peak = peak_w.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    TaskStatus::Success
                }
            })
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 2, "more than 2 tasks ran at once");

        let (store, _) = drain(rx).await;
        assert!(store.done);
        assert_eq!(store.completed, 5);
        for i in 1..=5 {
            assert_eq!(
                store.status_of(&format!("10.0.0.{}", i)),
                Some(TaskStatus::Success)
            );
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_undispatched_tasks() {
        let (orchestrator, rx) = Orchestrator::new(test_config(2));
        let stop = orchestrator.stop_handle();

        let started = Arc::new(AtomicUsize::new(0));
        // Zero-permit semaphore as a release gate: permits added later are
        // never lost, unlike a Notify wakeup racing the waiter.
        let release = Arc::new(Semaphore::new(0));
        let two_started = Arc::new(Notify::new());

        let started_w = started.clone();
        let release_w = release.clone();
        let two_started_w = two_started.clone();
        let run = tokio::spawn(async move {
            orchestrator
                .run_with(test_hosts(5), move |_host, _sink| {
                    let started = started_w.clone();
                    let release = release_w.clone();
                    let two_started = two_started_w.clone();
                    async move {
                        if started.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                            two_started.notify_one();
                        }
                        let _ = release.acquire().await;
                        TaskStatus::Success
                    }
                })
                .await;
        });

        // Wait until 2 of 5 are running, set the stop flag, let them finish.
        two_started.notified().await;
        stop.store(true, Ordering::SeqCst);
        release.add_permits(5);
        run.await.unwrap();

        let (store, events) = drain(rx).await;
        assert!(store.done);

        let mut success = 0;
        let mut stopped = 0;
        for i in 1..=5 {
            match store.status_of(&format!("10.0.0.{}", i)).unwrap() {
                TaskStatus::Success => success += 1,
                TaskStatus::Stopped => stopped += 1,
                other => panic!("unexpected terminal status {other}"),
            }
        }
        assert_eq!(success, 2);
        assert_eq!(stopped, 3);

        // A stopped host must never have entered Running.
        for event in &events {
            if let Event::Status { host, status } = event {
                if *status == TaskStatus::Running {
                    assert_eq!(store.status_of(host), Some(TaskStatus::Success));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_complete() {
        let (orchestrator, rx) = Orchestrator::new(test_config(3));
        orchestrator
            .run_with(test_hosts(4), |_host, _sink| async { TaskStatus::Success })
            .await;

        let (store, events) = drain(rx).await;
        assert_eq!(store.completed, 4);
        assert_eq!(store.total, 4);

        let mut last = 0;
        for event in &events {
            if let Event::Progress { completed, total } = event {
                assert!(*completed > last, "progress went backwards");
                assert_eq!(*total, 4);
                last = *completed;
            }
        }
        assert_eq!(last, 4);
        assert!(matches!(events.last(), Some(Event::Done)));
    }

    #[tokio::test]
    async fn test_store_applies_per_host_order() {
        let mut store = TaskStateStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new("10.1.1.1", tx);

        sink.status(TaskStatus::Waiting);
        sink.status(TaskStatus::Running);
        sink.log("line 1");
        sink.log("line 2");
        sink.status(TaskStatus::FailRoot);
        drop(sink);

        while let Some(event) = rx.recv().await {
            store.apply(&event);
        }

        let task = store.task("10.1.1.1").unwrap();
        assert_eq!(task.status, TaskStatus::FailRoot);
        assert_eq!(task.transcript.len(), 2);
        assert_eq!(task.transcript[0].text, "line 1");
        assert_eq!(task.transcript[1].text, "line 2");
    }
}
