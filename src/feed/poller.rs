use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::mesh::{AgentRecord, MemoryRecord, MessageRecord};

use super::source::{FeedError, SnapshotSource};

pub enum FeedUpdate {
    Agents(Vec<AgentRecord>),
    Messages(Vec<MessageRecord>),
    Memories {
        agent_id: String,
        memories: Vec<MemoryRecord>,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct PollSchedule {
    pub agents_interval: Duration,
    pub history_interval: Duration,
    pub history_limit: usize,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            agents_interval: Duration::from_millis(5_000),
            history_interval: Duration::from_millis(4_000),
            history_limit: 20,
        }
    }
}

type Notify = Arc<dyn Fn() + Send + Sync>;

struct Worker {
    feed: &'static str,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Polls each feed on its own thread until shut down or dropped.
pub struct FeedPoller {
    workers: Vec<Worker>,
    source: Arc<dyn SnapshotSource>,
    updates: Sender<FeedUpdate>,
    notify: Notify,
}

impl FeedPoller {
    pub fn spawn(
        source: Arc<dyn SnapshotSource>,
        schedule: PollSchedule,
        updates: Sender<FeedUpdate>,
        notify: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self> {
        let notify: Notify = Arc::new(notify);
        let mut poller = Self {
            workers: Vec::with_capacity(2),
            source: Arc::clone(&source),
            updates: updates.clone(),
            notify: Arc::clone(&notify),
        };

        let roster_source = Arc::clone(&source);
        poller.workers.push(spawn_worker(
            "agents",
            schedule.agents_interval,
            updates.clone(),
            Arc::clone(&notify),
            move || roster_source.fetch_agents().map(FeedUpdate::Agents),
        )?);

        let limit = schedule.history_limit;
        poller.workers.push(spawn_worker(
            "history",
            schedule.history_interval,
            updates,
            notify,
            move || source.fetch_messages(limit).map(FeedUpdate::Messages),
        )?);

        info!(
            agents_ms = schedule.agents_interval.as_millis() as u64,
            history_ms = schedule.history_interval.as_millis() as u64,
            history_limit = schedule.history_limit,
            "feed polling started"
        );
        Ok(poller)
    }

    /// Fetches one agent's memories on a short-lived thread. Failures are logged
    /// and produce no update.
    pub fn request_memories(&self, agent_id: &str) -> Result<()> {
        let source = Arc::clone(&self.source);
        let updates = self.updates.clone();
        let notify = Arc::clone(&self.notify);
        let agent_id = agent_id.to_owned();

        thread::Builder::new()
            .name("feed-memory".to_owned())
            .spawn(move || match source.fetch_memories(&agent_id) {
                Ok(memories) => {
                    debug!(agent = %agent_id, count = memories.len(), "memories fetched");
                    if updates.send(FeedUpdate::Memories { agent_id, memories }).is_ok() {
                        notify();
                    }
                }
                Err(error) => warn!(agent = %agent_id, %error, "memory fetch failed"),
            })
            .context("failed to spawn memory fetch")?;
        Ok(())
    }

    pub fn shutdown(&mut self) {
        for worker in &mut self.workers {
            drop(worker.stop.take());
        }

        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take()
                && handle.join().is_err()
            {
                warn!(feed = worker.feed, "feed worker panicked");
            }
        }
    }
}

impl Drop for FeedPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker<F>(
    feed: &'static str,
    interval: Duration,
    updates: Sender<FeedUpdate>,
    notify: Notify,
    fetch: F,
) -> Result<Worker>
where
    F: FnMut() -> Result<FeedUpdate, FeedError> + Send + 'static,
{
    let (stop_tx, stop_rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(format!("feed-{feed}"))
        .spawn(move || run_feed(feed, interval, &stop_rx, &updates, notify.as_ref(), fetch))
        .with_context(|| format!("failed to spawn {feed} feed worker"))?;

    Ok(Worker {
        feed,
        stop: Some(stop_tx),
        handle: Some(handle),
    })
}

fn run_feed<F>(
    feed: &'static str,
    interval: Duration,
    stop: &Receiver<()>,
    updates: &Sender<FeedUpdate>,
    notify: &(dyn Fn() + Send + Sync),
    mut fetch: F,
) where
    F: FnMut() -> Result<FeedUpdate, FeedError>,
{
    loop {
        match fetch() {
            Ok(update) => {
                if updates.send(update).is_err() {
                    debug!(feed, "update receiver dropped, stopping feed");
                    return;
                }
                notify();
            }
            Err(error) => warn!(feed, %error, "feed poll failed, keeping last snapshot"),
        }

        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!(feed, "feed polling stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct ScriptedSource {
        agent_calls: AtomicUsize,
        fail_first_agents: bool,
        history: Mutex<Vec<MessageRecord>>,
    }

    impl ScriptedSource {
        fn new(fail_first_agents: bool) -> Self {
            Self {
                agent_calls: AtomicUsize::new(0),
                fail_first_agents,
                history: Mutex::new(Vec::new()),
            }
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn fetch_agents(&self) -> Result<Vec<AgentRecord>, FeedError> {
            let call = self.agent_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first_agents && call == 0 {
                return Err(FeedError::Unavailable("connection refused".to_owned()));
            }

            Ok(vec![AgentRecord {
                id: format!("agent-{call}"),
                host_id: "host".to_owned(),
                operator: None,
                version: None,
                status: "active".to_owned(),
                last_seen: "2026-10-18T12:00:00Z".to_owned(),
                parent_id: None,
            }])
        }

        fn fetch_messages(&self, limit: usize) -> Result<Vec<MessageRecord>, FeedError> {
            let history = self.history.lock().expect("history lock");
            Ok(history.iter().take(limit).cloned().collect())
        }

        fn fetch_memories(&self, agent_id: &str) -> Result<Vec<MemoryRecord>, FeedError> {
            if agent_id == "unknown" {
                return Err(FeedError::Unavailable("no such agent".to_owned()));
            }
            Ok(vec![MemoryRecord {
                kind: Some("Fact".to_owned()),
                content: Some(format!("{agent_id} remembers")),
                text: None,
                score: Some(0.5),
            }])
        }
    }

    fn fast_schedule() -> PollSchedule {
        PollSchedule {
            agents_interval: Duration::from_millis(10),
            history_interval: Duration::from_millis(10),
            history_limit: 20,
        }
    }

    #[test]
    fn failed_poll_is_retried_on_next_tick() {
        let source = Arc::new(ScriptedSource::new(true));
        let (tx, rx) = mpsc::channel();
        let mut poller = FeedPoller::spawn(source.clone(), fast_schedule(), tx, || {})
            .expect("spawn poller");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut roster = None;
        while roster.is_none() && Instant::now() < deadline {
            if let Ok(FeedUpdate::Agents(agents)) = rx.recv_timeout(Duration::from_millis(100)) {
                roster = Some(agents);
            }
        }
        poller.shutdown();

        let roster = roster.expect("roster delivered after retry");
        assert_eq!(roster[0].id, "agent-1");
        assert!(source.agent_calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn both_feeds_report_and_notify() {
        let source = Arc::new(ScriptedSource::new(false));
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        let (tx, rx) = mpsc::channel();
        let _poller = FeedPoller::spawn(source, fast_schedule(), tx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn poller");

        let mut saw_agents = false;
        let mut saw_messages = false;
        let deadline = Instant::now() + Duration::from_secs(5);
        while !(saw_agents && saw_messages) && Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(FeedUpdate::Agents(_)) => saw_agents = true,
                Ok(FeedUpdate::Messages(_)) => saw_messages = true,
                Ok(FeedUpdate::Memories { .. }) => {}
                Err(_) => {}
            }
        }

        assert!(saw_agents && saw_messages);
        assert!(notified.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn shutdown_interrupts_long_intervals() {
        let source = Arc::new(ScriptedSource::new(false));
        let schedule = PollSchedule {
            agents_interval: Duration::from_secs(3_600),
            history_interval: Duration::from_secs(3_600),
            history_limit: 5,
        };
        let (tx, rx) = mpsc::channel();
        let mut poller = FeedPoller::spawn(source.clone(), schedule, tx, || {}).expect("spawn poller");
        let _ = rx.recv_timeout(Duration::from_secs(5));

        let started = Instant::now();
        poller.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(source.agent_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memory_request_delivers_tagged_update() {
        let source = Arc::new(ScriptedSource::new(false));
        let schedule = PollSchedule {
            agents_interval: Duration::from_secs(3_600),
            history_interval: Duration::from_secs(3_600),
            history_limit: 5,
        };
        let (tx, rx) = mpsc::channel();
        let poller = FeedPoller::spawn(source, schedule, tx, || {}).expect("spawn poller");

        poller.request_memories("unknown").expect("spawn failing fetch");
        poller.request_memories("claude-1").expect("spawn fetch");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut delivered = Vec::new();
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(FeedUpdate::Memories { agent_id, memories }) => {
                    delivered.push((agent_id, memories));
                    break;
                }
                Ok(_) | Err(_) => {}
            }
        }

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "claude-1");
        assert_eq!(delivered[0].1[0].body(), "claude-1 remembers");
        assert!(
            rx.recv_timeout(Duration::from_millis(200))
                .map_or(true, |update| !matches!(update, FeedUpdate::Memories { .. }))
        );
    }
}
