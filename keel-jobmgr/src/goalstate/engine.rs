//! Goal state engine
//!
//! A delay queue keyed by entity identity and drained by a fixed pool of
//! workers. An entity is in the queue at most once, and at most one action
//! per entity runs at any time: enqueueing an entity while it runs defers the
//! request until the running action returns.
//!
//! Failed actions are logged and counted, never retried here.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ActionError;

/// Something the engine can schedule
#[async_trait]
pub trait Entity: Clone + Send + Sync + 'static {
    type Id: Clone + Ord + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;

    /// Runs the action bound to the entity's current state
    async fn run(&self) -> Result<(), ActionError>;
}

struct Entry<E> {
    entity: E,
    /// Pending run time; while running, a deferred request
    run_at: Option<Instant>,
    running: bool,
}

struct Queue<E: Entity> {
    entries: HashMap<E::Id, Entry<E>>,
    /// May hold stale pairs; a pair is live only if it matches its entry's `run_at`
    heap: BinaryHeap<Reverse<(Instant, E::Id)>>,
}

enum Next<E> {
    Ready(E),
    Wait(Instant),
    Empty,
}

pub struct Engine<E: Entity> {
    name: &'static str,
    worker_count: usize,
    queue: Mutex<Queue<E>>,
    notify: Notify,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    runs: AtomicU64,
    failures: AtomicU64,
}

impl<E: Entity> Engine<E> {
    pub fn new(name: &'static str, worker_count: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            name,
            worker_count: worker_count.max(1),
            queue: Mutex::new(Queue {
                entries: HashMap::new(),
                heap: BinaryHeap::new(),
            }),
            notify: Notify::new(),
            shutdown,
            workers: Mutex::new(Vec::new()),
            runs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Schedules `entity` to run no earlier than `run_at`.
    ///
    /// An entity that is already queued keeps the later of the two times.
    pub fn enqueue(&self, entity: E, run_at: Instant) {
        let id = entity.id();
        {
            let mut queue = self.queue.lock();
            let Queue { entries, heap } = &mut *queue;

            match entries.get_mut(&id) {
                Some(entry) => {
                    let at = entry.run_at.map_or(run_at, |current| current.max(run_at));
                    let changed = entry.run_at != Some(at);
                    entry.run_at = Some(at);
                    entry.entity = entity;

                    if entry.running {
                        debug!(engine = self.name, entity = %id, "Deferring enqueue of running entity");
                        return;
                    }
                    if changed {
                        heap.push(Reverse((at, id)));
                    }
                }
                None => {
                    entries.insert(
                        id.clone(),
                        Entry {
                            entity,
                            run_at: Some(run_at),
                            running: false,
                        },
                    );
                    heap.push(Reverse((run_at, id)));
                }
            }
        }

        self.notify.notify_one();
    }

    pub fn is_scheduled(&self, id: &E::Id) -> bool {
        self.queue
            .lock()
            .entries
            .get(id)
            .is_some_and(|entry| entry.run_at.is_some())
    }

    /// Number of entities waiting to run, deferred ones included
    pub fn queue_length(&self) -> usize {
        self.queue
            .lock()
            .entries
            .values()
            .filter(|entry| entry.run_at.is_some())
            .count()
    }

    /// Drops a queued entity. A running one finishes without running again.
    pub fn delete(&self, id: &E::Id) {
        let mut queue = self.queue.lock();
        match queue.entries.get_mut(id) {
            Some(entry) if entry.running => entry.run_at = None,
            Some(_) => {
                queue.entries.remove(id);
            }
            None => {}
        }
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Spawns the workers. Does nothing if they are already running.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }

        self.shutdown.send_replace(false);
        for _ in 0..self.worker_count {
            let engine = Arc::clone(self);
            let shutdown = self.shutdown.subscribe();
            workers.push(tokio::spawn(engine.work(shutdown)));
        }

        info!(
            "Started {} engine with {} worker(s)",
            self.name, self.worker_count
        );
    }

    /// Signals the workers to exit, clears the queue and waits for them.
    ///
    /// Actions already running are awaited, not aborted.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let workers = std::mem::take(&mut *self.workers.lock());
        {
            let mut queue = self.queue.lock();
            queue.entries.retain(|_, entry| {
                entry.run_at = None;
                entry.running
            });
            queue.heap.clear();
        }

        for worker in workers {
            if let Err(e) = worker.await {
                warn!("{} engine worker panicked: {}", self.name, e);
            }
        }

        info!("Stopped {} engine", self.name);
    }

    async fn work(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.next_ready() {
                Next::Ready(entity) => self.execute(entity).await,
                Next::Wait(deadline) => {
                    tokio::select! {
                        changed = shutdown.changed() => if changed.is_err() { break },
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                Next::Empty => {
                    tokio::select! {
                        changed = shutdown.changed() => if changed.is_err() { break },
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
    }

    /// Pops the earliest due entity and marks it running
    fn next_ready(&self) -> Next<E> {
        let mut queue = self.queue.lock();
        let now = Instant::now();

        loop {
            let Some(Reverse((at, id))) = queue.heap.peek().cloned() else {
                return Next::Empty;
            };

            let live = queue
                .entries
                .get(&id)
                .is_some_and(|entry| entry.run_at == Some(at) && !entry.running);
            if !live {
                queue.heap.pop();
                continue;
            }

            if at > now {
                return Next::Wait(at);
            }

            queue.heap.pop();
            let more = !queue.heap.is_empty();
            let Some(entry) = queue.entries.get_mut(&id) else {
                continue;
            };
            entry.run_at = None;
            entry.running = true;
            let entity = entry.entity.clone();

            // Hand the rest of the queue to another worker
            if more {
                self.notify.notify_one();
            }
            return Next::Ready(entity);
        }
    }

    async fn execute(&self, entity: E) {
        let id = entity.id();
        debug!(engine = self.name, entity = %id, "Running goal state action");

        let handle = tokio::spawn(async move { entity.run().await });
        self.runs.fetch_add(1, Ordering::Relaxed);

        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(engine = self.name, entity = %id, "Goal state action failed: {}", e);
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(engine = self.name, entity = %id, "Goal state action panicked: {}", e);
            }
        }

        self.complete(&id);
    }

    /// Releases a finished entity and re-queues its deferred request, if any
    fn complete(&self, id: &E::Id) {
        let requeued = {
            let mut queue = self.queue.lock();
            let Queue { entries, heap } = &mut *queue;

            match entries.get_mut(id) {
                Some(entry) => match entry.run_at {
                    Some(at) => {
                        entry.running = false;
                        heap.push(Reverse((at, id.clone())));
                        true
                    }
                    None => {
                        entries.remove(id);
                        false
                    }
                },
                None => false,
            }
        };

        if requeued {
            self.notify.notify_one();
        }
    }
}
