//! Player-initiated crafting on a shared ledger.
//!
//! The [`CraftingEngine`] runs independently of the machine tick. Instant
//! recipes complete inside [`CraftingEngine::start_crafting`]. Timed recipes
//! reserve their ingredients immediately and are completed later by a
//! dedicated scheduler thread, which wakes for the earliest deadline (or at
//! least every `max_poll_ms`, so a [`ManualClock`](crate::clock::ManualClock)
//! jump is noticed promptly).
//!
//! Ledger rollback rules:
//!
//! - A reservation is all-or-nothing; a failed start leaves the ledger as
//!   it was.
//! - If any result does not fit at completion, results already added are
//!   taken back out and every reserved ingredient is returned.
//!
//! Listener callbacks for completions run on the scheduler thread (or on
//! whichever thread calls [`CraftingEngine::run_due_completions`]).

use crate::catalog::{Recipe, RecipeEntry};
use crate::clock::SharedClock;
use crate::config::CraftingConfig;
use crate::fixed::Millis;
use crate::id::ProcessId;
use crate::ledger::{Ledger, SharedLedger};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Why a craft did not happen. The `Display` text is the human reason
/// passed to [`CraftingListener::on_crafting_failed`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CraftFailure {
    #[error("not enough ingredients for {recipe}")]
    MissingIngredients { recipe: String },
    #[error("not enough inventory space for the results of {recipe}")]
    NoSpace { recipe: String },
    #[error("inventory filled up before {recipe} finished; ingredients returned")]
    ResultsRejected { recipe: String },
    #[error("crafting process {0} is already running")]
    DuplicateProcess(ProcessId),
    #[error("crafting engine is shut down")]
    ShutDown,
    #[error("crafting scheduler is not running")]
    SchedulerUnavailable,
    #[error("internal crafting error: {0}")]
    Internal(String),
}

/// Observer of crafting progress. All methods default to no-ops.
pub trait CraftingListener: Send + Sync {
    fn on_crafting_started(&self, _process: &ProcessId, _recipe: &Recipe) {}
    fn on_crafting_completed(&self, _process: &ProcessId, _recipe: &Recipe) {}
    fn on_crafting_failed(&self, _process: &ProcessId, _recipe: &Recipe, _reason: &CraftFailure) {
    }
}

/// A timed craft whose ingredients are already out of the ledger.
#[derive(Debug, Clone)]
pub struct CraftingProcess {
    pub recipe: Arc<Recipe>,
    pub ledger: SharedLedger,
    pub started_ms: Millis,
    pub duration_ms: Millis,
    pub reserved: Vec<RecipeEntry>,
    seq: u64,
}

impl CraftingProcess {
    fn due_ms(&self) -> Millis {
        self.started_ms.saturating_add(self.duration_ms)
    }

    fn progress(&self, now: Millis) -> f64 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        (now.saturating_sub(self.started_ms) as f64 / self.duration_ms as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    due_ms: Millis,
    seq: u64,
    process: ProcessId,
}

enum SchedulerMsg {
    Schedule(Deadline),
    Stop,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared between the engine handle and the scheduler thread.
struct EngineShared {
    clock: SharedClock,
    config: CraftingConfig,
    processes: Mutex<HashMap<ProcessId, CraftingProcess>>,
    listeners: RwLock<Vec<Arc<dyn CraftingListener>>>,
    accepting: AtomicBool,
    next_seq: AtomicU64,
}

impl EngineShared {
    fn listeners(&self) -> Vec<Arc<dyn CraftingListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Call `event` on every listener. A panicking listener is logged and
    /// skipped; it never changes the outcome of the craft it observes.
    fn dispatch(&self, process: &ProcessId, event: &str, call: impl Fn(&dyn CraftingListener)) {
        for listener in self.listeners() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| call(listener.as_ref()))) {
                tracing::warn!(
                    process = %process,
                    event,
                    panic = %panic_message(&*panic),
                    "crafting listener panicked"
                );
            }
        }
    }

    fn notify_started(&self, process: &ProcessId, recipe: &Recipe) {
        self.dispatch(process, "started", |l| l.on_crafting_started(process, recipe));
    }

    fn notify_completed(&self, process: &ProcessId, recipe: &Recipe) {
        self.dispatch(process, "completed", |l| l.on_crafting_completed(process, recipe));
    }

    fn notify_failed(&self, process: &ProcessId, recipe: &Recipe, reason: &CraftFailure) {
        self.dispatch(process, "failed", |l| l.on_crafting_failed(process, recipe, reason));
    }

    /// Finish a timed craft. With `seq`, only the process scheduled under
    /// that sequence number is completed, so a stale deadline never
    /// finishes a newer process that reused the id.
    fn complete(&self, id: &ProcessId, seq: Option<u64>) -> bool {
        let process = {
            let mut processes = lock(&self.processes);
            match processes.get(id) {
                Some(p) if seq.is_none_or(|s| s == p.seq) => {}
                _ => return false,
            }
            match processes.remove(id) {
                Some(p) => p,
                None => return false,
            }
        };
        // A craft taken off the map just as shutdown began is abandoned too.
        if !self.accepting.load(Ordering::SeqCst) {
            tracing::debug!(process = %id, "completion skipped after shutdown");
            return false;
        }

        if add_all(&process.ledger, &process.recipe.results) {
            tracing::info!(process = %id, recipe = %process.recipe.name, "craft completed");
            self.notify_completed(id, &process.recipe);
        } else {
            refund(&process.ledger, &process.reserved);
            tracing::warn!(
                process = %id,
                recipe = %process.recipe.name,
                "craft results did not fit; rolled back"
            );
            let reason = CraftFailure::ResultsRejected {
                recipe: process.recipe.name.clone(),
            };
            self.notify_failed(id, &process.recipe, &reason);
        }
        true
    }
}

/// Add every entry or none of them.
fn add_all(ledger: &Ledger, entries: &[RecipeEntry]) -> bool {
    for (i, entry) in entries.iter().enumerate() {
        if !ledger.add_resource(entry.resource, entry.quantity) {
            for added in &entries[..i] {
                if !ledger.remove_resource(added.resource, added.quantity) {
                    tracing::warn!(resource = ?added.resource, "partial result already consumed");
                }
            }
            return false;
        }
    }
    true
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic while crafting".to_string())
}

fn refund(ledger: &Ledger, reserved: &[RecipeEntry]) {
    for entry in reserved {
        if !ledger.add_resource(entry.resource, entry.quantity) {
            tracing::warn!(
                resource = ?entry.resource,
                quantity = entry.quantity,
                "reserved ingredients did not fit on refund"
            );
        }
    }
}

fn run_scheduler(
    shared: Arc<EngineShared>,
    rx: mpsc::Receiver<SchedulerMsg>,
    done_tx: mpsc::Sender<()>,
) {
    let max_poll = shared.config.max_poll_ms.max(1);
    let mut deadlines: BinaryHeap<Reverse<Deadline>> = BinaryHeap::new();
    loop {
        let now = shared.clock.now_ms();
        let wait = deadlines
            .peek()
            .map_or(max_poll, |Reverse(d)| d.due_ms.saturating_sub(now).min(max_poll));
        match rx.recv_timeout(Duration::from_millis(wait)) {
            Ok(SchedulerMsg::Schedule(deadline)) => deadlines.push(Reverse(deadline)),
            Ok(SchedulerMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = shared.clock.now_ms();
        while deadlines.peek().is_some_and(|Reverse(d)| d.due_ms <= now) {
            if let Some(Reverse(deadline)) = deadlines.pop() {
                shared.complete(&deadline.process, Some(deadline.seq));
            }
        }
    }
    tracing::debug!(pending = deadlines.len(), "crafting scheduler stopped");
    let _ = done_tx.send(());
}

/// Scheduler thread handles, taken on shutdown.
struct Worker {
    tx: mpsc::Sender<SchedulerMsg>,
    done_rx: mpsc::Receiver<()>,
    handle: JoinHandle<()>,
}

/// Runs player crafts against shared ledgers.
pub struct CraftingEngine {
    shared: Arc<EngineShared>,
    worker: Mutex<Option<Worker>>,
    /// No scheduler thread; timed crafts finish only through
    /// [`CraftingEngine::run_due_completions`].
    manual: bool,
}

impl std::fmt::Debug for CraftingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CraftingEngine")
            .field("active", &lock(&self.shared.processes).len())
            .field("accepting", &self.shared.accepting.load(Ordering::SeqCst))
            .finish()
    }
}

impl CraftingEngine {
    fn shared_state(clock: SharedClock, config: &CraftingConfig) -> Arc<EngineShared> {
        Arc::new(EngineShared {
            clock,
            config: config.clone(),
            processes: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            accepting: AtomicBool::new(true),
            next_seq: AtomicU64::new(0),
        })
    }

    /// Start the engine and its scheduler thread.
    pub fn new(clock: SharedClock, config: &CraftingConfig) -> std::io::Result<Self> {
        let shared = Self::shared_state(clock, config);
        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("gearworks-crafting".to_string())
            .spawn(move || run_scheduler(worker_shared, rx, done_tx))?;
        Ok(Self {
            shared,
            worker: Mutex::new(Some(Worker {
                tx,
                done_rx,
                handle,
            })),
            manual: false,
        })
    }

    /// An engine without a scheduler thread, for headless drivers that step
    /// time themselves.
    pub fn manual(clock: SharedClock, config: &CraftingConfig) -> Self {
        Self {
            shared: Self::shared_state(clock, config),
            worker: Mutex::new(None),
            manual: true,
        }
    }

    pub fn add_crafting_listener(&self, listener: Arc<dyn CraftingListener>) {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// True iff the ledger holds every ingredient and has room for every
    /// result.
    pub fn can_craft(&self, recipe: &Recipe, ledger: &Ledger) -> bool {
        ledger.has_space(recipe.result_count()) && ledger.has_all(&recipe.ingredients)
    }

    /// Begin a craft. Returns false, after notifying listeners, if the craft
    /// could not start. Never panics; internal faults become
    /// [`CraftFailure::Internal`], and listener panics are logged without
    /// affecting the result.
    pub fn start_crafting(
        &self,
        recipe: &Arc<Recipe>,
        ledger: &SharedLedger,
        process: impl Into<ProcessId>,
    ) -> bool {
        let process = process.into();
        let seq_floor = self.shared.next_seq.load(Ordering::Relaxed);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if recipe.instant {
                self.craft_instant(recipe, ledger, &process)
            } else {
                self.schedule_timed(recipe, ledger, &process)
            }
        }))
        .unwrap_or_else(|panic| {
            self.discard_started(&process, seq_floor);
            Err(CraftFailure::Internal(panic_message(&*panic)))
        });

        match outcome {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(process = %process, recipe = %recipe.name, %reason, "craft rejected");
                self.shared.notify_failed(&process, recipe, &reason);
                false
            }
        }
    }

    /// Undo a timed craft this call already registered.
    fn discard_started(&self, process: &ProcessId, seq_floor: u64) {
        let removed = {
            let mut processes = lock(&self.shared.processes);
            match processes.get(process) {
                Some(p) if p.seq >= seq_floor => processes.remove(process),
                _ => None,
            }
        };
        if let Some(p) = removed {
            refund(&p.ledger, &p.reserved);
        }
    }

    fn check_craftable(&self, recipe: &Recipe, ledger: &Ledger) -> Result<(), CraftFailure> {
        if !ledger.has_all(&recipe.ingredients) {
            return Err(CraftFailure::MissingIngredients {
                recipe: recipe.name.clone(),
            });
        }
        if !ledger.has_space(recipe.result_count()) {
            return Err(CraftFailure::NoSpace {
                recipe: recipe.name.clone(),
            });
        }
        Ok(())
    }

    fn craft_instant(
        &self,
        recipe: &Arc<Recipe>,
        ledger: &SharedLedger,
        process: &ProcessId,
    ) -> Result<(), CraftFailure> {
        self.check_craftable(recipe, ledger)?;
        if !ledger.remove_all(&recipe.ingredients) {
            return Err(CraftFailure::MissingIngredients {
                recipe: recipe.name.clone(),
            });
        }
        if !add_all(ledger, &recipe.results) {
            refund(ledger, &recipe.ingredients);
            return Err(CraftFailure::NoSpace {
                recipe: recipe.name.clone(),
            });
        }
        tracing::info!(process = %process, recipe = %recipe.name, "instant craft completed");
        self.shared.notify_completed(process, recipe);
        Ok(())
    }

    fn schedule_timed(
        &self,
        recipe: &Arc<Recipe>,
        ledger: &SharedLedger,
        process: &ProcessId,
    ) -> Result<(), CraftFailure> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(CraftFailure::ShutDown);
        }
        self.check_craftable(recipe, ledger)?;

        let started_ms = self.shared.clock.now_ms();
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let record = CraftingProcess {
            recipe: Arc::clone(recipe),
            ledger: Arc::clone(ledger),
            started_ms,
            duration_ms: recipe.crafting_time_ms,
            reserved: recipe.ingredients.clone(),
            seq,
        };
        let deadline = Deadline {
            due_ms: record.due_ms(),
            seq,
            process: process.clone(),
        };

        {
            let mut processes = lock(&self.shared.processes);
            if processes.contains_key(process) {
                return Err(CraftFailure::DuplicateProcess(process.clone()));
            }
            // Reservation is atomic on the ledger; a concurrent mutation
            // since the check above simply fails it with nothing removed.
            if !ledger.remove_all(&recipe.ingredients) {
                return Err(CraftFailure::MissingIngredients {
                    recipe: recipe.name.clone(),
                });
            }
            processes.insert(process.clone(), record);
        }

        let sent = match lock(&self.worker).as_ref() {
            Some(worker) => worker.tx.send(SchedulerMsg::Schedule(deadline)).is_ok(),
            None => self.manual,
        };
        if !sent {
            if lock(&self.shared.processes).remove(process).is_some() {
                refund(ledger, &recipe.ingredients);
            }
            return Err(CraftFailure::SchedulerUnavailable);
        }

        tracing::debug!(
            process = %process,
            recipe = %recipe.name,
            due_ms = started_ms.saturating_add(recipe.crafting_time_ms),
            "craft scheduled"
        );
        self.shared.notify_started(process, recipe);
        Ok(())
    }

    /// Complete every timed craft whose deadline has passed, on the calling
    /// thread. Returns how many were completed here.
    pub fn run_due_completions(&self) -> usize {
        let now = self.shared.clock.now_ms();
        let mut due: Vec<(Millis, ProcessId)> = lock(&self.shared.processes)
            .iter()
            .filter(|(_, p)| p.due_ms() <= now)
            .map(|(id, p)| (p.due_ms(), id.clone()))
            .collect();
        due.sort();
        due.into_iter()
            .filter(|(_, id)| self.shared.complete(id, None))
            .count()
    }

    /// Elapsed fraction of a timed craft in `[0, 1]`. Unknown ids (never
    /// started, already finished, or abandoned) report 1.0, which callers
    /// read as "nothing left to show".
    pub fn crafting_progress(&self, process: &ProcessId) -> f64 {
        let now = self.shared.clock.now_ms();
        lock(&self.shared.processes)
            .get(process)
            .map_or(1.0, |p| p.progress(now))
    }

    pub fn is_crafting(&self, process: &ProcessId) -> bool {
        lock(&self.shared.processes).contains_key(process)
    }

    /// Ids of timed crafts still in flight, sorted.
    pub fn active_processes(&self) -> Vec<ProcessId> {
        let mut ids: Vec<ProcessId> = lock(&self.shared.processes).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting timed crafts, abandon the ones in flight (no refund,
    /// no callbacks) and wait up to `shutdown_timeout_ms` for the scheduler
    /// thread to exit. Instant crafts keep working. Idempotent.
    ///
    /// A completion the scheduler had already passed the shutdown check for
    /// still delivers its results and callbacks, possibly after this call
    /// has started.
    pub fn shutdown(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        let abandoned = {
            let mut processes = lock(&self.shared.processes);
            let n = processes.len();
            processes.clear();
            n
        };
        if abandoned > 0 {
            tracing::warn!(abandoned, "crafting engine shut down with crafts in flight");
        }

        let Some(worker) = lock(&self.worker).take() else {
            return;
        };
        let _ = worker.tx.send(SchedulerMsg::Stop);
        let timeout = Duration::from_millis(self.shared.config.shutdown_timeout_ms);
        match worker.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    tracing::warn!("crafting scheduler thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = self.shared.config.shutdown_timeout_ms,
                    "crafting scheduler did not stop in time; detaching"
                );
            }
        }
    }
}

impl Drop for CraftingEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
