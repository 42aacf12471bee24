//! Persistent worker pool for fixed-fan-out parallel jobs.
//!
//! A [`ParallelJobRunner`] with `thread_count` N executes task arrays of
//! exactly N closures: the calling thread runs task 0 itself while N-1
//! persistent worker threads run tasks 1..N. Workers are spawned lazily on
//! the first [`execute`](ParallelJobRunner::execute) and are never torn
//! down; an idle pool costs nothing but parked threads.
//!
//! ## Handshake
//!
//! Each invocation increments a generation counter guarded by a mutex.
//! Workers wait for the counter to pass their last seen generation in two
//! phases: a bounded [`spin_loop`](std::hint::spin_loop) poll on the
//! atomic counter first (covering the common case of back-to-back
//! invocations with sub-microsecond wake latency), then a condvar wait on
//! the same guarded counter. Publishing the counter under the mutex before
//! notifying makes the signal impossible to miss regardless of which
//! phase a worker is in.
//!
//! On completion each worker increments a finished counter; the worker
//! that observes the last increment raises the completion event the caller
//! blocks on. The caller clears the task slot before returning, so task
//! borrows never outlive `execute`.
//!
//! `execute` is not reentrant and a single runner serves one invocation at
//! a time; violating this panics.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Once};
use std::thread;

use log::debug;

/// Iterations of atomic polling before a waiting worker falls back to
/// blocking on the condvar.
const SPIN_LIMIT: u32 = 10_000;

/// Generation-counted start signal with a spin phase and a blocking phase.
struct StartGate {
    counter: AtomicU64,
    sequence: Mutex<u64>,
    condvar: Condvar,
}

impl StartGate {
    fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            sequence: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    /// Advances the generation and wakes all waiters.
    fn open(&self) {
        let mut sequence = self.sequence.lock().unwrap();
        *sequence += 1;
        self.counter.store(*sequence, Ordering::Release);
        self.condvar.notify_all();
    }

    /// Blocks until the generation exceeds `seen`.
    fn wait_past(&self, seen: u64) {
        for _ in 0..SPIN_LIMIT {
            if self.counter.load(Ordering::Acquire) > seen {
                return;
            }
            std::hint::spin_loop();
        }
        let mut sequence = self.sequence.lock().unwrap();
        while *sequence <= seen {
            sequence = self.condvar.wait(sequence).unwrap();
        }
    }
}

/// Manual-reset completion event.
struct Event {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl Event {
    fn new() -> Self {
        Self { flag: Mutex::new(false), condvar: Condvar::new() }
    }

    fn set(&self) {
        *self.flag.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    fn reset(&self) {
        *self.flag.lock().unwrap() = false;
    }

    fn wait(&self) {
        let mut flag = self.flag.lock().unwrap();
        while !*flag {
            flag = self.condvar.wait(flag).unwrap();
        }
    }
}

type TaskList = Option<&'static [&'static (dyn Fn() + Sync)]>;

/// Task slot shared with workers. Written only while workers are provably
/// idle (before the gate opens / after the completion event), which is
/// what makes the interior mutability sound.
struct TaskCell(UnsafeCell<TaskList>);

unsafe impl Sync for TaskCell {}

struct RunnerShared {
    gate: StartGate,
    finished: Event,
    finished_workers: AtomicUsize,
    tasks: TaskCell,
}

/// Fixed-size pool executing one task per thread, caller included.
pub struct ParallelJobRunner {
    thread_count: usize,
    shared: Arc<RunnerShared>,
    start_workers: Once,
    busy: AtomicBool,
}

impl ParallelJobRunner {
    /// Creates a runner executing `thread_count` tasks per invocation
    /// (`thread_count - 1` workers plus the caller). Workers are spawned
    /// on first use.
    pub fn new(thread_count: usize) -> Self {
        assert!(thread_count >= 1, "runner needs at least the caller thread");
        Self {
            thread_count,
            shared: Arc::new(RunnerShared {
                gate: StartGate::new(),
                finished: Event::new(),
                finished_workers: AtomicUsize::new(0),
                tasks: TaskCell(UnsafeCell::new(None)),
            }),
            start_workers: Once::new(),
            busy: AtomicBool::new(false),
        }
    }

    /// Creates a runner sized to the logical CPU count.
    pub fn with_available_parallelism() -> Self {
        let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::new(threads)
    }

    /// Number of tasks per invocation.
    #[inline]
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    fn spawn_workers(&self) {
        self.start_workers.call_once(|| {
            let worker_count = self.thread_count - 1;
            for task_index in 1..self.thread_count {
                let shared = Arc::clone(&self.shared);
                thread::Builder::new()
                    .name(format!("job-worker-{task_index}"))
                    .spawn(move || worker_loop(shared, task_index, worker_count))
                    .expect("failed to spawn job worker thread");
            }
            debug!("spawned {worker_count} parallel job workers");
        });
    }

    /// Runs all `tasks`, task 0 on the calling thread and the rest on the
    /// pool, and blocks until every task has returned.
    ///
    /// `tasks.len()` must equal [`thread_count`](Self::thread_count).
    /// Panics when called while another invocation is in flight, including
    /// from inside one of its own tasks.
    pub fn execute(&self, tasks: &[&(dyn Fn() + Sync)]) {
        assert_eq!(
            tasks.len(),
            self.thread_count,
            "task count must equal the runner thread count"
        );
        if self.busy.swap(true, Ordering::AcqRel) {
            panic!("ParallelJobRunner::execute is not reentrant");
        }
        if self.thread_count == 1 {
            tasks[0]();
            self.busy.store(false, Ordering::Release);
            return;
        }
        self.spawn_workers();

        self.shared.finished_workers.store(0, Ordering::Release);
        // SAFETY: the slot is read by workers only between gate.open() and
        // their finished increment, and this call blocks on the completion
        // event before clearing the slot and returning, so the 'static
        // lifetimes are never actually relied on past this borrow.
        unsafe {
            *self.shared.tasks.0.get() = Some(std::mem::transmute::<
                &[&(dyn Fn() + Sync)],
                &'static [&'static (dyn Fn() + Sync)],
            >(tasks));
        }
        self.shared.gate.open();

        tasks[0]();

        self.shared.finished.wait();
        self.shared.finished.reset();
        // SAFETY: all workers have passed their finished increment, none
        // reads the slot again before the next gate.open().
        unsafe {
            *self.shared.tasks.0.get() = None;
        }
        self.busy.store(false, Ordering::Release);
    }
}

fn worker_loop(shared: Arc<RunnerShared>, task_index: usize, worker_count: usize) {
    let mut seen = 0u64;
    loop {
        shared.gate.wait_past(seen);
        seen += 1;
        // SAFETY: the caller installed the slot before opening the gate
        // and does not touch it until the completion event is raised.
        let tasks = unsafe { (*shared.tasks.0.get()).expect("task slot set before gate opens") };
        (tasks[task_index])();
        let finished = shared.finished_workers.fetch_add(1, Ordering::AcqRel) + 1;
        if finished == worker_count {
            shared.finished.set();
        }
    }
}
