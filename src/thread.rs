//! Periodic worker thread.
//!
//! A [`TickThread`] owns one OS thread that calls [`Tick::tick`] in a loop,
//! sleeping between calls, until the tick returns `false` or a stop is
//! requested.
//!
//! # State machine
//!
//! ```text
//! Stopped ──start──▶ Init ──thread──▶ Running ──tick=false / stop──▶ Finished ──join──▶ Stopped
//! ```
//!
//! The tick context is moved onto the thread while it runs and handed back
//! when the thread is joined, so a stopped worker can be restarted.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::ThreadError;

/// Lifecycle state of a [`TickThread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Not started, or joined.
    Stopped = 0,
    /// Thread spawned, not yet inside the loop.
    Init = 1,
    /// Inside the tick loop.
    Running = 2,
    /// Left the loop, waiting to be joined.
    Finished = 3,
}

impl ThreadState {
    /// Check if this state counts as running from the outside.
    #[inline]
    pub const fn is_running(&self) -> bool {
        matches!(self, ThreadState::Init | ThreadState::Running)
    }
}

/// Why the tick loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The tick returned `false`.
    Completed,
    /// A stop was requested.
    Stopped,
    /// The tick panicked.
    Panicked,
}

/// Work driven by a [`TickThread`].
pub trait Tick: Send + 'static {
    /// Runs on the worker thread right after it enters the running state.
    fn on_start(&mut self, _lock: &TickLock) {}

    /// One unit of work. Return `false` to finish the worker.
    fn tick(&mut self, lock: &TickLock) -> bool;

    /// Runs on the worker thread after the last tick.
    fn on_exit(&mut self, _exit: Exit) {}
}

struct Control {
    state: ThreadState,
    run: bool,
}

struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
}

/// Handle to a worker's mutex, shared between the tick and outside code.
#[derive(Clone)]
pub struct TickLock {
    shared: Arc<Shared>,
}

/// Held lock of a [`TickLock`]. Tick loop bookkeeping waits while it is held.
pub struct TickGuard<'a> {
    control: MutexGuard<'a, Control>,
}

impl TickGuard<'_> {
    pub fn state(&self) -> ThreadState {
        self.control.state
    }

    pub fn run_requested(&self) -> bool {
        self.control.run
    }
}

impl TickLock {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: ThreadState::Stopped,
                    run: false,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    /// Takes the worker's mutex.
    pub fn lock(&self) -> TickGuard<'_> {
        TickGuard {
            control: self.shared.control.lock(),
        }
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.shared.control.lock().state
    }

    /// True until a stop has been requested.
    #[inline]
    pub fn should_run(&self) -> bool {
        self.shared.control.lock().run
    }

    fn set_state(&self, state: ThreadState) {
        self.shared.control.lock().state = state;
    }

    fn request_stop(&self) {
        let mut control = self.shared.control.lock();
        control.run = false;
        self.shared.wake.notify_all();
    }

    /// Sleeps up to `period`, returning early when a stop is requested.
    pub(crate) fn pause(&self, period: Duration) {
        if period.is_zero() {
            return;
        }
        let mut control = self.shared.control.lock();
        if control.run {
            self.shared.wake.wait_for(&mut control, period);
        }
    }
}

/// A periodic worker owning one OS thread.
pub struct TickThread<T: Tick> {
    name: String,
    sleep: Duration,
    lock: TickLock,
    task: Option<T>,
    handle: Option<JoinHandle<Option<T>>>,
}

impl<T: Tick> TickThread<T> {
    /// Creates a stopped worker. Nothing runs until [`start`](Self::start).
    pub fn new(name: impl Into<String>, task: T, sleep: Duration) -> Self {
        Self {
            name: name.into(),
            sleep,
            lock: TickLock::new(),
            task: Some(task),
            handle: None,
        }
    }

    /// Spawns the thread. A finished worker is joined first; a running one fails.
    pub fn start(&mut self) -> Result<(), ThreadError> {
        if self.is_finished() {
            self.join();
        }
        if self.handle.is_some() {
            return Err(ThreadError::AlreadyRunning { name: self.name.clone() });
        }
        let Some(task) = self.task.take() else {
            return Err(ThreadError::Unavailable { name: self.name.clone() });
        };

        {
            let mut control = self.lock.shared.control.lock();
            control.state = ThreadState::Init;
            control.run = true;
        }

        // The slot lets a failed spawn give the task back.
        let slot = Arc::new(Mutex::new(Some(task)));
        let thread_slot = Arc::clone(&slot);
        let lock = self.lock.clone();
        let sleep = self.sleep;

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let task = thread_slot.lock().take()?;
                Some(run_loop(task, &lock, sleep))
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(source) => {
                self.task = slot.lock().take();
                let mut control = self.lock.shared.control.lock();
                control.state = ThreadState::Stopped;
                control.run = false;
                Err(ThreadError::Spawn {
                    name: self.name.clone(),
                    source,
                })
            }
        }
    }

    /// Asks the loop to exit without waiting for it.
    pub fn request_stop(&self) {
        self.lock.request_stop();
    }

    /// Requests exit and joins. Idempotent.
    ///
    /// Must not be called from inside the tick; there it only requests the stop.
    pub fn stop(&mut self) {
        self.lock.request_stop();
        let on_own_thread = self
            .handle
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id());
        if on_own_thread {
            tracing::warn!(thread = %self.name, "stop() called from inside the tick");
            return;
        }
        self.join();
    }

    /// Waits for the thread to leave the loop and takes the task back.
    ///
    /// Returns false if there was nothing to join.
    pub fn join(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };
        match handle.join() {
            Ok(task) => self.task = task,
            Err(payload) => {
                tracing::error!(
                    thread = %self.name,
                    panic = %panic_message(payload.as_ref()),
                    "worker thread panicked outside its tick"
                );
            }
        }
        self.lock.set_state(ThreadState::Stopped);
        true
    }

    /// Snapshot: `Init` or `Running`.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.lock.state().is_running()
    }

    /// True once the loop has exited and the thread awaits a join.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.lock.state() == ThreadState::Finished
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.lock.state()
    }

    /// The mutex shared with the tick.
    pub fn lock(&self) -> &TickLock {
        &self.lock
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task, while the worker is stopped.
    pub fn task(&self) -> Option<&T> {
        self.task.as_ref()
    }

    /// Stops the worker and moves the task out.
    pub fn take_task(&mut self) -> Option<T> {
        self.stop();
        self.task.take()
    }
}

impl<T: Tick> Drop for TickThread<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<T: Tick>(mut task: T, lock: &TickLock, sleep: Duration) -> T {
    lock.set_state(ThreadState::Running);

    let mut exit = match catch_unwind(AssertUnwindSafe(|| task.on_start(lock))) {
        Ok(()) => None,
        Err(payload) => {
            tracing::error!(panic = %panic_message(payload.as_ref()), "start hook panicked");
            Some(Exit::Panicked)
        }
    };

    while exit.is_none() {
        if !lock.should_run() {
            exit = Some(Exit::Stopped);
            break;
        }
        match catch_unwind(AssertUnwindSafe(|| task.tick(lock))) {
            Ok(true) => lock.pause(sleep),
            Ok(false) => exit = Some(Exit::Completed),
            Err(payload) => {
                tracing::error!(panic = %panic_message(payload.as_ref()), "tick panicked");
                exit = Some(Exit::Panicked);
            }
        }
    }

    let exit = exit.unwrap_or(Exit::Completed);
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task.on_exit(exit))) {
        tracing::error!(panic = %panic_message(payload.as_ref()), "exit hook panicked");
    }

    lock.set_state(ThreadState::Finished);
    task
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
