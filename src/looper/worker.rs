//! The thread lifecycle a [`super::Looper`] runs its dispatch loop on.
//!
//! Generalizes `BaseThread`'s start/requestExit/requestExitAndWait/join state
//! machine from the original, adapted to keep a real joinable
//! `std::thread::JoinHandle` instead of detaching (the C++ original detaches
//! because it has no RAII-safe joinable handle it can stash on the object
//! cheaply; holding the `JoinHandle` and joining it on shutdown is the
//! idiomatic Rust alternative).

use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::warn;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum State {
    Idle,
    Starting,
    Running,
    Exiting,
}

struct Inner {
    state: State,
    /// Set by `request_exit` independently of `state`, and never cleared
    /// except by a fresh `start`. `state` alone cannot carry this: it is
    /// overwritten wholesale when the just-spawned thread (or the calling
    /// thread, for `run_on_calling_thread`) transitions `Starting ->
    /// Running`, which would otherwise silently drop an exit requested
    /// while still `Starting` and hang `join()` forever.
    exit_requested: bool,
    handle: Option<JoinHandle<()>>,
    /// The id of the thread actually running the loop body: the spawned
    /// worker thread, or the calling thread itself when started with
    /// `run_on_calling_thread = true`. Captured once at start time and never
    /// touched again, so there is no window where a stale id could alias a
    /// later, unrelated thread (a hazard in the original's reuse of a
    /// single mutable `mThreadId` field, read after `mThread.reset()`).
    worker_thread: Option<ThreadId>,
}

/// A start/stop-able background thread running a user-supplied loop body.
///
/// The body is called repeatedly for as long as it returns `true`; returning
/// `false`, or an exit request observed by the body via [`Worker::exit_pending`],
/// ends the loop.
pub struct Worker {
    self_ref: OnceLock<Weak<Worker>>,
    inner: Mutex<Inner>,
    exited: Condvar,
}

impl Worker {
    pub fn new() -> Arc<Worker> {
        let worker = Arc::new(Worker {
            self_ref: OnceLock::new(),
            inner: Mutex::new(Inner {
                state: State::Idle,
                exit_requested: false,
                handle: None,
                worker_thread: None,
            }),
            exited: Condvar::new(),
        });
        let _ = worker.self_ref.set(Arc::downgrade(&worker));
        worker
    }

    fn shared(&self) -> Arc<Worker> {
        self.self_ref
            .get()
            .expect("Worker always constructed via Worker::new")
            .upgrade()
            .expect("Worker dropped while still reachable through &self")
    }

    /// `true` once a thread (spawned or calling) is actively running the
    /// loop body.
    pub fn is_running(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, State::Running)
    }

    /// `true` once `request_exit`/`request_exit_and_wait` has been called and
    /// the loop has not yet observed and honored it.
    pub fn exit_pending(&self) -> bool {
        self.inner.lock().unwrap().exit_requested
    }

    /// `true` if the calling thread is the one currently running this
    /// worker's loop body.
    pub fn is_current_thread(&self) -> bool {
        self.inner.lock().unwrap().worker_thread == Some(thread::current().id())
    }

    /// Start the loop. If `run_on_calling_thread` is `true`, this call itself
    /// becomes the worker: it runs `body` in place and only returns once the
    /// loop exits. Otherwise a named background thread is spawned and this
    /// returns immediately.
    ///
    /// `ready_to_run` is called once, on the worker thread, before the first
    /// call to `body`; a non-OK result aborts the loop without ever calling
    /// `body`. Pass `|| Ok(())` for a worker with no start-up precondition.
    ///
    /// Returns [`Error::AlreadyOperated`] if already started.
    pub fn start(
        &self,
        name: impl Into<String>,
        run_on_calling_thread: bool,
        ready_to_run: impl FnOnce() -> Result<()> + Send + 'static,
        mut body: impl FnMut() -> bool + Send + 'static,
    ) -> Result<()> {
        {
            let mut guard = self.inner.lock().unwrap();
            if guard.state != State::Idle {
                return Err(Error::AlreadyOperated);
            }
            guard.state = State::Starting;
            guard.exit_requested = false;
        }

        if run_on_calling_thread {
            {
                let mut guard = self.inner.lock().unwrap();
                guard.worker_thread = Some(thread::current().id());
                // A `request_exit` landing in the `Starting` window above has
                // already set `exit_requested`; don't paper over it with
                // `Running` here, or `run_loop`'s first check still sees it
                // (via `exit_requested`, not `state`) and exits immediately,
                // but `is_running()`/`exit_pending()` stay honest meanwhile.
                guard.state = if guard.exit_requested {
                    State::Exiting
                } else {
                    State::Running
                };
            }
            let ready_result = ready_to_run();
            if ready_result.is_ok() {
                self.run_loop(&mut body);
            }
            let mut guard = self.inner.lock().unwrap();
            guard.state = State::Idle;
            guard.worker_thread = None;
            self.exited.notify_all();
            return ready_result;
        }

        let this = self.shared();
        let name = name.into();
        let spawn_result = thread::Builder::new().name(name).spawn(move || {
            {
                let mut guard = this.inner.lock().unwrap();
                guard.worker_thread = Some(thread::current().id());
                guard.state = if guard.exit_requested {
                    State::Exiting
                } else {
                    State::Running
                };
            }
            if ready_to_run().is_ok() {
                this.run_loop(&mut body);
            } else {
                warn!("worker thread aborted: ready_to_run returned an error");
            }
            let mut guard = this.inner.lock().unwrap();
            guard.state = State::Idle;
            guard.worker_thread = None;
            this.exited.notify_all();
        });

        match spawn_result {
            Ok(handle) => {
                self.inner.lock().unwrap().handle = Some(handle);
                Ok(())
            }
            Err(_) => {
                let mut guard = self.inner.lock().unwrap();
                guard.state = State::Idle;
                Err(Error::Unknown)
            }
        }
    }

    fn run_loop(&self, body: &mut impl FnMut() -> bool) {
        loop {
            if self.exit_pending() {
                return;
            }
            if !body() {
                return;
            }
        }
    }

    /// Ask the loop to stop at its next iteration boundary. Does not block.
    ///
    /// Sets `exit_requested` unconditionally, even if the worker is still
    /// `Starting` (the just-spawned thread has not yet reached its first
    /// `run_loop` check) or already `Idle`/`Exiting` — see `Inner::exit_requested`.
    pub fn request_exit(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.exit_requested = true;
        if matches!(guard.state, State::Running | State::Starting) {
            guard.state = State::Exiting;
        }
    }

    /// Ask the loop to stop and block until it has.
    ///
    /// Returns [`Error::WouldBlock`] instead of deadlocking if called from
    /// the worker's own thread (e.g. from inside a `Handler` callback
    /// dispatched by this very loop).
    pub fn request_exit_and_wait(&self) -> Result<()> {
        {
            let guard = self.inner.lock().unwrap();
            if guard.worker_thread == Some(thread::current().id()) {
                return Err(Error::WouldBlock);
            }
        }
        self.request_exit();
        self.join()
    }

    /// Block until the loop has exited, without requesting it.
    ///
    /// Returns [`Error::WouldBlock`] instead of deadlocking if called from
    /// the worker's own thread.
    pub fn join(&self) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        if guard.worker_thread == Some(thread::current().id()) {
            return Err(Error::WouldBlock);
        }
        while guard.state != State::Idle {
            guard = self.exited.wait(guard).unwrap();
        }
        if let Some(handle) = guard.handle.take() {
            drop(guard);
            let _ = handle.join();
        }
        Ok(())
    }
}
