//! The scripting runtime's global execution lock.
//!
//! Script code runs only while its thread holds this lock. Host worker
//! threads that call back into the runtime take it too, usually while they
//! already hold a record lock. Anything that may block on a record lock must
//! therefore first give the execution lock up, which is what
//! [`ExecutionLock::allow_threads`] does.

use parking_lot::{Condvar, Mutex};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Reentrant global execution lock.
#[derive(Debug, Default)]
pub struct ExecutionLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ExecutionLock {
    /// Creates an unheld lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for the current thread, blocking while another
    /// thread holds it. Nested acquisition on the owning thread succeeds
    /// immediately.
    pub fn acquire(&self) -> ExecutionGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner == Some(me) {
            state.depth += 1;
        } else {
            while state.owner.is_some() {
                self.released.wait(&mut state);
            }
            state.owner = Some(me);
            state.depth = 1;
        }
        ExecutionGuard { lock: self, _not_send: PhantomData }
    }

    /// True if the current thread holds the lock.
    pub fn is_held(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// True if any thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Runs `f` with the execution lock released.
    ///
    /// If the current thread holds the lock, every recursion level is given
    /// up for the duration of `f` and restored afterwards, including when `f`
    /// unwinds. If the current thread does not hold it, `f` simply runs.
    pub fn allow_threads<T>(&self, f: impl FnOnce() -> T) -> T {
        let depth = {
            let mut state = self.state.lock();
            if state.owner != Some(thread::current().id()) {
                drop(state);
                return f();
            }
            let depth = state.depth;
            state.owner = None;
            state.depth = 0;
            depth
        };
        self.released.notify_all();

        let _reacquire = Reacquire { lock: self, depth };
        f()
    }

    fn release_one(&self) {
        let mut state = self.state.lock();
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
    }
}

/// Proof that the current thread holds the execution lock.
#[must_use = "the lock is released when the guard is dropped"]
pub struct ExecutionGuard<'a> {
    lock: &'a ExecutionLock,
    // Must be released on the acquiring thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_one();
    }
}

struct Reacquire<'a> {
    lock: &'a ExecutionLock,
    depth: usize,
}

impl Drop for Reacquire<'_> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let mut state = self.lock.state.lock();
        while state.owner.is_some() {
            self.lock.released.wait(&mut state);
        }
        state.owner = Some(me);
        state.depth = self.depth;
    }
}
