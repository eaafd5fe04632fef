//! Per-id call coalescing.
//!
//! The first caller for an id becomes the leader and runs the operation;
//! callers arriving while it is in flight block until it finishes and
//! receive a clone of its result.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

pub(crate) struct FlightGroup<T> {
    calls: Mutex<HashMap<String, Arc<Call<T>>>>,
}

struct Call<T> {
    state: Mutex<State<T>>,
    done: Condvar,
}

enum State<T> {
    Running,
    Done(T),
    /// The leader unwound without producing a result.
    Abandoned,
}

impl<T: Clone> FlightGroup<T> {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `op` for `id`, or joins the call already in flight for it.
    pub(crate) fn run<F>(&self, id: &str, op: F) -> T
    where
        F: FnOnce() -> T,
    {
        let joined = {
            let mut calls = lock(&self.calls);
            match calls.get(id) {
                Some(call) => Some(Arc::clone(call)),
                None => {
                    calls.insert(id.to_string(), Arc::new(Call::new()));
                    None
                }
            }
        };

        if let Some(call) = joined {
            return match call.wait() {
                Some(result) => result,
                None => op(),
            };
        }

        let leader = Leader {
            group: self,
            id,
            result: None,
        };
        leader.finish(op())
    }

    fn complete(&self, id: &str, result: Option<T>) {
        let Some(call) = lock(&self.calls).remove(id) else {
            return;
        };
        *lock(&call.state) = match result {
            Some(result) => State::Done(result),
            None => State::Abandoned,
        };
        call.done.notify_all();
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl<T: Clone> Call<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Running),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Option<T> {
        let state = self
            .done
            .wait_while(lock(&self.state), |s| matches!(s, State::Running))
            .unwrap_or_else(PoisonError::into_inner);
        match &*state {
            State::Done(result) => Some(result.clone()),
            State::Running | State::Abandoned => None,
        }
    }
}

/// Publishes the leader's result, or releases waiters if the leader panics.
struct Leader<'a, T: Clone> {
    group: &'a FlightGroup<T>,
    id: &'a str,
    result: Option<T>,
}

impl<T: Clone> Leader<'_, T> {
    fn finish(mut self, result: T) -> T {
        self.result = Some(result.clone());
        result
    }
}

impl<T: Clone> Drop for Leader<'_, T> {
    fn drop(&mut self) {
        self.group.complete(self.id, self.result.take());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
