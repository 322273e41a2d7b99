//! Serializes operations per key.
//!
//! Operations submitted under the same key run one at a time, in submission
//! order. Whoever submits to an idle key drains that key's backlog; submitting
//! to a busy key only enqueues. No lock is held while an operation runs.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::logging::Logger;

type Operation = Box<dyn FnOnce() -> bool + Send>;

#[derive(Default)]
struct KeyQueue {
    pending: VecDeque<Operation>,
    processing: bool,
}

pub struct OperationQueue {
    // lock order: `keys` before any `KeyQueue`
    keys: Mutex<HashMap<String, Arc<Mutex<KeyQueue>>>>,
    log: Logger,
}

impl OperationQueue {
    pub fn new(log: &Logger) -> Self {
        Self {
            keys: Default::default(),
            log: log.scoped("mcholo::queue"),
        }
    }

    /// Returns false only if a panicking operation aborted the drain.
    pub fn submit(&self, key: &str, operation: impl FnOnce() -> bool + Send + 'static) -> bool {
        let queue = {
            let mut keys = self.keys.lock();
            let queue = Arc::clone(keys.entry(key.to_owned()).or_default());
            let mut state = queue.lock();
            state.pending.push_back(Box::new(operation));
            if state.processing {
                return true;
            }
            state.processing = true;
            drop(state);
            queue
        };
        let completed = self.drain(key, &queue);
        self.forget_if_idle(key);
        completed
    }

    fn drain(&self, key: &str, queue: &Mutex<KeyQueue>) -> bool {
        loop {
            let next = {
                let mut state = queue.lock();
                let next = state.pending.pop_front();
                if next.is_none() {
                    state.processing = false;
                }
                next
            };
            let Some(operation) = next else {
                return true;
            };
            match catch_unwind(AssertUnwindSafe(operation)) {
                Ok(true) => {}
                Ok(false) => self.log.debug(format_args!("operation on '{key}' reported failure")),
                Err(_) => {
                    let mut state = queue.lock();
                    let dropped = state.pending.len();
                    state.pending.clear();
                    state.processing = false;
                    self.log.error(format_args!(
                        "operation on '{key}' panicked, dropped {dropped} queued operations"
                    ));
                    return false;
                }
            }
        }
    }

    fn forget_if_idle(&self, key: &str) {
        let mut keys = self.keys.lock();
        let idle = keys.get(key).map_or(false, |queue| {
            let state = queue.lock();
            !state.processing && state.pending.is_empty()
        });
        if idle {
            keys.remove(key);
        }
    }

    pub fn pending_count(&self, key: &str) -> usize {
        self.keys.lock().get(key).map_or(0, |queue| queue.lock().pending.len())
    }

    pub fn is_being_processed(&self, key: &str) -> bool {
        self.keys.lock().get(key).map_or(false, |queue| queue.lock().processing)
    }

    /// Drops operations that have not started yet. A running one finishes.
    pub fn clear(&self, key: &str) {
        let mut keys = self.keys.lock();
        let Some(queue) = keys.get(key) else {
            return;
        };
        let mut state = queue.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        // the active drainer still needs the entry to find its way out
        let processing = state.processing;
        drop(state);
        if !processing {
            keys.remove(key);
        }
        if dropped > 0 {
            self.log.debug(format_args!("cleared {dropped} queued operations for '{key}'"));
        }
    }

    pub fn clear_all(&self) {
        let keys: Vec<String> = self.keys.lock().keys().cloned().collect();
        for key in keys {
            self.clear(&key);
        }
    }
}
