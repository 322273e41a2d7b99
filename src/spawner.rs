//! Paces bulk activation over scheduler ticks.
//!
//! A run activates `batch_size` items per timer invocation instead of all of
//! them in one tick. At most one run is active per spawner.

use std::fmt;
use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::host::Scheduler;
use crate::logging::Logger;
use crate::types::TaskId;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_INTERVAL_TICKS: u32 = 10;

pub trait WorkItem {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}
impl BatchProgress {
    pub fn percentage(&self) -> u32 {
        if self.total == 0 {
            0
        } else {
            (self.processed * 100 / self.total) as u32
        }
    }
}
impl fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}%)", self.processed, self.total, self.percentage())
    }
}

struct Run {
    id: u64,
    task: Option<TaskId>,
    cursor: usize,
    total: usize,
    batch: usize,
    succeeded: usize,
    failed: usize,
}
impl Run {
    fn progress(&self) -> BatchProgress {
        BatchProgress {
            processed: self.cursor,
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }
}

#[derive(Default)]
struct State {
    run: Option<Run>,
    next_id: u64,
}

pub struct BatchSpawner<S: ?Sized + Scheduler> {
    scheduler: Arc<S>,
    state: Arc<Mutex<State>>,
    log: Logger,
}

impl<S: ?Sized + Scheduler> BatchSpawner<S> {
    pub fn new(scheduler: Arc<S>, log: &Logger) -> Self {
        Self {
            scheduler,
            state: Default::default(),
            log: log.scoped("mcholo::spawner"),
        }
    }

    /// Starts activating `items`, `batch_size` per invocation, one
    /// invocation every `interval_ticks`. Zero for either means the default.
    /// Disabled items count as processed without being activated.
    pub fn start<T, F>(&self, items: Vec<T>, batch_size: usize, interval_ticks: u32, mut activate: F) -> Result<()>
    where
        T: WorkItem + Send + 'static,
        F: FnMut(&T) -> Result<()> + Send + 'static,
    {
        let batch = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };
        let interval = if interval_ticks == 0 { DEFAULT_INTERVAL_TICKS } else { interval_ticks };

        let id = {
            let mut state = self.state.lock();
            if let Some(run) = &state.run {
                self.log.warn(format_args!(
                    "batch already in progress at {}, ignoring new request for {} items",
                    run.progress(),
                    items.len()
                ));
                return Err(Error::BatchInProgress);
            }
            if items.is_empty() {
                self.log.info(format_args!("nothing to activate"));
                return Ok(());
            }
            state.next_id += 1;
            let id = state.next_id;
            state.run = Some(Run {
                id,
                task: None,
                cursor: 0,
                total: items.len(),
                batch,
                succeeded: 0,
                failed: 0,
            });
            id
        };
        self.log.info(format_args!(
            "activating {} items, {} every {} ticks",
            items.len(),
            batch,
            interval
        ));

        let state = Arc::clone(&self.state);
        let log = self.log.clone();
        let tick = move || {
            let range = match &state.lock().run {
                Some(run) if run.id == id => run.cursor..(run.cursor + run.batch).min(run.total),
                _ => return ControlFlow::Break(()),
            };
            let (mut succeeded, mut failed) = (0, 0);
            for item in &items[range.clone()] {
                if !item.is_enabled() {
                    log.debug(format_args!("skipping disabled '{}'", item.name()));
                    continue;
                }
                match catch_unwind(AssertUnwindSafe(|| activate(item))) {
                    Ok(Ok(())) => succeeded += 1,
                    Ok(Err(e)) => {
                        failed += 1;
                        log.warn(format_args!("failed to activate '{}': {e}", item.name()));
                    }
                    Err(_) => {
                        failed += 1;
                        log.error(format_args!("activating '{}' panicked", item.name()));
                    }
                }
            }

            let mut state = state.lock();
            // cancelled while this batch was running
            let Some(run) = state.run.as_mut().filter(|run| run.id == id) else {
                return ControlFlow::Break(());
            };
            run.cursor = range.end;
            run.succeeded += succeeded;
            run.failed += failed;
            if run.cursor < run.total {
                return ControlFlow::Continue(());
            }
            if let Some(run) = state.run.take() {
                log.info(format_args!(
                    "batch complete: {} activated, {} failed, {} total",
                    run.succeeded, run.failed, run.total
                ));
            }
            ControlFlow::Break(())
        };

        let task = self.scheduler.run_timer(0, interval, Box::new(tick));
        let mut state = self.state.lock();
        match state.run.as_mut() {
            Some(run) if run.id == id => run.task = Some(task),
            _ => {}
        }
        Ok(())
    }

    pub fn cancel(&self) {
        let Some(run) = self.state.lock().run.take() else {
            return;
        };
        if let Some(task) = run.task {
            self.scheduler.cancel(task);
        }
        self.log.info(format_args!("batch cancelled at {}", run.progress()));
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().run.is_some()
    }

    pub fn progress(&self) -> Option<BatchProgress> {
        self.state.lock().run.as_ref().map(Run::progress)
    }
}
