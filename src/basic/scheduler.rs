//! Cooperative scheduler for logical threads
//!
//! Every tick gives each thread at most one statement, in spawn order.
//! Blocked threads are skipped until the library reports their block as
//! resolved. Event handlers become new threads at the start of a tick.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::basic::error::Result;
use crate::basic::interpreter::{LogicalThread, Runtime, Step};

/// What one tick did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Some thread ran, spawned or was unblocked
    pub progressed: bool,
    /// Nothing is left to run and nothing can start another thread
    pub finished: bool,
}

pub struct Scheduler {
    runtime: Runtime,
    threads: Vec<LogicalThread>,
    next_id: usize,
    ended: bool,
}

impl Scheduler {
    /// Scheduler with the main thread at the first statement
    pub fn new(runtime: Runtime) -> Self {
        let mut scheduler = Self {
            runtime,
            threads: Vec::new(),
            next_id: 0,
            ended: false,
        };
        if !scheduler.runtime.program.is_empty() {
            scheduler.spawn(0);
        }
        scheduler
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Start a thread at statement `start`
    pub fn spawn(&mut self, start: usize) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        debug!(thread = id, start, "spawn thread");
        self.threads.push(LogicalThread::new(id, &self.runtime, start));
        id
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn threads(&self) -> &[LogicalThread] {
        &self.threads
    }

    pub fn is_finished(&self) -> bool {
        self.ended || (self.threads.is_empty() && !self.runtime.library.borrow().has_live_events())
    }

    /// One scheduling pass at time `now`
    pub fn tick(&mut self, now: Instant) -> Result<TickReport> {
        let mut report = TickReport::default();
        if self.ended {
            report.finished = true;
            return Ok(report);
        }

        let due = {
            let mut library = self.runtime.library.borrow_mut();
            library.set_now(now);
            library.due_events(now)
        };
        for start in due {
            debug!(start, "event fired");
            self.spawn(start);
            report.progressed = true;
        }

        for thread in self.threads.iter_mut() {
            if let Some(block) = thread.blocked() {
                if !self.runtime.library.borrow_mut().is_resolved(&block, now) {
                    continue;
                }
                debug!(thread = thread.id(), ?block, "resume thread");
                thread.unblock();
            }

            match thread.step()? {
                Step::Ran => trace!(thread = thread.id(), ip = thread.ip(), "stepped"),
                Step::Blocked(block) => debug!(thread = thread.id(), ?block, "thread blocked"),
                Step::Finished => debug!(thread = thread.id(), "thread finished"),
            }
            report.progressed = true;

            if self.runtime.library.borrow().end_requested() {
                debug!("program end requested");
                self.ended = true;
                break;
            }
        }

        if self.ended {
            self.threads.clear();
        } else {
            self.threads.retain(|t| !t.is_finished());
        }
        report.finished = self.is_finished();
        Ok(report)
    }

    /// Tick until finished. A pass that makes no progress is followed by a
    /// sleep of at most `idle`, cut short by the next due event.
    /// `clock` supplies the time of each tick.
    pub fn run_to_completion(
        &mut self,
        mut clock: impl FnMut() -> Instant,
        idle: Duration,
    ) -> Result<()> {
        loop {
            let now = clock();
            let report = self.tick(now)?;
            if report.finished {
                return Ok(());
            }
            if !report.progressed {
                let wait = match self.runtime.library.borrow().next_event_due() {
                    Some(due) => due.saturating_duration_since(now).min(idle),
                    None => idle,
                };
                thread::sleep(wait);
            }
        }
    }
}
