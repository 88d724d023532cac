//! Cooperative periodic task scheduler
//!
//! Tasks are plain [`Task`] implementations shared through a `RefCell`, so the
//! same component can be registered here and still be read by the tasks that
//! depend on it. Dispatch happens in registration order, one task body at a
//! time, with no priorities and no preemption.

use core::cell::RefCell;
use log::{debug, warn};

use super::task::{Task, TaskId};
use crate::config::{MAX_CHRONOS, MAX_TASKS};
use crate::error::Error;
use crate::hal::{is_reached, Clock, Micros};

#[derive(Clone, Copy)]
struct Entry<'a> {
    task: &'a RefCell<dyn Task + 'a>,
    period: Micros,
    next_run: Micros,
    running: bool,
}

#[derive(Clone, Copy, Default)]
struct Chrono {
    expires_at: Micros,
    active: bool,
}

pub struct Scheduler<'a, C> {
    clock: C,
    tasks: [Option<Entry<'a>>; MAX_TASKS],
    task_count: usize,
    chronos: [Chrono; MAX_CHRONOS],
}

impl<'a, C: Clock> Scheduler<'a, C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            tasks: [None; MAX_TASKS],
            task_count: 0,
            chronos: [Chrono::default(); MAX_CHRONOS],
        }
    }

    /// Register a task running every `period` microseconds.
    ///
    /// The task is started and due immediately.
    pub fn register(
        &mut self,
        task: &'a RefCell<dyn Task + 'a>,
        period: Micros,
    ) -> Result<TaskId, Error> {
        if self.task_count >= MAX_TASKS {
            warn!("task list full ({} tasks)", MAX_TASKS);
            return Err(Error::CapacityExceeded);
        }

        let id = TaskId(self.task_count);
        self.tasks[id.0] = Some(Entry {
            task,
            period,
            next_run: self.clock.now_micros(),
            running: true,
        });
        self.task_count += 1;
        debug!("task {} registered, period {} us", id.0, period);
        Ok(id)
    }

    /// Run every task that is due, in registration order
    pub fn tick(&mut self) {
        for slot in self.tasks[..self.task_count].iter_mut() {
            let Some(entry) = slot else { continue };
            if !entry.running {
                continue;
            }

            let now = self.clock.now_micros();
            if !is_reached(now, entry.next_run) {
                continue;
            }

            match entry.task.try_borrow_mut() {
                Ok(mut task) => {
                    task.run(now);
                    entry.next_run = now.wrapping_add(entry.period);
                }
                // Only possible when tick() is re-entered from a task body
                Err(_) => warn!("task busy, dispatch skipped"),
            }
        }
    }

    /// Dispatch tasks forever. This is the firmware's main loop.
    pub fn run(&mut self) -> ! {
        loop {
            self.tick();
        }
    }

    /// Resume a task; it becomes due immediately
    pub fn start_task(&mut self, id: TaskId) -> Result<(), Error> {
        let now = self.clock.now_micros();
        let entry = self.entry_mut(id)?;
        entry.running = true;
        entry.next_run = now;
        Ok(())
    }

    /// Suspend a task. A body already running is never interrupted.
    pub fn stop_task(&mut self, id: TaskId) -> Result<(), Error> {
        self.entry_mut(id)?.running = false;
        Ok(())
    }

    /// Change a task's period, effective from its next dispatch
    pub fn set_period(&mut self, id: TaskId, period: Micros) -> Result<(), Error> {
        self.entry_mut(id)?.period = period;
        Ok(())
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        matches!(self.tasks.get(id.0), Some(Some(entry)) if entry.running)
    }

    pub fn period(&self, id: TaskId) -> Option<Micros> {
        match self.tasks.get(id.0) {
            Some(Some(entry)) => Some(entry.period),
            _ => None,
        }
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    /// Arm a free chrono expiring `duration` microseconds from now
    pub fn start_chrono(&mut self, duration: Micros) -> Result<usize, Error> {
        let now = self.clock.now_micros();
        match self.chronos.iter().position(|chrono| !chrono.active) {
            Some(idx) => {
                self.chronos[idx] = Chrono {
                    expires_at: now.wrapping_add(duration),
                    active: true,
                };
                Ok(idx)
            }
            None => {
                warn!("no chrono available");
                Err(Error::CapacityExceeded)
            }
        }
    }

    /// Whether a chrono's expiry has passed. An out of range index reads as elapsed.
    pub fn has_elapsed(&self, idx: usize) -> bool {
        match self.chronos.get(idx) {
            Some(chrono) => is_reached(self.clock.now_micros(), chrono.expires_at),
            None => true,
        }
    }

    /// Release a chrono
    pub fn reset_chrono(&mut self, idx: usize) -> Result<(), Error> {
        let chrono = self.chronos.get_mut(idx).ok_or(Error::InvalidIndex)?;
        if !chrono.active {
            return Err(Error::ChronoInactive);
        }
        chrono.active = false;
        Ok(())
    }

    /// Release every chrono
    pub fn clear_chronos(&mut self) {
        for chrono in self.chronos.iter_mut() {
            chrono.active = false;
        }
    }

    pub fn active_chronos(&self) -> usize {
        self.chronos.iter().filter(|chrono| chrono.active).count()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn entry_mut(&mut self, id: TaskId) -> Result<&mut Entry<'a>, Error> {
        match self.tasks.get_mut(id.0) {
            Some(Some(entry)) => Ok(entry),
            _ => Err(Error::InvalidIndex),
        }
    }
}
