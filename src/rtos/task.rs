//! Periodic task capability

use crate::hal::Micros;

/// Unit of periodic work.
///
/// `run` is called from the scheduler's single thread of control and must
/// return quickly: nothing else runs until it does.
pub trait Task {
    /// Run one iteration. `now` is the time the scheduler dispatched it.
    fn run(&mut self, now: Micros);
}

impl<F: FnMut(Micros)> Task for F {
    fn run(&mut self, now: Micros) {
        self(now)
    }
}

/// Handle to a registered task, in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub fn index(&self) -> usize {
        self.0
    }
}
