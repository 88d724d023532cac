//! Cooperative scheduling: periodic tasks and one-shot chronos

pub mod scheduler;
pub mod task;

pub use scheduler::Scheduler;
pub use task::{Task, TaskId};
