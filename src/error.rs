//! Error classes shared by the scheduler and the motion stack

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The task list or the chrono pool is full
    CapacityExceeded,
    /// A profile is already being followed
    AlreadyInProgress,
    /// Index outside of the chrono pool or outside of the drivetrain's wheels
    InvalidIndex,
    /// The chrono exists but was not running, so there was nothing to reset
    ChronoInactive,
    /// A per-wheel setting was given for a different number of wheels
    WheelMismatch,
    /// A shared component was already borrowed by the caller
    Busy,
    /// A profile limit was zero, negative or not finite
    InvalidArgument,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExceeded => f.write_str("capacity exceeded"),
            Error::AlreadyInProgress => f.write_str("a profile is already in progress"),
            Error::InvalidIndex => f.write_str("invalid index"),
            Error::ChronoInactive => f.write_str("chrono was not active"),
            Error::WheelMismatch => f.write_str("wheel count mismatch"),
            Error::Busy => f.write_str("component busy"),
            Error::InvalidArgument => f.write_str("invalid argument"),
        }
    }
}
