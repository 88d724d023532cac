//! Drive base firmware for small wheeled robots
//!
//! A cooperative scheduler runs three periodic tasks that share one CPU:
//!
//! - [`Odometry`](motion::Odometry) integrates quadrature encoder ticks into
//!   the robot pose,
//! - [`Propulsion`](motion::Propulsion) tracks wheel speed references with
//!   one PI loop per wheel,
//! - [`SpeedProfiler`](motion::SpeedProfiler) feeds propulsion with
//!   trapezoidal speed profiles.
//!
//! Encoder ticks are counted from pin-change interrupts. Everything else runs
//! on the scheduler's single thread of control, and components that depend on
//! each other are shared through `RefCell`s.
//!
//! The board crate provides the pins (through `embedded-hal` 0.2), the edge
//! interrupt routing and the microsecond clock, and installs a `log` backend.
#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod motion;
pub mod rtos;

pub use error::Error;
