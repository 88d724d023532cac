//! Hardware capability interface
//!
//! The control code only needs five things from the board: digital output
//! levels, PWM magnitudes, digital input levels, edge interrupts and a
//! monotonic microsecond clock. Everything else lives in the board crate.

pub mod gpio;
pub mod pwm;
pub mod timer;

// Re-export commonly used types
pub use gpio::{read_level, write_level, EdgeInterrupt, InputPin, Level, OutputPin};
pub use pwm::{PwmOutput, PwmPin};
pub use timer::{elapsed, is_reached, Clock, Micros, TickClock};
