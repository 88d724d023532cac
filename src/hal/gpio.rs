//! Digital lines and edge interrupts
//!
//! Pin access goes through the `embedded-hal` 0.2 traits so the board support
//! crate (or a mock on the host) can plug in any pin type. Edge interrupt
//! routing is board specific and only exposed as the small [`EdgeInterrupt`]
//! capability.

pub use embedded_hal::digital::v2::{InputPin, OutputPin};

/// Logic level of a digital line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// External interrupt line attached to an input pin
pub trait EdgeInterrupt {
    /// Trigger on both rising and falling edges
    fn enable_any_edge(&mut self);

    /// Mask the interrupt
    fn disable(&mut self);
}

/// Read a pin, treating a read error as a low level.
///
/// AVR port reads cannot fail; the fallback only exists for HALs whose
/// error type is not `Infallible`.
#[inline]
pub fn read_level<P: InputPin>(pin: &P) -> Level {
    Level::from(pin.is_high().unwrap_or(false))
}

/// Drive a pin to the given level, ignoring pin errors
#[inline]
pub fn write_level<P: OutputPin>(pin: &mut P, level: Level) {
    match level {
        Level::High => pin.set_high().ok(),
        Level::Low => pin.set_low().ok(),
    };
}
