//! Monotonic time source
//!
//! All scheduling in this crate runs on a free-running 32-bit microsecond
//! counter. The counter wraps after about 71 minutes, so deadlines are always
//! compared with [`is_reached`] rather than with `>=`.

use core::cell::Cell;
use critical_section::Mutex;

/// Microseconds on the monotonic counter
pub type Micros = u32;

/// Monotonic microsecond time source
pub trait Clock {
    fn now_micros(&self) -> Micros;
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now_micros(&self) -> Micros {
        (**self).now_micros()
    }
}

/// Whether `now` has reached `deadline`.
///
/// Valid as long as the two instants are less than half the counter range
/// (about 35 minutes) apart.
#[inline]
pub fn is_reached(now: Micros, deadline: Micros) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// Microseconds elapsed from `since` to `now`, across wraparound
#[inline]
pub fn elapsed(since: Micros, now: Micros) -> Micros {
    now.wrapping_sub(since)
}

/// Software clock advanced from a periodic timer interrupt.
///
/// The counter is 32 bits wide, which the AVR core cannot read in one
/// instruction, so both the interrupt and the readers go through a
/// critical section.
pub struct TickClock {
    micros: Mutex<Cell<Micros>>,
    step_us: Micros,
}

impl TickClock {
    /// Create a clock advanced by `step_us` on every tick
    pub const fn new(step_us: Micros) -> Self {
        Self {
            micros: Mutex::new(Cell::new(0)),
            step_us,
        }
    }

    /// Advance the clock. Called from the timer overflow interrupt.
    #[inline]
    pub fn tick(&self) {
        critical_section::with(|cs| {
            let micros = self.micros.borrow(cs);
            micros.set(micros.get().wrapping_add(self.step_us));
        });
    }
}

impl Clock for TickClock {
    fn now_micros(&self) -> Micros {
        critical_section::with(|cs| self.micros.borrow(cs).get())
    }
}
