//! Quadrature encoder decoding
//!
//! Each channel edge is classified from the committed levels of both
//! channels, giving four counts per encoder cycle. The counter is shared
//! between the pin-change interrupts (writers) and the odometry task
//! (reader). It is 16 bits wide, which the AVR core cannot access
//! atomically, so every access goes through a critical section.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};
use critical_section::Mutex;

use crate::hal::{read_level, EdgeInterrupt, InputPin, Level};

/// Counting direction of an encoder relative to the robot's forward motion.
///
/// Wheels mounted mirrored count in opposite directions for the same motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Normal,
    Reversed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

/// Wrapping 16-bit tick accumulator shared with interrupt context
pub struct TickCounter {
    ticks: Mutex<Cell<u16>>,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    /// Add one signed step
    #[inline]
    pub fn step(&self, forward: bool) {
        critical_section::with(|cs| {
            let ticks = self.ticks.borrow(cs);
            let next = if forward {
                ticks.get().wrapping_add(1)
            } else {
                ticks.get().wrapping_sub(1)
            };
            ticks.set(next);
        });
    }

    /// Read the whole counter at once, never a half-updated value
    #[inline]
    pub fn snapshot(&self) -> u16 {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }

    pub fn reset(&self) {
        critical_section::with(|cs| self.ticks.borrow(cs).set(0));
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-wheel encoder state, usually placed in a `static` so interrupt
/// handlers can reach it.
pub struct Encoder {
    counter: TickCounter,
    enabled: AtomicBool,
    polarity: Polarity,
}

impl Encoder {
    /// Create an enabled encoder at zero ticks
    pub const fn new(polarity: Polarity) -> Self {
        Self {
            counter: TickCounter::new(),
            enabled: AtomicBool::new(true),
            polarity,
        }
    }

    /// Count one edge of `channel`, given both channel levels after the edge.
    ///
    /// Called from interrupt context. Does nothing while counting is disabled.
    pub fn on_edge(&self, channel: Channel, a: Level, b: Level) {
        if !self.is_enabled() {
            return;
        }

        let same = a == b;
        let forward = match channel {
            Channel::A => same,
            Channel::B => !same,
        };
        let forward = match self.polarity {
            Polarity::Normal => forward,
            Polarity::Reversed => !forward,
        };
        self.counter.step(forward);
    }

    /// Raw accumulator value
    #[inline]
    pub fn snapshot(&self) -> u16 {
        self.counter.snapshot()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }
}

/// The two input pins of one encoder, bound to its shared state.
///
/// The board crate keeps this in its interrupt handlers and calls
/// [`on_a_edge`](Self::on_a_edge) / [`on_b_edge`](Self::on_b_edge) from the
/// matching pin-change vectors.
pub struct QuadratureDecoder<'a, A, B> {
    a: A,
    b: B,
    encoder: &'a Encoder,
}

impl<'a, A: InputPin, B: InputPin> QuadratureDecoder<'a, A, B> {
    pub fn new(a: A, b: B, encoder: &'a Encoder) -> Self {
        Self { a, b, encoder }
    }

    /// Route any-edge interrupts of both channels to this decoder
    pub fn listen<IA: EdgeInterrupt, IB: EdgeInterrupt>(&self, irq_a: &mut IA, irq_b: &mut IB) {
        irq_a.enable_any_edge();
        irq_b.enable_any_edge();
    }

    /// Channel A changed level
    pub fn on_a_edge(&self) {
        self.on_edge(Channel::A);
    }

    /// Channel B changed level
    pub fn on_b_edge(&self) {
        self.on_edge(Channel::B);
    }

    pub fn encoder(&self) -> &'a Encoder {
        self.encoder
    }

    /// Give the pins back
    pub fn release(self) -> (A, B) {
        (self.a, self.b)
    }

    fn on_edge(&self, channel: Channel) {
        if !self.encoder.is_enabled() {
            return;
        }
        let a = read_level(&self.a);
        let b = read_level(&self.b);
        self.encoder.on_edge(channel, a, b);
    }
}
