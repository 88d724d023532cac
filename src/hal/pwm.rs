//! PWM outputs driven with an 8-bit magnitude

pub use embedded_hal::PwmPin;

use super::gpio::Level;

/// Largest magnitude accepted by [`PwmOutput::set_magnitude`]
pub const MAX_MAGNITUDE: u8 = u8::MAX;

/// PWM channel addressed with 0-255 magnitudes.
///
/// The maximum duty of the underlying timer is read once at construction and
/// cached for the scaling.
pub struct PwmOutput<P> {
    pin: P,
    max_duty: u16,
}

impl<P: PwmPin<Duty = u16>> PwmOutput<P> {
    /// Enable the channel at 0% duty
    pub fn new(mut pin: P) -> Self {
        pin.enable();
        let max_duty = pin.get_max_duty();
        pin.set_duty(0);
        Self { pin, max_duty }
    }

    /// Set the duty cycle as a fraction `magnitude / 255` of the period
    pub fn set_magnitude(&mut self, magnitude: u8) {
        self.pin.set_duty(scale_duty(magnitude, self.max_duty));
    }

    /// Hold the line fully on or fully off
    pub fn set_level(&mut self, level: Level) {
        match level {
            Level::High => self.pin.set_duty(self.max_duty),
            Level::Low => self.pin.set_duty(0),
        }
    }

    pub fn max_duty(&self) -> u16 {
        self.max_duty
    }

    /// Release the underlying pin
    pub fn free(self) -> P {
        self.pin
    }
}

/// Map an 8-bit magnitude onto `0..=max_duty`
#[inline]
pub fn scale_duty(magnitude: u8, max_duty: u16) -> u16 {
    ((magnitude as u32 * max_duty as u32) / MAX_MAGNITUDE as u32) as u16
}
