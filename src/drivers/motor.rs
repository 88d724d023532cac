//! DC motor output stage
//!
//! Each motor is driven through an H-bridge with two direction inputs and an
//! enable line. The active direction input carries the PWM magnitude while
//! the other one is held low.

use log::debug;

use crate::config::{DEFAULT_DEAD_ZONE, MAX_MOTOR_COMMAND};
use crate::hal::{write_level, Level, OutputPin, PwmOutput, PwmPin};

/// Direction input of an H-bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeInput {
    /// Driven for positive commands
    In1,
    /// Driven for negative commands
    In2,
}

/// Output capability of one H-bridge
pub trait HBridge {
    /// Hold a direction input fully high or low
    fn set_input_level(&mut self, input: BridgeInput, level: Level);

    /// Drive a direction input with a PWM magnitude
    fn set_input_magnitude(&mut self, input: BridgeInput, magnitude: u8);

    fn set_enable(&mut self, level: Level);
}

/// H-bridge wired to two PWM channels and a digital enable line
pub struct PwmBridge<IN1, IN2, EN> {
    in1: PwmOutput<IN1>,
    in2: PwmOutput<IN2>,
    enable: EN,
}

impl<IN1, IN2, EN> PwmBridge<IN1, IN2, EN>
where
    IN1: PwmPin<Duty = u16>,
    IN2: PwmPin<Duty = u16>,
    EN: OutputPin,
{
    /// Take the pins and leave the bridge de-energized
    pub fn new(in1: IN1, in2: IN2, mut enable: EN) -> Self {
        write_level(&mut enable, Level::Low);
        Self {
            in1: PwmOutput::new(in1),
            in2: PwmOutput::new(in2),
            enable,
        }
    }

    pub fn free(self) -> (IN1, IN2, EN) {
        (self.in1.free(), self.in2.free(), self.enable)
    }
}

impl<IN1, IN2, EN> HBridge for PwmBridge<IN1, IN2, EN>
where
    IN1: PwmPin<Duty = u16>,
    IN2: PwmPin<Duty = u16>,
    EN: OutputPin,
{
    fn set_input_level(&mut self, input: BridgeInput, level: Level) {
        match input {
            BridgeInput::In1 => self.in1.set_level(level),
            BridgeInput::In2 => self.in2.set_level(level),
        }
    }

    fn set_input_magnitude(&mut self, input: BridgeInput, magnitude: u8) {
        match input {
            BridgeInput::In1 => self.in1.set_magnitude(magnitude),
            BridgeInput::In2 => self.in2.set_magnitude(magnitude),
        }
    }

    fn set_enable(&mut self, level: Level) {
        write_level(&mut self.enable, level);
    }
}

/// Operating mode of the motors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorMode {
    /// Bridge enabled, commands drive the motor
    Enabled,
    /// Both inputs high: the motor terminals are shorted to the supply
    BrakeHigh,
    /// Both inputs low: the motor terminals are shorted to ground
    BrakeLow,
    /// Bridge de-energized, the motor spins freely
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// One motor with its command shaping: inversion, dead zone and saturation
pub struct Motor<'a> {
    bridge: &'a mut dyn HBridge,
    max_command: i16,
    inverted: bool,
    dead_zone: u8,
    last_direction: Option<Direction>,
}

impl<'a> Motor<'a> {
    pub fn new(bridge: &'a mut dyn HBridge) -> Self {
        Self {
            bridge,
            max_command: MAX_MOTOR_COMMAND,
            inverted: false,
            dead_zone: DEFAULT_DEAD_ZONE,
            last_direction: None,
        }
    }

    /// Apply a signed command, returning the value actually sent to the bridge
    pub fn drive(&mut self, command: i32) -> i16 {
        let mut command = if self.inverted {
            command.saturating_neg()
        } else {
            command
        };
        if command > 0 {
            command = command.saturating_add(self.dead_zone as i32);
        } else if command < 0 {
            command = command.saturating_sub(self.dead_zone as i32);
        }
        let max = self.max_command as i32;
        let command = command.clamp(-max, max) as i16;

        // The idle input is only rewritten when the direction flips
        if command >= 0 && self.last_direction != Some(Direction::Forward) {
            self.bridge.set_input_level(BridgeInput::In2, Level::Low);
            self.last_direction = Some(Direction::Forward);
        } else if command < 0 && self.last_direction != Some(Direction::Backward) {
            self.bridge.set_input_level(BridgeInput::In1, Level::Low);
            self.last_direction = Some(Direction::Backward);
        }

        if command >= 0 {
            self.bridge.set_input_magnitude(BridgeInput::In1, command as u8);
        } else {
            self.bridge.set_input_magnitude(BridgeInput::In2, (-command) as u8);
        }
        command
    }

    /// Switch the bridge mode and forget the last direction
    pub fn set_mode(&mut self, mode: MotorMode) {
        match mode {
            MotorMode::Enabled => {
                self.bridge.set_input_level(BridgeInput::In1, Level::Low);
                self.bridge.set_input_level(BridgeInput::In2, Level::Low);
                self.bridge.set_enable(Level::High);
            }
            MotorMode::BrakeHigh => {
                self.bridge.set_input_level(BridgeInput::In1, Level::High);
                self.bridge.set_input_level(BridgeInput::In2, Level::High);
            }
            MotorMode::BrakeLow => {
                self.bridge.set_input_level(BridgeInput::In1, Level::Low);
                self.bridge.set_input_level(BridgeInput::In2, Level::Low);
            }
            MotorMode::Disabled => self.bridge.set_enable(Level::Low),
        }
        self.last_direction = None;
    }

    /// Saturation bound. Non-positive values are ignored; values above the
    /// hardware ceiling are clamped to it. Returns the bound in effect.
    pub fn set_max_command(&mut self, max_command: i16) -> i16 {
        if max_command > 0 {
            if max_command > MAX_MOTOR_COMMAND {
                debug!("max command {} clamped to {}", max_command, MAX_MOTOR_COMMAND);
            }
            self.max_command = max_command.min(MAX_MOTOR_COMMAND);
        }
        self.max_command
    }

    pub fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    pub fn set_dead_zone(&mut self, dead_zone: u8) {
        self.dead_zone = dead_zone;
    }

    pub fn max_command(&self) -> i16 {
        self.max_command
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn dead_zone(&self) -> u8 {
        self.dead_zone
    }
}
