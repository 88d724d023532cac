//! Configuration constants for the drive base firmware

/// Maximum number of periodic tasks the scheduler can hold
pub const MAX_TASKS: usize = 10;

/// Size of the one-shot timer pool
pub const MAX_CHRONOS: usize = 3;

/// Largest drivetrain supported (three-wheel omnidirectional base)
pub const MAX_WHEELS: usize = 3;

/// Absolute ceiling of a motor command (8-bit PWM)
pub const MAX_MOTOR_COMMAND: i16 = 255;

/// Default bound of the integral term of each wheel controller
pub const DEFAULT_MAX_INTEGRATOR: f32 = 255.0;

/// Default static friction compensation
pub const DEFAULT_DEAD_ZONE: u8 = 0;

/// Default proportional gain of the heading hold
pub const DEFAULT_HEADING_GAIN: f32 = 3.0;

/// Time units, in microseconds
pub const MICROSECOND: u32 = 1;
pub const MILLISECOND: u32 = 1_000;
pub const SECOND: u32 = 1_000_000;

/// Default task periods
pub const ODOMETRY_PERIOD_US: u32 = 5 * MILLISECOND;
pub const PROPULSION_PERIOD_US: u32 = 10 * MILLISECOND;
pub const PROFILER_PERIOD_US: u32 = 20 * MILLISECOND;
