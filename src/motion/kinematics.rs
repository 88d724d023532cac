//! Drivetrain geometry
//!
//! Both supported bases share one wheel indexing: left, right, then front for
//! the three-wheel omnidirectional base. Wheel quantities are passed around
//! as `[f32; MAX_WHEELS]` arrays indexed by [`Wheel::index`]; entries for
//! wheels the drivetrain does not have stay at zero.

use core::f32::consts::{PI, TAU};

use crate::config::MAX_WHEELS;

/// `1 / (1 - cos(2π/3))`
pub const COS_FACT: f32 = 2.0 / 3.0;
/// `1 / (2 sin(2π/3))`
pub const SIN_FACT: f32 = 0.577_350_26;
/// `sin(2π/3)`
pub const SIN_2PI_3: f32 = 0.866_025_4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    Left,
    Right,
    Front,
}

impl Wheel {
    pub const fn index(self) -> usize {
        match self {
            Wheel::Left => 0,
            Wheel::Right => 1,
            Wheel::Front => 2,
        }
    }
}

const DIFFERENTIAL_WHEELS: [Wheel; 2] = [Wheel::Left, Wheel::Right];
const OMNI_WHEELS: [Wheel; 3] = [Wheel::Left, Wheel::Right, Wheel::Front];

/// Wheel layout of the robot. Lengths in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Drivetrain {
    /// Two coaxial wheels `shaft_width` apart
    Differential {
        left_radius: f32,
        right_radius: f32,
        shaft_width: f32,
    },
    /// Three omni wheels at 120°, the front one on the robot's forward axis,
    /// each `robot_radius` from the center
    Omnidirectional {
        left_radius: f32,
        right_radius: f32,
        front_radius: f32,
        robot_radius: f32,
    },
}

/// Robot displacement over one odometry period, in the robot frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Displacement {
    /// Forward
    pub dx: f32,
    /// Leftward
    pub dy: f32,
    pub dtheta: f32,
}

impl Drivetrain {
    pub fn wheels(&self) -> &'static [Wheel] {
        match self {
            Drivetrain::Differential { .. } => &DIFFERENTIAL_WHEELS,
            Drivetrain::Omnidirectional { .. } => &OMNI_WHEELS,
        }
    }

    pub fn wheel_count(&self) -> usize {
        self.wheels().len()
    }

    pub fn has_wheel(&self, wheel: Wheel) -> bool {
        self.wheels().contains(&wheel)
    }

    /// Whether the base can translate sideways
    pub fn is_holonomic(&self) -> bool {
        matches!(self, Drivetrain::Omnidirectional { .. })
    }

    /// Robot displacement produced by wheel rotations `deltas` (radians)
    pub fn displacement(&self, deltas: &[f32; MAX_WHEELS]) -> Displacement {
        let left = deltas[Wheel::Left.index()];
        let right = deltas[Wheel::Right.index()];

        match *self {
            Drivetrain::Differential {
                left_radius,
                right_radius,
                shaft_width,
            } => {
                let left = left_radius * left;
                let right = right_radius * right;
                Displacement {
                    dx: (right + left) / 2.0,
                    dy: 0.0,
                    dtheta: (right - left) / shaft_width,
                }
            }
            Drivetrain::Omnidirectional {
                left_radius,
                right_radius,
                front_radius,
                robot_radius,
            } => {
                let left = left_radius * left;
                let right = right_radius * right;
                let front = front_radius * deltas[Wheel::Front.index()];
                Displacement {
                    dx: (-front + left / 2.0 + right / 2.0) * COS_FACT,
                    dy: (-left + right) * SIN_FACT,
                    dtheta: (front + left + right) / (2.0 * robot_radius) * COS_FACT,
                }
            }
        }
    }

    /// Wheel angular speeds (rad/s) for a robot-frame velocity.
    ///
    /// `vy` only matters for holonomic bases.
    pub fn wheel_speeds(&self, vx: f32, vy: f32, omega: f32) -> [f32; MAX_WHEELS] {
        let mut speeds = [0.0; MAX_WHEELS];
        match *self {
            Drivetrain::Differential {
                left_radius,
                right_radius,
                shaft_width,
            } => {
                speeds[Wheel::Left.index()] = (2.0 * vx - omega * shaft_width) / (2.0 * left_radius);
                speeds[Wheel::Right.index()] = (2.0 * vx + omega * shaft_width) / (2.0 * right_radius);
            }
            Drivetrain::Omnidirectional {
                left_radius,
                right_radius,
                front_radius,
                robot_radius,
            } => {
                let spin = robot_radius * omega;
                speeds[Wheel::Left.index()] = (0.5 * vx - SIN_2PI_3 * vy + spin) / left_radius;
                speeds[Wheel::Right.index()] = (0.5 * vx + SIN_2PI_3 * vy + spin) / right_radius;
                speeds[Wheel::Front.index()] = (-vx + spin) / front_radius;
            }
        }
        speeds
    }
}

/// Wrap an angle into (−π, π]
pub fn normalize_angle(theta: f32) -> f32 {
    let mut theta = libm::fmodf(theta, TAU);
    if theta <= -PI {
        theta += TAU;
    } else if theta > PI {
        theta -= TAU;
    }
    theta
}
