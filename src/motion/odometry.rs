//! Dead-reckoning odometry
//!
//! Every period the tick counters of all wheels are snapshotted, turned into
//! wheel rotations, and integrated into the pose with the heading held at
//! its value from the start of the period.

use log::debug;

use super::kinematics::{normalize_angle, Drivetrain, Wheel};
use crate::config::MAX_WHEELS;
use crate::drivers::encoder::Encoder;
use crate::error::Error;
use crate::hal::Micros;
use crate::rtos::Task;

/// Robot pose in the field frame, meters and radians
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    /// Always within (−π, π]
    pub theta: f32,
}

pub struct Odometry<'a> {
    drivetrain: Drivetrain,
    encoders: [Option<&'a Encoder>; MAX_WHEELS],
    /// Radians per tick
    gains: [f32; MAX_WHEELS],
    last_ticks: [u16; MAX_WHEELS],
    angles: [f32; MAX_WHEELS],
    pose: Pose,
}

impl<'a> Odometry<'a> {
    /// Bind one encoder and one gain (radians per tick) to each wheel of
    /// `drivetrain`, in [`Wheel`] order.
    pub fn new(
        drivetrain: Drivetrain,
        encoders: &[&'a Encoder],
        gains: &[f32],
    ) -> Result<Self, Error> {
        let count = drivetrain.wheel_count();
        if encoders.len() != count || gains.len() != count {
            return Err(Error::WheelMismatch);
        }

        let mut odometry = Self {
            drivetrain,
            encoders: [None; MAX_WHEELS],
            gains: [0.0; MAX_WHEELS],
            last_ticks: [0; MAX_WHEELS],
            angles: [0.0; MAX_WHEELS],
            pose: Pose::default(),
        };
        for (idx, (encoder, gain)) in encoders.iter().zip(gains).enumerate() {
            odometry.encoders[idx] = Some(*encoder);
            odometry.gains[idx] = *gain;
            odometry.last_ticks[idx] = encoder.snapshot();
        }
        Ok(odometry)
    }

    /// Integrate the ticks counted since the previous update
    pub fn update(&mut self) {
        let mut deltas = [0.0; MAX_WHEELS];
        for (idx, encoder) in self.encoders.iter().enumerate() {
            let Some(encoder) = encoder else { continue };
            let ticks = encoder.snapshot();
            // Reinterpreting the difference as signed absorbs counter rollover
            let delta = ticks.wrapping_sub(self.last_ticks[idx]) as i16;
            self.last_ticks[idx] = ticks;

            deltas[idx] = delta as f32 * self.gains[idx];
            self.angles[idx] += deltas[idx];
        }

        let motion = self.drivetrain.displacement(&deltas);
        let (sin, cos) = (libm::sinf(self.pose.theta), libm::cosf(self.pose.theta));
        self.pose.x += motion.dx * cos - motion.dy * sin;
        self.pose.y += motion.dx * sin + motion.dy * cos;
        self.pose.theta = normalize_angle(self.pose.theta + motion.dtheta);
    }

    /// Gate tick counting on every wheel
    pub fn enable_encoders(&self, enabled: bool) {
        for encoder in self.encoders.iter().flatten() {
            encoder.set_enabled(enabled);
        }
        debug!("encoders {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Overwrite the pose. Wheel angles are left untouched.
    pub fn reset(&mut self, x: f32, y: f32, theta: f32) {
        self.pose = Pose {
            x,
            y,
            theta: normalize_angle(theta),
        };
    }

    pub fn position(&self) -> Pose {
        self.pose
    }

    pub fn x(&self) -> f32 {
        self.pose.x
    }

    pub fn y(&self) -> f32 {
        self.pose.y
    }

    pub fn theta(&self) -> f32 {
        self.pose.theta
    }

    /// Accumulated rotation of a wheel in radians, zero for a wheel the
    /// drivetrain does not have
    pub fn angle(&self, wheel: Wheel) -> f32 {
        self.angles[wheel.index()]
    }

    pub fn angles(&self) -> [f32; MAX_WHEELS] {
        self.angles
    }

    pub fn drivetrain(&self) -> &Drivetrain {
        &self.drivetrain
    }
}

impl Task for Odometry<'_> {
    fn run(&mut self, _now: Micros) {
        self.update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::encoder::{Channel, Polarity};
    use crate::hal::Level::{High, Low};
    use crate::motion::kinematics::SIN_FACT;
    use core::f32::consts::PI;

    const DIFF: Drivetrain = Drivetrain::Differential {
        left_radius: 0.05,
        right_radius: 0.05,
        shaft_width: 0.25,
    };

    fn forward_ticks(encoder: &Encoder, cycles: usize) {
        for _ in 0..cycles {
            encoder.on_edge(Channel::B, Low, High);
            encoder.on_edge(Channel::A, High, High);
            encoder.on_edge(Channel::B, High, Low);
            encoder.on_edge(Channel::A, Low, Low);
        }
    }

    fn backward_ticks(encoder: &Encoder, cycles: usize) {
        for _ in 0..cycles {
            encoder.on_edge(Channel::A, High, Low);
            encoder.on_edge(Channel::B, High, High);
            encoder.on_edge(Channel::A, Low, High);
            encoder.on_edge(Channel::B, Low, Low);
        }
    }

    #[test]
    fn test_wheel_angle_is_ticks_times_gain() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Reversed);
        let mut odometry = Odometry::new(DIFF, &[&left, &right], &[0.01, 0.02]).unwrap();

        forward_ticks(&left, 25);
        backward_ticks(&right, 10);
        odometry.update();

        assert_eq!(odometry.angle(Wheel::Left), 100.0 * 0.01);
        assert_eq!(odometry.angle(Wheel::Right), 40.0 * 0.02);
        assert_eq!(odometry.angle(Wheel::Front), 0.0);
    }

    #[test]
    fn test_angle_independent_of_update_timing() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let mut split = Odometry::new(DIFF, &[&left, &right], &[0.25, 0.25]).unwrap();

        for _ in 0..8 {
            forward_ticks(&left, 3);
            split.update();
            split.update();
        }
        assert_eq!(split.angle(Wheel::Left), 96.0 * 0.25);
        assert_eq!(split.angle(Wheel::Right), 0.0);
    }

    #[test]
    fn test_counter_rollover_is_a_small_step() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let mut odometry = Odometry::new(DIFF, &[&left, &right], &[0.5, 0.5]).unwrap();

        // Zero minus four wraps to 65532
        backward_ticks(&left, 1);
        odometry.update();
        assert_eq!(odometry.angle(Wheel::Left), -2.0);

        forward_ticks(&left, 2);
        odometry.update();
        assert_eq!(odometry.angle(Wheel::Left), 2.0);
    }

    #[test]
    fn test_straight_line_pose() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let mut odometry = Odometry::new(DIFF, &[&left, &right], &[0.1, 0.1]).unwrap();
        odometry.reset(1.0, 2.0, PI / 2.0);

        forward_ticks(&left, 5);
        forward_ticks(&right, 5);
        odometry.update();

        // 20 ticks of 0.1 rad on 5 cm wheels, heading +y
        let pose = odometry.position();
        assert!((pose.x - 1.0).abs() < 1e-5);
        assert!((pose.y - 2.1).abs() < 1e-5);
        assert!((pose.theta - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_heading_stays_in_range() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        // One tick on each wheel in opposite directions turns the robot by π/4
        let gain = PI / 4.0 * 0.25 / 0.1;
        let mut odometry = Odometry::new(DIFF, &[&left, &right], &[gain, gain]).unwrap();

        for _ in 0..40 {
            right.on_edge(Channel::A, High, High);
            left.on_edge(Channel::A, High, Low);
            odometry.update();
            let theta = odometry.theta();
            assert!(theta > -PI && theta <= PI, "{} out of range", theta);
        }

        odometry.reset(0.0, 0.0, -PI);
        assert_eq!(odometry.theta(), PI);
    }

    #[test]
    fn test_disabled_encoders_freeze_odometry() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let mut odometry = Odometry::new(DIFF, &[&left, &right], &[0.1, 0.1]).unwrap();

        odometry.enable_encoders(false);
        forward_ticks(&left, 10);
        odometry.update();
        assert_eq!(odometry.angles(), [0.0; MAX_WHEELS]);
        assert_eq!(odometry.position(), Pose::default());

        odometry.enable_encoders(true);
        assert!(left.is_enabled() && right.is_enabled());
    }

    #[test]
    fn test_omnidirectional_rotation() {
        let omni = Drivetrain::Omnidirectional {
            left_radius: 0.02,
            right_radius: 0.02,
            front_radius: 0.02,
            robot_radius: 0.1,
        };
        let encoders = [
            Encoder::new(Polarity::Normal),
            Encoder::new(Polarity::Normal),
            Encoder::new(Polarity::Normal),
        ];
        let mut odometry = Odometry::new(
            omni,
            &[&encoders[0], &encoders[1], &encoders[2]],
            &[0.05, 0.05, 0.05],
        )
        .unwrap();

        for encoder in encoders.iter() {
            forward_ticks(encoder, 1);
        }
        odometry.update();

        // All wheels rolling the same way spin the base without translating
        let pose = odometry.position();
        assert!(pose.x.abs() < 1e-6);
        assert!(pose.y.abs() < 1e-6);
        assert!((pose.theta - 0.2 * 0.02 * 3.0 / 0.2 * 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_omnidirectional_sideways_at_quarter_turn() {
        let omni = Drivetrain::Omnidirectional {
            left_radius: 0.02,
            right_radius: 0.02,
            front_radius: 0.02,
            robot_radius: 0.1,
        };
        let encoders = [
            Encoder::new(Polarity::Normal),
            Encoder::new(Polarity::Normal),
            Encoder::new(Polarity::Normal),
        ];
        let mut odometry = Odometry::new(
            omni,
            &[&encoders[0], &encoders[1], &encoders[2]],
            &[0.05, 0.05, 0.05],
        )
        .unwrap();
        odometry.reset(0.0, 0.0, PI / 2.0);

        // Left back, right forward: pure leftward slide in the robot frame
        backward_ticks(&encoders[0], 1);
        forward_ticks(&encoders[1], 1);
        odometry.update();

        // Facing +y, the robot's left is -x
        let slide = 2.0 * 0.2 * 0.02 * SIN_FACT;
        let pose = odometry.position();
        assert!((pose.x + slide).abs() < 1e-6, "x = {}", pose.x);
        assert!(pose.y.abs() < 1e-6, "y = {}", pose.y);
        assert!((pose.theta - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_wheel_count_must_match() {
        let encoder = Encoder::new(Polarity::Normal);
        assert_eq!(
            Odometry::new(DIFF, &[&encoder], &[0.1]).err(),
            Some(Error::WheelMismatch)
        );
        assert_eq!(
            Odometry::new(DIFF, &[&encoder, &encoder], &[0.1]).err(),
            Some(Error::WheelMismatch)
        );
    }
}
