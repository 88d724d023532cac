//! Trapezoidal speed profiles
//!
//! A profile ramps the speed up at constant acceleration, holds the peak
//! speed, then ramps down to reach zero exactly when the requested distance
//! (or angle) is covered. Short moves never reach the peak speed and give a
//! triangular profile. Profiles run open loop on time; only the heading is
//! corrected, and only for [`ProfileKind::LinearWithHeading`].

use core::cell::RefCell;
use core::f32::consts::TAU;
use log::{debug, info, warn};

use super::kinematics::{normalize_angle, Wheel};
use super::odometry::Odometry;
use super::propulsion::{Propulsion, SpeedCommand};
use crate::config::DEFAULT_HEADING_GAIN;
use crate::error::Error;
use crate::hal::{elapsed, Micros};
use crate::rtos::Task;

/// Which profile is being followed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Idle,
    Linear,
    LinearWithHeading,
    Rotation,
}

/// Timing of one profile. Speeds and accelerations carry the sign of the move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    peak_speed: f32,
    acceleration: f32,
    start: Micros,
    duration: Micros,
}

impl Profile {
    /// Plan a move of `distance` with limits `max_speed` and `max_accel`
    pub fn plan(distance: f32, max_speed: f32, max_accel: f32, start: Micros) -> Result<Self, Error> {
        let valid = |limit: f32| limit.is_finite() && limit > 0.0;
        if !valid(max_speed) || !valid(max_accel) || !distance.is_finite() {
            warn!("profile limits rejected: v={} a={}", max_speed, max_accel);
            return Err(Error::InvalidArgument);
        }

        let length = libm::fabsf(distance);
        let seconds = if length > max_speed * max_speed / max_accel {
            length / max_speed + max_speed / max_accel
        } else {
            libm::sqrtf(4.0 * length / max_accel)
        };
        let micros = libm::roundf(seconds * 1e6);
        // Wrap-aware time comparisons only hold over half the clock range
        if micros >= i32::MAX as f32 {
            warn!("profile of {} s is too long", seconds);
            return Err(Error::InvalidArgument);
        }
        let duration = micros as Micros;
        let sign = if distance >= 0.0 { 1.0 } else { -1.0 };

        Ok(Self {
            peak_speed: sign * max_speed,
            acceleration: sign * max_accel,
            start,
            duration,
        })
    }

    /// Signed speed at `now`, `None` once the profile is over
    pub fn speed_at(&self, now: Micros) -> Option<f32> {
        let elapsed = elapsed(self.start, now);
        if elapsed >= self.duration {
            return None;
        }

        let accelerating = self.acceleration * (elapsed as f32 / 1e6);
        let decelerating = self.acceleration * ((self.duration - elapsed) as f32 / 1e6);
        let speed = if self.peak_speed > 0.0 {
            self.peak_speed.min(accelerating).min(decelerating)
        } else {
            self.peak_speed.max(accelerating).max(decelerating)
        };
        Some(speed)
    }

    pub fn duration(&self) -> Micros {
        self.duration
    }

    pub fn start(&self) -> Micros {
        self.start
    }

    pub fn peak_speed(&self) -> f32 {
        self.peak_speed
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    Linear(Profile),
    LinearWithHeading { profile: Profile, heading: f32 },
    Rotation(Profile),
}

pub struct SpeedProfiler<'a> {
    odometry: &'a RefCell<Odometry<'a>>,
    propulsion: &'a RefCell<Propulsion<'a>>,
    heading_gain: f32,
    state: State,
}

impl<'a> SpeedProfiler<'a> {
    /// `heading_gain` is the proportional gain of the heading hold, in
    /// rad/s per radian of error
    pub fn new(
        odometry: &'a RefCell<Odometry<'a>>,
        propulsion: &'a RefCell<Propulsion<'a>>,
        heading_gain: f32,
    ) -> Self {
        Self {
            odometry,
            propulsion,
            heading_gain,
            state: State::Idle,
        }
    }

    /// Profiler with [`DEFAULT_HEADING_GAIN`]
    pub fn with_default_gain(
        odometry: &'a RefCell<Odometry<'a>>,
        propulsion: &'a RefCell<Propulsion<'a>>,
    ) -> Self {
        Self::new(odometry, propulsion, DEFAULT_HEADING_GAIN)
    }

    pub fn heading_gain(&self) -> f32 {
        self.heading_gain
    }

    /// Drive `distance` meters straight ahead on a differential base (backwards
    /// if negative). An omnidirectional base moves along the field x axis
    /// instead, whatever its heading.
    pub fn start_linear_profile(
        &mut self,
        distance: f32,
        max_speed: f32,
        max_accel: f32,
        now: Micros,
    ) -> Result<(), Error> {
        self.ensure_idle()?;
        let profile = Profile::plan(distance, max_speed, max_accel, now)?;
        self.state = State::Linear(profile);
        info!("linear profile: {} m in {} us", distance, profile.duration);
        Ok(())
    }

    /// Drive straight while steering towards `heading`
    pub fn start_linear_profile_with_heading(
        &mut self,
        distance: f32,
        max_speed: f32,
        max_accel: f32,
        heading: f32,
        now: Micros,
    ) -> Result<(), Error> {
        self.ensure_idle()?;
        let profile = Profile::plan(distance, max_speed, max_accel, now)?;
        self.state = State::LinearWithHeading { profile, heading };
        info!(
            "linear profile: {} m towards {} rad in {} us",
            distance, heading, profile.duration
        );
        Ok(())
    }

    /// Turn in place by `angle` radians, counterclockwise if positive
    pub fn start_rotation_profile(
        &mut self,
        angle: f32,
        max_speed: f32,
        max_accel: f32,
        now: Micros,
    ) -> Result<(), Error> {
        self.ensure_idle()?;
        let profile = Profile::plan(angle, max_speed, max_accel, now)?;
        self.state = State::Rotation(profile);
        info!("rotation profile: {} rad in {} us", angle, profile.duration);
        Ok(())
    }

    /// Abandon the current profile and zero the speed commands at once
    ///
    /// Returns [`Error::Busy`] without touching the profile if propulsion is
    /// borrowed elsewhere.
    pub fn stop_motion(&mut self) -> Result<(), Error> {
        let mut propulsion = self.propulsion.try_borrow_mut().map_err(|_| Error::Busy)?;
        propulsion.set_speeds(SpeedCommand::default());
        self.state = State::Idle;
        info!("motion stopped");
        Ok(())
    }

    pub fn is_following_profile(&self) -> ProfileKind {
        match self.state {
            State::Idle => ProfileKind::Idle,
            State::Linear(_) => ProfileKind::Linear,
            State::LinearWithHeading { .. } => ProfileKind::LinearWithHeading,
            State::Rotation(_) => ProfileKind::Rotation,
        }
    }

    /// The profile being followed, if any
    pub fn profile(&self) -> Option<Profile> {
        match self.state {
            State::Idle => None,
            State::Linear(profile)
            | State::LinearWithHeading { profile, .. }
            | State::Rotation(profile) => Some(profile),
        }
    }

    /// Closest of `directions` evenly spaced headings to the current one
    pub fn automatic_heading(&self, directions: u32) -> Result<f32, Error> {
        let odometry = self.odometry.try_borrow().map_err(|_| Error::Busy)?;
        Ok(find_closest_segment(odometry.theta(), directions))
    }

    pub fn set_heading_gain(&mut self, heading_gain: f32) {
        self.heading_gain = heading_gain;
    }

    /// Advance the current profile and push its speed to propulsion
    pub fn update(&mut self, now: Micros) {
        let profile = match self.profile() {
            Some(profile) => profile,
            None => return,
        };
        let (speed, finished) = match profile.speed_at(now) {
            Some(speed) => (speed, false),
            None => (0.0, true),
        };

        let theta = match self.odometry.try_borrow() {
            Ok(odometry) => odometry.theta(),
            Err(_) => {
                warn!("odometry busy, profile step skipped");
                return;
            }
        };
        let Ok(mut propulsion) = self.propulsion.try_borrow_mut() else {
            warn!("propulsion busy, profile step skipped");
            return;
        };

        match self.state {
            State::Idle => {}
            State::Linear(_) => propulsion.set_linear_speed(speed),
            State::LinearWithHeading { heading, .. } => {
                propulsion.set_linear_speed(speed);
                let correction = self.heading_correction(&propulsion, speed, theta, heading);
                propulsion.set_rotational_speed(correction);
            }
            State::Rotation(_) => propulsion.set_rotational_speed(speed),
        }

        if finished {
            propulsion.set_speeds(SpeedCommand::default());
            self.state = State::Idle;
            debug!("profile finished");
        }
    }

    /// Rotation rate steering towards `heading`, or zero if it would make
    /// the left and right wheels turn in opposite directions
    fn heading_correction(&self, propulsion: &Propulsion<'_>, speed: f32, theta: f32, heading: f32) -> f32 {
        let correction = -self.heading_gain * normalize_angle(theta - heading);
        let wheels = propulsion.drivetrain().wheel_speeds(speed, 0.0, correction);
        if wheels[Wheel::Left.index()] * wheels[Wheel::Right.index()] < 0.0 {
            0.0
        } else {
            correction
        }
    }

    fn ensure_idle(&self) -> Result<(), Error> {
        if self.state == State::Idle {
            Ok(())
        } else {
            warn!("{:?} profile already in progress", self.is_following_profile());
            Err(Error::AlreadyInProgress)
        }
    }
}

impl Task for SpeedProfiler<'_> {
    fn run(&mut self, now: Micros) {
        self.update(now);
    }
}

/// Heading among `directions` evenly spaced ones (starting at 0) closest to
/// `theta`. A heading of exactly π with an even count resolves to +π.
pub fn find_closest_segment(theta: f32, directions: u32) -> f32 {
    if directions == 0 {
        return theta;
    }

    let step = TAU / directions as f32;
    let mut segment = libm::roundf(theta / step) as i32;
    let half = (directions / 2) as i32;
    if directions % 2 == 0 && segment == -half {
        segment = half;
    }
    step * segment as f32
}
