//! Motion stack: odometry, wheel control and speed profiles

pub mod kinematics;
pub mod odometry;
pub mod profiler;
pub mod propulsion;

pub use kinematics::{normalize_angle, Drivetrain, Wheel};
pub use odometry::{Odometry, Pose};
pub use profiler::{find_closest_segment, Profile, ProfileKind, SpeedProfiler};
pub use propulsion::{PiGains, Propulsion, SpeedCommand};
