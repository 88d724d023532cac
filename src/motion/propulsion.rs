//! Per-wheel velocity control
//!
//! Robot velocity commands are turned into wheel angular speeds by the
//! drivetrain's inverse kinematics. Each wheel then integrates its speed
//! into a position reference and a PI controller tracks that reference
//! against the wheel angle measured by odometry.

use core::cell::RefCell;
use log::{debug, warn};

use super::kinematics::{Drivetrain, Wheel};
use super::odometry::Odometry;
use crate::config::{DEFAULT_MAX_INTEGRATOR, MAX_WHEELS};
use crate::drivers::motor::{HBridge, Motor, MotorMode};
use crate::error::Error;
use crate::hal::{elapsed, Micros};
use crate::rtos::Task;

/// Gains of the wheel position controllers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiGains {
    pub kp: f32,
    pub ki: f32,
}

impl Default for PiGains {
    fn default() -> Self {
        Self { kp: 1.0, ki: 0.0 }
    }
}

/// Requested robot velocity.
///
/// For a differential base `vx` is the forward speed and `vy` is ignored.
/// For an omnidirectional base `(vx, vy)` is expressed in the field frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeedCommand {
    pub vx: f32,
    pub vy: f32,
    /// Counterclockwise, rad/s
    pub omega: f32,
}

impl SpeedCommand {
    pub const fn differential(linear: f32, omega: f32) -> Self {
        Self {
            vx: linear,
            vy: 0.0,
            omega,
        }
    }

    pub const fn holonomic(vx: f32, vy: f32, omega: f32) -> Self {
        Self { vx, vy, omega }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WheelLoop {
    speed_ref: f32,
    position_ref: f32,
    integral: f32,
    last_command: i16,
}

pub struct Propulsion<'a> {
    drivetrain: Drivetrain,
    odometry: &'a RefCell<Odometry<'a>>,
    motors: [Option<Motor<'a>>; MAX_WHEELS],
    loops: [WheelLoop; MAX_WHEELS],
    gains: PiGains,
    max_integrator: f32,
    command: SpeedCommand,
    last_control: Option<Micros>,
}

impl<'a> Propulsion<'a> {
    /// Drive one H-bridge per odometry wheel, in [`Wheel`] order.
    ///
    /// Bridges are left as they are; call
    /// [`set_motor_mode`](Self::set_motor_mode) to energize them.
    pub fn new<I>(
        odometry: &'a RefCell<Odometry<'a>>,
        bridges: I,
        gains: PiGains,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = &'a mut dyn HBridge>,
    {
        let drivetrain = match odometry.try_borrow() {
            Ok(odometry) => *odometry.drivetrain(),
            Err(_) => return Err(Error::Busy),
        };
        let mut motors: [Option<Motor<'a>>; MAX_WHEELS] = core::array::from_fn(|_| None);
        let mut count = 0;
        for bridge in bridges {
            if count >= drivetrain.wheel_count() {
                return Err(Error::WheelMismatch);
            }
            motors[count] = Some(Motor::new(bridge));
            count += 1;
        }
        if count != drivetrain.wheel_count() {
            return Err(Error::WheelMismatch);
        }

        Ok(Self {
            drivetrain,
            odometry,
            motors,
            loops: [WheelLoop::default(); MAX_WHEELS],
            gains,
            max_integrator: DEFAULT_MAX_INTEGRATOR,
            command: SpeedCommand::default(),
            last_control: None,
        })
    }

    /// Set the velocity to track from the next control update on
    pub fn set_speeds(&mut self, command: SpeedCommand) {
        self.command = command;
    }

    /// Replace the translational part of the command, along x
    pub fn set_linear_speed(&mut self, speed: f32) {
        self.command.vx = speed;
        self.command.vy = 0.0;
    }

    pub fn set_rotational_speed(&mut self, omega: f32) {
        self.command.omega = omega;
    }

    pub fn speed_command(&self) -> SpeedCommand {
        self.command
    }

    /// One control period: advance the references and drive the motors
    pub fn update(&mut self, now: Micros) {
        let dt = match self.last_control {
            Some(last) => elapsed(last, now) as f32 / 1e6,
            None => 0.0,
        };

        let (angles, theta) = match self.odometry.try_borrow() {
            Ok(odometry) => (odometry.angles(), odometry.theta()),
            Err(_) => {
                warn!("odometry busy, control update skipped");
                return;
            }
        };
        let speeds = self.wheel_speed_targets(theta);

        for wheel in self.drivetrain.wheels() {
            let idx = wheel.index();
            let wheel_loop = &mut self.loops[idx];
            wheel_loop.speed_ref = speeds[idx];
            wheel_loop.position_ref += speeds[idx] * dt;

            let error = wheel_loop.position_ref - angles[idx];
            wheel_loop.integral = (wheel_loop.integral + self.gains.ki * error)
                .clamp(-self.max_integrator, self.max_integrator);

            let command = self.gains.kp * error + wheel_loop.integral;
            if let Some(motor) = self.motors[idx].as_mut() {
                wheel_loop.last_command = motor.drive(command as i32);
            }
        }

        self.last_control = Some(now);
    }

    /// Send a raw command to one motor, bypassing the controller
    pub fn set_motor_cmd(&mut self, wheel: Wheel, command: i32) -> Result<i16, Error> {
        let idx = wheel.index();
        let motor = self.motors[idx].as_mut().ok_or(Error::InvalidIndex)?;
        let applied = motor.drive(command);
        self.loops[idx].last_command = applied;
        Ok(applied)
    }

    pub fn set_motor_mode(&mut self, mode: MotorMode) {
        for motor in self.motors.iter_mut().flatten() {
            motor.set_mode(mode);
        }
        debug!("motors {:?}", mode);
    }

    /// Re-seed the references on the measured wheel angles and clear the
    /// integral terms
    pub fn reset_controller(&mut self) {
        let angles = match self.odometry.try_borrow() {
            Ok(odometry) => odometry.angles(),
            Err(_) => {
                warn!("odometry busy, controller not reset");
                return;
            }
        };
        for (wheel_loop, angle) in self.loops.iter_mut().zip(angles) {
            wheel_loop.position_ref = angle;
            wheel_loop.integral = 0.0;
        }
    }

    /// Saturation bound of one motor, see [`Motor::set_max_command`]
    pub fn set_max_command(&mut self, wheel: Wheel, max_command: i16) -> Result<i16, Error> {
        let motor = self.motors[wheel.index()]
            .as_mut()
            .ok_or(Error::InvalidIndex)?;
        Ok(motor.set_max_command(max_command))
    }

    /// Per-wheel command inversion, in [`Wheel`] order
    pub fn invert_motor_commands(&mut self, inverted: &[bool]) -> Result<(), Error> {
        self.check_wheel_count(inverted.len())?;
        for (motor, inverted) in self.motors.iter_mut().flatten().zip(inverted) {
            motor.set_inverted(*inverted);
        }
        Ok(())
    }

    /// Per-wheel dead zones, in [`Wheel`] order
    pub fn set_dead_zones(&mut self, dead_zones: &[u8]) -> Result<(), Error> {
        self.check_wheel_count(dead_zones.len())?;
        for (motor, dead_zone) in self.motors.iter_mut().flatten().zip(dead_zones) {
            motor.set_dead_zone(*dead_zone);
        }
        Ok(())
    }

    /// Bound of the integral terms. Negative or non-finite values are ignored.
    pub fn set_max_integrator(&mut self, max_integrator: f32) {
        if max_integrator.is_finite() && max_integrator >= 0.0 {
            self.max_integrator = max_integrator;
        } else {
            warn!("max integrator {} ignored", max_integrator);
        }
    }

    pub fn set_gains(&mut self, gains: PiGains) {
        self.gains = gains;
    }

    pub fn gains(&self) -> PiGains {
        self.gains
    }

    pub fn max_integrator(&self) -> f32 {
        self.max_integrator
    }

    /// Wheel angular speed targeted by the last control update
    pub fn speed_reference(&self, wheel: Wheel) -> f32 {
        self.loops[wheel.index()].speed_ref
    }

    pub fn position_reference(&self, wheel: Wheel) -> f32 {
        self.loops[wheel.index()].position_ref
    }

    pub fn integral(&self, wheel: Wheel) -> f32 {
        self.loops[wheel.index()].integral
    }

    /// Command actually sent to the motor last, after shaping
    pub fn last_command(&self, wheel: Wheel) -> i16 {
        self.loops[wheel.index()].last_command
    }

    pub fn drivetrain(&self) -> &Drivetrain {
        &self.drivetrain
    }

    fn wheel_speed_targets(&self, theta: f32) -> [f32; MAX_WHEELS] {
        let SpeedCommand { vx, vy, omega } = self.command;
        if self.drivetrain.is_holonomic() {
            let (sin, cos) = (libm::sinf(theta), libm::cosf(theta));
            let local_x = vx * cos + vy * sin;
            let local_y = -vx * sin + vy * cos;
            self.drivetrain.wheel_speeds(local_x, local_y, omega)
        } else {
            self.drivetrain.wheel_speeds(vx, 0.0, omega)
        }
    }

    fn check_wheel_count(&self, len: usize) -> Result<(), Error> {
        if len == self.drivetrain.wheel_count() {
            Ok(())
        } else {
            warn!(
                "{} values given for {} wheels",
                len,
                self.drivetrain.wheel_count()
            );
            Err(Error::WheelMismatch)
        }
    }
}

impl Task for Propulsion<'_> {
    fn run(&mut self, now: Micros) {
        self.update(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_MOTOR_COMMAND;
    use crate::drivers::encoder::{Channel, Encoder, Polarity};
    use crate::drivers::motor::tests::{RecordingBridge, Write};
    use crate::drivers::motor::BridgeInput;
    use crate::hal::Level;

    const DIFF: Drivetrain = Drivetrain::Differential {
        left_radius: 0.04,
        right_radius: 0.04,
        shaft_width: 0.2,
    };

    const GAINS: PiGains = PiGains { kp: 20.0, ki: 2.0 };

    #[test]
    fn test_wheel_count_must_match() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let odometry = RefCell::new(Odometry::new(DIFF, &[&left, &right], &[0.1, 0.1]).unwrap());
        let mut first = RecordingBridge::default();
        let mut second = RecordingBridge::default();
        let mut third = RecordingBridge::default();
        let mut fourth = RecordingBridge::default();

        let one: [&mut dyn HBridge; 1] = [&mut first];
        assert_eq!(
            Propulsion::new(&odometry, one, GAINS).err(),
            Some(Error::WheelMismatch)
        );
        let three: [&mut dyn HBridge; 3] = [&mut second, &mut third, &mut fourth];
        assert_eq!(
            Propulsion::new(&odometry, three, GAINS).err(),
            Some(Error::WheelMismatch)
        );
    }

    #[test]
    fn test_integral_is_bounded() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let odometry = RefCell::new(Odometry::new(DIFF, &[&left, &right], &[0.1, 0.1]).unwrap());
        let mut left_bridge = RecordingBridge::default();
        let mut right_bridge = RecordingBridge::default();
        let bridges: [&mut dyn HBridge; 2] = [&mut left_bridge, &mut right_bridge];
        let mut propulsion = Propulsion::new(&odometry, bridges, GAINS).unwrap();
        propulsion.set_max_integrator(40.0);

        // The wheels never move, so the error keeps growing
        propulsion.set_speeds(SpeedCommand::differential(0.5, 0.0));
        for step in 0..500u32 {
            propulsion.update(step * 10_000);
            assert!(propulsion.integral(Wheel::Left).abs() <= 40.0);
            assert!(propulsion.integral(Wheel::Right).abs() <= 40.0);
        }
        assert_eq!(propulsion.integral(Wheel::Left), 40.0);
        assert_eq!(propulsion.last_command(Wheel::Left), MAX_MOTOR_COMMAND);

        propulsion.set_speeds(SpeedCommand::differential(-0.5, 0.0));
        for step in 500..2000u32 {
            propulsion.update(step * 10_000);
        }
        assert_eq!(propulsion.integral(Wheel::Right), -40.0);
        assert_eq!(propulsion.last_command(Wheel::Right), -MAX_MOTOR_COMMAND);
    }

    #[test]
    fn test_reset_then_update_commands_nothing() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let odometry = RefCell::new(Odometry::new(DIFF, &[&left, &right], &[0.1, 0.1]).unwrap());
        let mut left_bridge = RecordingBridge::default();
        let mut right_bridge = RecordingBridge::default();
        let bridges: [&mut dyn HBridge; 2] = [&mut left_bridge, &mut right_bridge];
        let mut propulsion = Propulsion::new(&odometry, bridges, GAINS).unwrap();

        propulsion.set_speeds(SpeedCommand::differential(0.3, 1.0));
        propulsion.update(0);
        propulsion.update(50_000);
        propulsion.set_speeds(SpeedCommand::default());

        // The robot got pushed while stopped
        for _ in 0..7 {
            left.on_edge(Channel::A, Level::High, Level::High);
        }
        odometry.borrow_mut().update();

        propulsion.reset_controller();
        assert_eq!(propulsion.position_reference(Wheel::Left), odometry.borrow().angle(Wheel::Left));
        propulsion.update(60_000);
        assert_eq!(propulsion.integral(Wheel::Left), 0.0);
        assert_eq!(propulsion.last_command(Wheel::Left), 0);
        assert_eq!(propulsion.last_command(Wheel::Right), 0);
    }

    #[test]
    fn test_first_update_does_not_integrate() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let odometry = RefCell::new(Odometry::new(DIFF, &[&left, &right], &[0.1, 0.1]).unwrap());
        let mut left_bridge = RecordingBridge::default();
        let mut right_bridge = RecordingBridge::default();
        let bridges: [&mut dyn HBridge; 2] = [&mut left_bridge, &mut right_bridge];
        let mut propulsion = Propulsion::new(&odometry, bridges, GAINS).unwrap();

        propulsion.set_speeds(SpeedCommand::differential(0.4, 0.0));
        propulsion.update(1_000_000);
        assert_eq!(propulsion.position_reference(Wheel::Left), 0.0);
        assert!((propulsion.speed_reference(Wheel::Left) - 10.0).abs() < 1e-4);

        propulsion.update(1_100_000);
        assert!((propulsion.position_reference(Wheel::Left) - 1.0).abs() < 1e-5);
        assert!((propulsion.position_reference(Wheel::Right) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_disable_enable_reasserts_direction_outputs() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let odometry = RefCell::new(Odometry::new(DIFF, &[&left, &right], &[0.1, 0.1]).unwrap());
        let mut left_bridge = RecordingBridge::default();
        let mut right_bridge = RecordingBridge::default();
        {
            let bridges: [&mut dyn HBridge; 2] = [&mut left_bridge, &mut right_bridge];
            let mut propulsion = Propulsion::new(&odometry, bridges, GAINS).unwrap();
            propulsion.set_motor_mode(MotorMode::Enabled);
            assert_eq!(propulsion.set_motor_cmd(Wheel::Left, 60), Ok(60));
            propulsion.set_motor_mode(MotorMode::Disabled);
            propulsion.set_motor_mode(MotorMode::Enabled);
            assert_eq!(propulsion.set_motor_cmd(Wheel::Left, 60), Ok(60));
            assert_eq!(propulsion.set_motor_cmd(Wheel::Front, 60), Err(Error::InvalidIndex));
        }

        let tail = &left_bridge.writes[left_bridge.writes.len() - 2..];
        assert_eq!(
            tail,
            [
                Write::Level(BridgeInput::In2, Level::Low),
                Write::Magnitude(BridgeInput::In1, 60),
            ]
        );
        assert_eq!(right_bridge.writes.last(), Some(&Write::Enable(Level::High)));
    }

    #[test]
    fn test_configuration_setters() {
        let left = Encoder::new(Polarity::Normal);
        let right = Encoder::new(Polarity::Normal);
        let odometry = RefCell::new(Odometry::new(DIFF, &[&left, &right], &[0.1, 0.1]).unwrap());
        let mut left_bridge = RecordingBridge::default();
        let mut right_bridge = RecordingBridge::default();
        let bridges: [&mut dyn HBridge; 2] = [&mut left_bridge, &mut right_bridge];
        let mut propulsion = Propulsion::new(&odometry, bridges, GAINS).unwrap();

        assert_eq!(propulsion.set_max_command(Wheel::Left, 900), Ok(MAX_MOTOR_COMMAND));
        assert_eq!(propulsion.set_max_command(Wheel::Right, 0), Ok(MAX_MOTOR_COMMAND));
        assert_eq!(propulsion.set_max_command(Wheel::Front, 10), Err(Error::InvalidIndex));

        assert_eq!(propulsion.invert_motor_commands(&[false, true]), Ok(()));
        assert_eq!(propulsion.set_motor_cmd(Wheel::Right, 30), Ok(-30));
        assert_eq!(
            propulsion.invert_motor_commands(&[true, true, true]),
            Err(Error::WheelMismatch)
        );

        assert_eq!(propulsion.set_dead_zones(&[15, 0]), Ok(()));
        assert_eq!(propulsion.set_motor_cmd(Wheel::Left, -10), Ok(-25));
        assert_eq!(propulsion.set_dead_zones(&[1]), Err(Error::WheelMismatch));

        propulsion.set_max_integrator(-3.0);
        assert_eq!(propulsion.max_integrator(), DEFAULT_MAX_INTEGRATOR);
        propulsion.set_max_integrator(12.5);
        assert_eq!(propulsion.max_integrator(), 12.5);
    }

    #[test]
    fn test_holonomic_command_is_rotated_into_robot_frame() {
        let omni = Drivetrain::Omnidirectional {
            left_radius: 0.03,
            right_radius: 0.03,
            front_radius: 0.03,
            robot_radius: 0.12,
        };
        let encoders = [
            Encoder::new(Polarity::Normal),
            Encoder::new(Polarity::Normal),
            Encoder::new(Polarity::Normal),
        ];
        let odometry = RefCell::new(
            Odometry::new(
                omni,
                &[&encoders[0], &encoders[1], &encoders[2]],
                &[0.1, 0.1, 0.1],
            )
            .unwrap(),
        );
        odometry
            .borrow_mut()
            .reset(0.0, 0.0, core::f32::consts::FRAC_PI_2);

        let mut bridges = [
            RecordingBridge::default(),
            RecordingBridge::default(),
            RecordingBridge::default(),
        ];
        let [left, right, front] = &mut bridges;
        let bridges: [&mut dyn HBridge; 3] = [left, right, front];
        let mut propulsion = Propulsion::new(&odometry, bridges, GAINS).unwrap();

        // Field +y while facing +y is straight ahead for the robot
        propulsion.set_speeds(SpeedCommand::holonomic(0.0, 0.3, 0.0));
        propulsion.update(0);
        let expected = omni.wheel_speeds(0.3, 0.0, 0.0);
        for wheel in [Wheel::Left, Wheel::Right, Wheel::Front] {
            assert!((propulsion.speed_reference(wheel) - expected[wheel.index()]).abs() < 1e-4);
        }
    }
}
