pub mod encoder;
pub mod motor;

pub use encoder::{Channel, Encoder, Polarity, QuadratureDecoder, TickCounter};
pub use motor::{BridgeInput, HBridge, Motor, MotorMode, PwmBridge};
