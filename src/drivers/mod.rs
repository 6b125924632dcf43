//! Actuator drivers. Both only ever talk to the bus through a
//! [`BusSession`](crate::hardware::BusSession), i.e. under the actuation lock.

pub mod fan;
pub mod servo;

pub use fan::FanDriver;
pub use servo::{SWEEP_START_DUTY, ServoDriver};
