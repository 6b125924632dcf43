//! Sensor-bus access: the raw pin interface, the actuation lock that
//! serializes it, and the in-memory backend.

pub mod pin_io;
pub mod session;
pub mod simulated;

pub use pin_io::{PinIo, PinMode};
pub use session::{ActuationLock, BusSession, RetryPolicy};
pub use simulated::SimulatedBus;

use crate::config::BackendCfg;

/// Builds the pin backend selected in the configuration.
pub fn open_backend(cfg: &BackendCfg) -> Box<dyn PinIo> {
    match cfg {
        BackendCfg::Simulated {
            failure_rate,
            ambient,
        } => {
            log::info!(
                "Using simulated pin backend (ambient {ambient}°C, failure rate {failure_rate})"
            );
            Box::new(SimulatedBus::new(*ambient, *failure_rate))
        }
    }
}
