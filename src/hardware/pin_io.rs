use crate::error::BusError;

/// Direction of a sensor-bus pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Raw, single-attempt access to the rig's pins.
///
/// Implementations are not required to be safe for concurrent use; the
/// [`ActuationLock`](super::ActuationLock) owns the backend and hands out one
/// session at a time. Retrying is the session's job, not the backend's.
#[cfg_attr(test, mockall::automock)]
pub trait PinIo: Send + 'static {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), BusError>;
    fn digital_read(&mut self, pin: u8) -> Result<u8, BusError>;
    fn digital_write(&mut self, pin: u8, level: u8) -> Result<(), BusError>;
    fn analog_write(&mut self, pin: u8, value: u8) -> Result<(), BusError>;

    /// Reads `(temperature °C, relative humidity %)`.
    fn dht_read(&mut self, pin: u8) -> Result<(f32, f32), BusError>;

    fn pwm_start(&mut self, pin: u8, frequency_hz: u32) -> Result<(), BusError>;

    /// Sets the PWM duty cycle in percent (0.0 to 100.0).
    fn pwm_duty(&mut self, pin: u8, duty_percent: f32) -> Result<(), BusError>;
    fn pwm_stop(&mut self, pin: u8) -> Result<(), BusError>;

    /// Returns every pin to its power-on state and frees the bus.
    fn release(&mut self) -> Result<(), BusError>;
}
