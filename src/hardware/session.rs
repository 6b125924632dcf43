//! Actuation lock and bounded-retry bus sessions.

use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{Mutex, MutexGuard};

use super::pin_io::{PinIo, PinMode};
use crate::{config::IoCfg, error::BusError};

/// How often and how patiently a bus transaction is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

impl From<&IoCfg> for RetryPolicy {
    fn from(cfg: &IoCfg) -> Self {
        Self {
            attempts: cfg.attempts.max(1),
            delay: Duration::from_millis(cfg.retry_delay_ms),
        }
    }
}

/// Mutual-exclusion domain for the physical bus.
///
/// Owns the pin backend. Holding a [`BusSession`] is the only way to talk to
/// the hardware, so two writers can never interleave transactions. This lock
/// says nothing about device state consistency.
pub struct ActuationLock {
    io: Mutex<Box<dyn PinIo>>,
    policy: RetryPolicy,
}

impl ActuationLock {
    pub fn new(io: Box<dyn PinIo>, policy: RetryPolicy) -> Self {
        Self {
            io: Mutex::new(io),
            policy,
        }
    }

    /// Waits for exclusive access to the bus.
    pub async fn acquire(&self) -> BusSession<'_> {
        BusSession {
            io: self.io.lock().await,
            policy: self.policy,
        }
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

/// Exclusive bus access with the retry policy applied to every operation.
///
/// Reads that exhaust their attempts fall back to a neutral value; writes
/// hand the last error back so the caller can log and abandon them.
pub struct BusSession<'a> {
    io: MutexGuard<'a, Box<dyn PinIo>>,
    policy: RetryPolicy,
}

impl BusSession<'_> {
    async fn retry<T>(
        &mut self,
        what: &str,
        mut op: impl FnMut(&mut Box<dyn PinIo>) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let mut attempt = 1;
        loop {
            match op(&mut *self.io) {
                Ok(value) => return Ok(value),
                Err(BusError::Released) => return Err(BusError::Released),
                Err(e) if attempt >= self.policy.attempts => {
                    debug!("{what}: giving up after {attempt} attempts: {e}");
                    return Err(e);
                }
                Err(e) => {
                    debug!("{what}: attempt {attempt} failed: {e}");
                    attempt += 1;
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }
    }

    pub async fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), BusError> {
        self.retry("set_pin_mode", |io| io.set_pin_mode(pin, mode))
            .await
    }

    /// Reads a digital input, returning `0` if every attempt fails.
    pub async fn read_digital(&mut self, pin: u8) -> u8 {
        match self.retry("digital_read", |io| io.digital_read(pin)).await {
            Ok(level) => level,
            Err(e) => {
                warn!("Digital read on pin {pin} defaulted to 0: {e}");
                0
            }
        }
    }

    pub async fn write_digital(&mut self, pin: u8, level: u8) -> Result<(), BusError> {
        self.retry("digital_write", |io| io.digital_write(pin, level))
            .await
    }

    pub async fn write_analog(&mut self, pin: u8, value: u8) -> Result<(), BusError> {
        self.retry("analog_write", |io| io.analog_write(pin, value))
            .await
    }

    pub async fn read_dht(&mut self, pin: u8) -> Result<(f32, f32), BusError> {
        self.retry("dht_read", |io| io.dht_read(pin)).await
    }

    pub async fn start_pwm(&mut self, pin: u8, frequency_hz: u32) -> Result<(), BusError> {
        self.retry("pwm_start", |io| io.pwm_start(pin, frequency_hz))
            .await
    }

    pub async fn write_duty(&mut self, pin: u8, duty_percent: f32) -> Result<(), BusError> {
        self.retry("pwm_duty", |io| io.pwm_duty(pin, duty_percent))
            .await
    }

    pub async fn stop_pwm(&mut self, pin: u8) -> Result<(), BusError> {
        self.retry("pwm_stop", |io| io.pwm_stop(pin)).await
    }

    /// Single attempt: a release that fails leaves nothing to retry against.
    pub fn release(&mut self) -> Result<(), BusError> {
        self.io.release()
    }
}
