//! In-memory pin backend.
//!
//! Stands in for the sensor-bus driver when none is linked, and gives tests a
//! handle to press buttons, change the ambient temperature, inject bus faults
//! and inspect everything that was written.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use super::pin_io::{PinIo, PinMode};
use crate::error::BusError;

/// One transaction as seen by the simulated bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusOp {
    PinMode(u8, PinMode),
    DigitalWrite(u8, u8),
    AnalogWrite(u8, u8),
    PwmStart(u8, u32),
    PwmDuty(u8, f32),
    PwmStop(u8),
    Release,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PwmLine {
    pub running: bool,
    pub frequency_hz: u32,
    pub duty: f32,
}

#[derive(Debug, Default)]
struct SimState {
    modes: HashMap<u8, PinMode>,
    inputs: HashMap<u8, u8>,
    outputs: HashMap<u8, u8>,
    analog: HashMap<u8, u8>,
    pwm: HashMap<u8, PwmLine>,
    temperature: Option<f32>,
    humidity: f32,
    fail_next: u32,
    failure_rate: f64,
    released: bool,
    log: Vec<BusOp>,
}

/// Cloneable handle to a shared simulated bus.
///
/// Every clone observes and drives the same pins, so a test can keep one
/// handle while the rig owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedBus {
    pub fn new(ambient: f32, failure_rate: f64) -> Self {
        let bus = Self::default();
        {
            let mut state = bus.state();
            state.temperature = Some(ambient);
            state.humidity = 40.0;
            state.failure_rate = failure_rate;
        }
        bus
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drives a digital input (e.g. holds a button down with `1`).
    pub fn set_input(&self, pin: u8, level: u8) {
        self.state().inputs.insert(pin, level);
    }

    /// `None` makes the sensor answer without a number.
    pub fn set_temperature(&self, celsius: Option<f32>) {
        self.state().temperature = celsius;
    }

    /// Fails the next `count` transactions, whatever they are.
    pub fn fail_next(&self, count: u32) {
        self.state().fail_next = count;
    }

    pub fn digital_level(&self, pin: u8) -> Option<u8> {
        self.state().outputs.get(&pin).copied()
    }

    pub fn analog_value(&self, pin: u8) -> Option<u8> {
        self.state().analog.get(&pin).copied()
    }

    pub fn pwm(&self, pin: u8) -> Option<PwmLine> {
        self.state().pwm.get(&pin).copied()
    }

    pub fn pin_mode(&self, pin: u8) -> Option<PinMode> {
        self.state().modes.get(&pin).copied()
    }

    pub fn is_released(&self) -> bool {
        self.state().released
    }

    /// Every successful transaction in order.
    pub fn ops(&self) -> Vec<BusOp> {
        self.state().log.clone()
    }

    pub fn clear_ops(&self) {
        self.state().log.clear();
    }

    fn transact<T>(
        &self,
        pin: u8,
        op: impl FnOnce(&mut SimState) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let mut state = self.state();
        if state.released {
            return Err(BusError::Released);
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(BusError::Io {
                pin,
                reason: "injected fault".into(),
            });
        }
        if state.failure_rate > 0.0 && rand::random::<f64>() < state.failure_rate {
            return Err(BusError::Io {
                pin,
                reason: "random fault".into(),
            });
        }
        op(&mut *state)
    }
}

impl PinIo for SimulatedBus {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<(), BusError> {
        self.transact(pin, |s| {
            s.modes.insert(pin, mode);
            s.log.push(BusOp::PinMode(pin, mode));
            Ok(())
        })
    }

    fn digital_read(&mut self, pin: u8) -> Result<u8, BusError> {
        self.transact(pin, |s| Ok(s.inputs.get(&pin).copied().unwrap_or(0)))
    }

    fn digital_write(&mut self, pin: u8, level: u8) -> Result<(), BusError> {
        self.transact(pin, |s| {
            s.outputs.insert(pin, level);
            s.log.push(BusOp::DigitalWrite(pin, level));
            Ok(())
        })
    }

    fn analog_write(&mut self, pin: u8, value: u8) -> Result<(), BusError> {
        self.transact(pin, |s| {
            s.analog.insert(pin, value);
            s.log.push(BusOp::AnalogWrite(pin, value));
            Ok(())
        })
    }

    fn dht_read(&mut self, pin: u8) -> Result<(f32, f32), BusError> {
        self.transact(pin, |s| {
            // A DHT that answers without data reports NaN, like the Grove driver.
            Ok((s.temperature.unwrap_or(f32::NAN), s.humidity))
        })
    }

    fn pwm_start(&mut self, pin: u8, frequency_hz: u32) -> Result<(), BusError> {
        self.transact(pin, |s| {
            s.pwm.insert(
                pin,
                PwmLine {
                    running: true,
                    frequency_hz,
                    duty: 0.0,
                },
            );
            s.log.push(BusOp::PwmStart(pin, frequency_hz));
            Ok(())
        })
    }

    fn pwm_duty(&mut self, pin: u8, duty_percent: f32) -> Result<(), BusError> {
        self.transact(pin, |s| {
            let line = s.pwm.get_mut(&pin).ok_or_else(|| BusError::Io {
                pin,
                reason: "pwm not started".into(),
            })?;
            line.duty = duty_percent;
            s.log.push(BusOp::PwmDuty(pin, duty_percent));
            Ok(())
        })
    }

    fn pwm_stop(&mut self, pin: u8) -> Result<(), BusError> {
        self.transact(pin, |s| {
            if let Some(line) = s.pwm.get_mut(&pin) {
                line.running = false;
            }
            s.log.push(BusOp::PwmStop(pin));
            Ok(())
        })
    }

    fn release(&mut self) -> Result<(), BusError> {
        let mut state = self.state();
        if !state.released {
            state.released = true;
            state.modes.clear();
            state.log.push(BusOp::Release);
        }
        Ok(())
    }
}
