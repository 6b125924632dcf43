//! Debounced button inputs.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Physical buttons on the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    /// Toggles the servo sweep.
    Servo,
    /// Cycles the fan through the speed ladder.
    Speed,
}

/// Turns a polled pin level into at most one press per physical press.
///
/// A press is accepted when the pin reads high and more than `interval` has
/// passed since the last accepted press. The first press is always accepted.
#[derive(Debug, Clone)]
pub struct Debouncer {
    interval: Duration,
    last_press: Option<Instant>,
}

impl Debouncer {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_press: None,
        }
    }

    /// Feeds one sample. Returns `true` if it counts as a new press.
    pub fn register(&mut self, pressed: bool, now: Instant) -> bool {
        if !pressed {
            return false;
        }

        let accepted = self
            .last_press
            .is_none_or(|last| now.saturating_duration_since(last) > self.interval);
        if accepted {
            self.last_press = Some(now);
        }
        accepted
    }
}

/// One debouncer per button, owned by the control loop.
#[derive(Debug, Clone)]
pub struct ButtonReader {
    pub servo_pin: u8,
    pub speed_pin: u8,
    servo: Debouncer,
    speed: Debouncer,
}

impl ButtonReader {
    pub const fn new(servo_pin: u8, speed_pin: u8, interval: Duration) -> Self {
        Self {
            servo_pin,
            speed_pin,
            servo: Debouncer::new(interval),
            speed: Debouncer::new(interval),
        }
    }

    /// Feeds one sample for `button`.
    pub fn register(&mut self, button: Button, level: u8, now: Instant) -> bool {
        let debouncer = match button {
            Button::Servo => &mut self.servo,
            Button::Speed => &mut self.speed,
        };
        debouncer.register(level == 1, now)
    }

    pub const fn pin(&self, button: Button) -> u8 {
        match button {
            Button::Servo => self.servo_pin,
            Button::Speed => self.speed_pin,
        }
    }
}
