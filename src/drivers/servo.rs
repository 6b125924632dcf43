use std::time::Duration;

use log::warn;

use crate::hardware::BusSession;

/// Duty written when a sweep begins, before the first angle step.
pub const SWEEP_START_DUTY: f32 = 2.5;

/// Hobby servo on a PWM channel.
///
/// 0° maps to 5% duty and 180° to 10%; a duty of 0 lets the horn go limp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoDriver {
    pub pin: u8,
    pub frequency_hz: u32,
    /// How long an angle write takes to physically complete.
    pub settle: Duration,
}

impl ServoDriver {
    pub const fn new(pin: u8, frequency_hz: u32, settle: Duration) -> Self {
        Self {
            pin,
            frequency_hz,
            settle,
        }
    }

    pub fn duty_for_angle(angle: i32) -> f32 {
        5.0 + (angle as f32 / 180.0) * 5.0
    }

    /// Starts the PWM channel with the output held low.
    pub async fn start(&self, bus: &mut BusSession<'_>) {
        if let Err(e) = bus.start_pwm(self.pin, self.frequency_hz).await {
            warn!("Servo PWM start failed: {e}");
        }
    }

    pub async fn write_angle(&self, bus: &mut BusSession<'_>, angle: i32) {
        self.write_duty(bus, Self::duty_for_angle(angle)).await;
    }

    pub async fn write_duty(&self, bus: &mut BusSession<'_>, duty: f32) {
        if let Err(e) = bus.write_duty(self.pin, duty).await {
            warn!("Servo duty {duty:.2}% abandoned: {e}");
        }
    }

    pub async fn stop(&self, bus: &mut BusSession<'_>) {
        if let Err(e) = bus.stop_pwm(self.pin).await {
            warn!("Servo PWM stop failed: {e}");
        }
    }

    /// Blocks the caller for the mechanical settle time.
    pub async fn settle(&self) {
        tokio::time::sleep(self.settle).await;
    }
}
