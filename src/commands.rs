//! Remote command handling.
//!
//! Each operation validates its input, applies it under the state lock and
//! records the user action. Rejections are [`CommandError`]s.

use std::{sync::Arc, time::Duration};

use log::info;

use crate::{
    error::{CommandError, CommandResult},
    rig::Rig,
    state::{DeviceStatus, Mode},
    timer::{ArmedTimer, TimerRegistry},
};

/// Reported when no temperature has been sampled or set yet.
pub const DEFAULT_REPORTED_TEMPERATURE: i32 = 35;

/// What a `servo` command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoAction {
    On,
    Off,
}

impl ServoAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl std::str::FromStr for ServoAction {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            _ => Err(CommandError::invalid("Invalid action")),
        }
    }
}

pub struct CommandProcessor {
    rig: Arc<Rig>,
    timers: Arc<TimerRegistry>,
}

impl CommandProcessor {
    pub fn new(rig: Arc<Rig>, timers: Arc<TimerRegistry>) -> Self {
        Self { rig, timers }
    }

    fn ensure_running(&self) -> CommandResult<()> {
        if self.rig.is_shut_down() {
            return Err(CommandError::Processing("Rig is shutting down".into()));
        }
        Ok(())
    }

    /// Selects ladder step `step` and drives the fan to it.
    pub async fn set_fan_step(&self, step: i64) -> CommandResult<u8> {
        self.ensure_running()?;
        let mut state = self.rig.lock_state().await;

        let (index, speed) = usize::try_from(step)
            .ok()
            .and_then(|index| Some((index, state.speed_ladder.get(index)?)))
            .ok_or_else(|| CommandError::invalid("Invalid step"))?;

        state.speed_index = index;
        self.rig.set_fan_speed(&mut state, i32::from(speed)).await;
        state.touch();
        info!("Fan step {index} (duty {speed})");
        Ok(speed)
    }

    /// Switches between manual and auto. Entering auto re-evaluates the fan
    /// from the last known temperature right away.
    pub async fn set_mode(&self, mode: &str) -> CommandResult<Mode> {
        let mode: Mode = mode.parse()?;
        self.ensure_running()?;
        let mut state = self.rig.lock_state().await;

        state.auto_mode = mode == Mode::Auto;
        if state.auto_mode {
            self.rig.apply_auto_mode(&mut state).await;
        }
        state.touch();
        info!("Mode -> {mode}");
        Ok(mode)
    }

    /// Fan off, servo parked, manual mode. Safe to repeat.
    pub async fn power_off(&self) -> CommandResult<()> {
        self.ensure_running()?;
        let mut state = self.rig.lock_state().await;

        state.speed_index = 0;
        self.rig.set_fan_speed(&mut state, 0).await;
        state.auto_mode = false;
        self.rig.stop_sweep(&mut state).await;
        state.touch();
        info!("Power off");
        Ok(())
    }

    /// Records a user action that changes nothing else.
    pub async fn acknowledge(&self) {
        self.rig.lock_state().await.touch();
    }

    pub async fn temperature(&self) -> i32 {
        self.rig
            .lock_state()
            .await
            .current_temperature
            .unwrap_or(DEFAULT_REPORTED_TEMPERATURE)
    }

    /// Overrides the current temperature until the next sensor sample.
    pub async fn set_temperature(&self, temperature: Option<i64>) -> CommandResult<i32> {
        let temperature = temperature.ok_or_else(|| CommandError::invalid("Missing temperature"))?;
        let temperature =
            i32::try_from(temperature).map_err(|_| CommandError::invalid("Invalid temperature"))?;
        self.ensure_running()?;

        let mut state = self.rig.lock_state().await;
        state.current_temperature = Some(temperature);
        state.touch();
        info!("Temperature override {temperature}°C");
        Ok(temperature)
    }

    /// Starts or stops the sweep. Either way the rig leaves auto mode.
    pub async fn servo(&self, action: &str) -> CommandResult<ServoAction> {
        let action: ServoAction = action.parse()?;
        self.ensure_running()?;
        let mut state = self.rig.lock_state().await;

        match action {
            ServoAction::On => self.rig.start_sweep(&mut state).await,
            ServoAction::Off => self.rig.stop_sweep(&mut state).await,
        }
        state.auto_mode = false;
        state.touch();
        info!("Servo sweep {action:?}");
        Ok(action)
    }

    /// Arms a shutoff timer `hours`h `minutes`m from now.
    pub async fn arm_timer(&self, hours: i64, minutes: i64) -> CommandResult<ArmedTimer> {
        let total_secs = hours
            .checked_mul(3600)
            .zip(minutes.checked_mul(60))
            .and_then(|(h, m)| h.checked_add(m))
            .ok_or_else(|| CommandError::invalid("Timer duration out of range"))?;
        let total_secs = u64::try_from(total_secs)
            .ok()
            .filter(|&secs| secs > 0)
            .ok_or_else(|| CommandError::invalid("Timer must be greater than 0"))?;
        self.ensure_running()?;

        let armed = self
            .timers
            .arm(Arc::clone(&self.rig), Duration::from_secs(total_secs));
        self.rig.lock_state().await.touch();
        Ok(armed)
    }

    pub async fn status(&self) -> DeviceStatus {
        self.rig.status().await
    }
}
