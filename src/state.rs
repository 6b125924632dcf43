//! Shared device state record.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::CommandError;

/// Who drives the fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fan speed follows the temperature threshold ladder.
    Auto,
    /// Fan speed is whatever was last commanded.
    Manual,
}

impl Mode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            _ => Err(CommandError::invalid("Invalid mode")),
        }
    }
}

/// Direction of travel of the servo sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heading {
    Up,
    Down,
}

impl Heading {
    /// `+1` or `-1`.
    pub const fn sign(self) -> i32 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

/// Fixed, ordered list of fan duty values selectable by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedLadder(Vec<u8>);

impl SpeedLadder {
    /// Returns `None` for an empty ladder.
    pub fn new(steps: Vec<u8>) -> Option<Self> {
        (!steps.is_empty()).then_some(Self(steps))
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index after `index`, wrapping to the bottom rung.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.0.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Default for SpeedLadder {
    fn default() -> Self {
        Self(vec![0, 40, 50, 70])
    }
}

/// The single record of commanded and observed rig state.
///
/// Lives behind one mutex for the whole process; every writer (control loop,
/// command handlers, timers) takes that lock, so the last write wins.
#[derive(Debug, Clone)]
pub struct DeviceState {
    /// Last commanded fan duty.
    pub fan_speed: u8,
    pub speed_ladder: SpeedLadder,
    /// Index into the ladder. Temperature-driven writes bypass it.
    pub speed_index: usize,
    pub servo_sweeping: bool,
    pub servo_angle: i32,
    pub servo_direction: Heading,
    pub auto_mode: bool,
    pub current_temperature: Option<i32>,
    /// Time of the last externally initiated command.
    pub last_user_action_time: Instant,
    /// Cleared once, at shutdown; servo writes are no-ops afterwards.
    pub servo_active: bool,
}

impl DeviceState {
    /// Startup state: fan off, servo parked at 0°, manual mode.
    pub fn new(speed_ladder: SpeedLadder) -> Self {
        Self {
            fan_speed: 0,
            speed_ladder,
            speed_index: 0,
            servo_sweeping: false,
            servo_angle: 0,
            servo_direction: Heading::Up,
            auto_mode: false,
            current_temperature: None,
            last_user_action_time: Instant::now(),
            servo_active: true,
        }
    }

    pub const fn mode(&self) -> Mode {
        if self.auto_mode {
            Mode::Auto
        } else {
            Mode::Manual
        }
    }

    pub fn touch(&mut self) {
        self.last_user_action_time = Instant::now();
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            fan_speed: self.fan_speed,
            speed_index: self.speed_index,
            mode: self.mode(),
            servo_sweeping: self.servo_sweeping,
            servo_angle: self.servo_angle,
            servo_direction: self.servo_direction,
            temperature: self.current_temperature,
            servo_active: self.servo_active,
            idle_ms: u64::try_from(self.last_user_action_time.elapsed().as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

/// Serializable snapshot of [`DeviceState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub fan_speed: u8,
    pub speed_index: usize,
    pub mode: Mode,
    pub servo_sweeping: bool,
    pub servo_angle: i32,
    pub servo_direction: Heading,
    pub temperature: Option<i32>,
    pub servo_active: bool,
    /// Milliseconds since the last user command.
    pub idle_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn mode_parses_known_values_only() {
        assert_eq!("auto".parse::<Mode>(), Ok(Mode::Auto));
        assert_eq!("manual".parse::<Mode>(), Ok(Mode::Manual));
        assert_eq!(
            "turbo".parse::<Mode>(),
            Err(CommandError::invalid("Invalid mode"))
        );
        assert!("AUTO".parse::<Mode>().is_err());
    }

    #[test]
    fn empty_ladder_is_rejected() {
        assert!(SpeedLadder::new(vec![]).is_none());
    }

    #[test]
    fn ladder_wraps_to_bottom() {
        let ladder = SpeedLadder::default();
        assert_eq!(ladder.next_index(0), 1);
        assert_eq!(ladder.next_index(3), 0);
    }

    #[tokio::test]
    async fn fresh_state_is_idle() {
        let state = DeviceState::new(SpeedLadder::default());
        let status = state.status();

        assert_eq!(status.fan_speed, 0);
        assert_eq!(status.speed_index, 0);
        assert_eq!(status.mode, Mode::Manual);
        assert!(!status.servo_sweeping);
        assert_eq!(status.servo_angle, 0);
        assert_eq!(status.temperature, None);
        assert!(status.servo_active);
    }

    #[test]
    fn status_serializes_lowercase_enums() {
        let status = DeviceStatus {
            fan_speed: 40,
            speed_index: 1,
            mode: Mode::Auto,
            servo_sweeping: true,
            servo_angle: 90,
            servo_direction: Heading::Down,
            temperature: Some(27),
            servo_active: true,
            idle_ms: 0,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["mode"], "auto");
        assert_eq!(json["servo_direction"], "down");
        assert_eq!(json["temperature"], 27);
    }

    proptest! {
        #[test]
        fn next_index_stays_on_ladder(
            steps in prop::collection::vec(0u8..=255u8, 1..8),
            start in 0usize..8,
        ) {
            let ladder = SpeedLadder::new(steps).unwrap();
            let index = start % ladder.len();
            prop_assert!(ladder.next_index(index) < ladder.len());
        }
    }
}
