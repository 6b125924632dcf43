//! Temperature-driven fan speed selection.

use crate::{
    config::{AutoCfg, ThresholdCfg},
    error::SensorReadError,
};

/// Lowest and highest temperature a DHT sensor can report, exclusive.
const PLAUSIBLE_RANGE: (f32, f32) = (-40.0, 125.0);

/// Maps an ambient temperature onto a fan speed through a fixed ladder.
///
/// # Example
///
/// ```
/// use rigd::auto_mode::AutoModeController;
///
/// let auto = AutoModeController::default();
/// assert_eq!(auto.evaluate(24), 0);
/// assert_eq!(auto.evaluate(30), 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoModeController {
    /// Ascending by `from`.
    thresholds: Vec<ThresholdCfg>,
    idle_speed: u8,
}

impl Default for AutoModeController {
    fn default() -> Self {
        Self::from(&AutoCfg::default())
    }
}

impl From<&AutoCfg> for AutoModeController {
    fn from(cfg: &AutoCfg) -> Self {
        let mut thresholds = cfg.thresholds.clone();
        thresholds.sort_by_key(|t| t.from);
        Self {
            thresholds,
            idle_speed: cfg.idle_speed,
        }
    }
}

impl AutoModeController {
    /// Fan speed for `temp` °C: the highest threshold at or below it wins.
    pub fn evaluate(&self, temp: i32) -> u8 {
        self.thresholds
            .iter()
            .rev()
            .find(|t| temp >= t.from)
            .map_or(self.idle_speed, |t| t.speed)
    }
}

/// Validates a raw sensor reading and floors it to whole degrees.
///
/// Flooring keeps `24.9` below a threshold of `25`.
pub fn whole_degrees(raw: f32) -> Result<i32, SensorReadError> {
    if raw.is_nan() {
        return Err(SensorReadError::NoReading);
    }
    if raw <= PLAUSIBLE_RANGE.0 || raw >= PLAUSIBLE_RANGE.1 {
        return Err(SensorReadError::OutOfRange(raw));
    }
    // in range, so the cast cannot truncate
    Ok(raw.floor() as i32)
}
