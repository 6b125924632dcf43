//! Configuration management for the rigd daemon.
//!
//! Handles loading, parsing, and validation of the YAML file that describes
//! pin wiring, the fan speed ladder, loop cadences and the I/O retry policy.
//! Every field has a default matching the stock rig, so an empty file (or no
//! file at all) yields a working configuration.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;

/// Main configuration structure for the rigd daemon.
///
/// # Example
///
/// ```yaml
/// version: 1
/// speed_ladder: [0, 40, 50, 70]
/// debounce_ms: 300
/// pins:
///   button_servo: 2
///   button_speed: 7
///   motor_in1: 4
///   motor_in2: 8
///   motor_ena: 5
///   servo: 18
///   dht: 3
/// sweep:
///   min_angle: 30
///   max_angle: 150
/// backend:
///   kind: simulated
///   failure_rate: 0.05
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    #[serde(default = "defaults::version")]
    pub version: u8,

    /// Pin assignment on the sensor bus.
    #[serde(default)]
    pub pins: PinCfg,

    /// Discrete fan duty values selectable by index.
    #[serde(default = "defaults::speed_ladder")]
    pub speed_ladder: Vec<u8>,

    /// Minimum spacing between two accepted button presses.
    #[serde(default = "defaults::debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default)]
    pub control: ControlCfg,

    #[serde(default)]
    pub sweep: SweepCfg,

    #[serde(default)]
    pub io: IoCfg,

    #[serde(default)]
    pub auto: AutoCfg,

    /// PWM frequency of the servo channel.
    #[serde(default = "defaults::servo_pwm_hz")]
    pub servo_pwm_hz: u32,

    /// Whether to expose the command surface on the D-Bus session bus.
    #[serde(default = "defaults::dbus_enabled")]
    pub dbus_enabled: bool,

    #[serde(default)]
    pub backend: BackendCfg,
}

/// Sensor-bus pin numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinCfg {
    /// Button toggling the servo sweep.
    pub button_servo: u8,
    /// Button cycling the fan speed ladder.
    pub button_speed: u8,
    /// H-bridge direction input 1.
    pub motor_in1: u8,
    /// H-bridge direction input 2.
    pub motor_in2: u8,
    /// H-bridge enable (PWM-capable).
    pub motor_ena: u8,
    /// Servo PWM channel.
    pub servo: u8,
    /// Combined temperature/humidity sensor.
    pub dht: u8,
}

/// Control loop cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlCfg {
    #[serde(default = "defaults::sweeping_tick_ms")]
    pub sweeping_tick_ms: u64,
    #[serde(default = "defaults::idle_tick_ms")]
    pub idle_tick_ms: u64,
    /// Hold after hardware bring-up before services start.
    #[serde(default = "defaults::startup_delay_ms")]
    pub startup_delay_ms: u64,
}

/// Servo sweep geometry and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepCfg {
    #[serde(default = "defaults::min_angle")]
    pub min_angle: i32,
    #[serde(default = "defaults::max_angle")]
    pub max_angle: i32,
    #[serde(default = "defaults::step")]
    pub step: i32,
    /// Pause at each end of the sweep.
    #[serde(default = "defaults::dwell_ms")]
    pub dwell_ms: u64,
    /// Mechanical settle time after every angle write.
    #[serde(default = "defaults::settle_ms")]
    pub settle_ms: u64,
}

/// Bounded retry policy for bus transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoCfg {
    #[serde(default = "defaults::attempts")]
    pub attempts: u32,
    #[serde(default = "defaults::retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Temperature → fan speed ladder used in auto mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoCfg {
    #[serde(default = "defaults::thresholds")]
    pub thresholds: Vec<ThresholdCfg>,
    /// Speed below the first threshold.
    #[serde(default)]
    pub idle_speed: u8,
}

/// Fan speed applied from `from` degrees upward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThresholdCfg {
    pub from: i32,
    pub speed: u8,
}

/// Pin I/O backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackendCfg {
    /// In-memory bus with optional fault injection.
    Simulated {
        /// Probability that any single transaction fails.
        #[serde(default)]
        failure_rate: f64,
        /// Ambient temperature reported by the simulated DHT sensor.
        #[serde(default = "defaults::ambient")]
        ambient: f32,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: defaults::version(),
            pins: PinCfg::default(),
            speed_ladder: defaults::speed_ladder(),
            debounce_ms: defaults::debounce_ms(),
            control: ControlCfg::default(),
            sweep: SweepCfg::default(),
            io: IoCfg::default(),
            auto: AutoCfg::default(),
            servo_pwm_hz: defaults::servo_pwm_hz(),
            dbus_enabled: defaults::dbus_enabled(),
            backend: BackendCfg::default(),
        }
    }
}

impl Default for PinCfg {
    fn default() -> Self {
        Self {
            button_servo: 2,
            button_speed: 7,
            motor_in1: 4,
            motor_in2: 8,
            motor_ena: 5,
            servo: 18,
            dht: 3,
        }
    }
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            sweeping_tick_ms: defaults::sweeping_tick_ms(),
            idle_tick_ms: defaults::idle_tick_ms(),
            startup_delay_ms: defaults::startup_delay_ms(),
        }
    }
}

impl Default for SweepCfg {
    fn default() -> Self {
        Self {
            min_angle: defaults::min_angle(),
            max_angle: defaults::max_angle(),
            step: defaults::step(),
            dwell_ms: defaults::dwell_ms(),
            settle_ms: defaults::settle_ms(),
        }
    }
}

impl Default for IoCfg {
    fn default() -> Self {
        Self {
            attempts: defaults::attempts(),
            retry_delay_ms: defaults::retry_delay_ms(),
        }
    }
}

impl Default for AutoCfg {
    fn default() -> Self {
        Self {
            thresholds: defaults::thresholds(),
            idle_speed: 0,
        }
    }
}

impl Default for BackendCfg {
    fn default() -> Self {
        Self::Simulated {
            failure_rate: 0.0,
            ambient: defaults::ambient(),
        }
    }
}

impl ControlCfg {
    pub fn sweeping_tick(&self) -> Duration {
        Duration::from_millis(self.sweeping_tick_ms)
    }

    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

impl Config {
    /// Validates the configuration for consistency.
    ///
    /// # Example
    ///
    /// ```
    /// use rigd::config::Config;
    ///
    /// let config = Config::default();
    /// config.validate()?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            anyhow::bail!("Unsupported config version {}", self.version);
        }

        if self.speed_ladder.is_empty() {
            anyhow::bail!("Speed ladder cannot be empty");
        }

        let sweep = &self.sweep;
        if sweep.min_angle < 0 || sweep.max_angle > 180 {
            anyhow::bail!(
                "Sweep bounds {}..{} exceed the 0..180 servo range",
                sweep.min_angle,
                sweep.max_angle
            );
        }
        if sweep.min_angle >= sweep.max_angle {
            anyhow::bail!(
                "Sweep min_angle ({}) must be below max_angle ({})",
                sweep.min_angle,
                sweep.max_angle
            );
        }
        if sweep.step <= 0 {
            anyhow::bail!("Sweep step must be positive, got {}", sweep.step);
        }

        if self
            .auto
            .thresholds
            .windows(2)
            .any(|pair| pair[0].from >= pair[1].from)
        {
            anyhow::bail!("Auto thresholds must be strictly ascending");
        }

        if self.io.attempts == 0 {
            anyhow::bail!("I/O attempts must be at least 1");
        }

        let BackendCfg::Simulated { failure_rate, .. } = &self.backend;
        if !(0.0..1.0).contains(failure_rate) {
            anyhow::bail!("Simulated failure_rate {failure_rate} must be in [0, 1)");
        }

        let pins = &self.pins;
        let all = [
            pins.button_servo,
            pins.button_speed,
            pins.motor_in1,
            pins.motor_in2,
            pins.motor_ena,
            pins.servo,
            pins.dht,
        ];
        let unique: HashSet<u8> = all.iter().copied().collect();
        if unique.len() != all.len() {
            anyhow::bail!("Pin assignment contains duplicates: {all:?}");
        }

        Ok(())
    }
}

mod defaults {
    use super::ThresholdCfg;

    pub fn version() -> u8 {
        1
    }

    pub fn speed_ladder() -> Vec<u8> {
        vec![0, 40, 50, 70]
    }

    pub fn debounce_ms() -> u64 {
        300
    }

    pub fn sweeping_tick_ms() -> u64 {
        50
    }

    pub fn idle_tick_ms() -> u64 {
        500
    }

    pub fn startup_delay_ms() -> u64 {
        1000
    }

    pub fn min_angle() -> i32 {
        30
    }

    pub fn max_angle() -> i32 {
        150
    }

    pub fn step() -> i32 {
        2
    }

    pub fn dwell_ms() -> u64 {
        300
    }

    pub fn settle_ms() -> u64 {
        50
    }

    pub fn attempts() -> u32 {
        3
    }

    pub fn retry_delay_ms() -> u64 {
        100
    }

    pub fn thresholds() -> Vec<ThresholdCfg> {
        vec![
            ThresholdCfg { from: 25, speed: 40 },
            ThresholdCfg { from: 28, speed: 50 },
            ThresholdCfg { from: 32, speed: 70 },
        ]
    }

    pub fn servo_pwm_hz() -> u32 {
        50
    }

    pub fn dbus_enabled() -> bool {
        true
    }

    pub fn ambient() -> f32 {
        26.0
    }
}

fn locate_config() -> Option<PathBuf> {
    if let Ok(env_path) = env::var("RIGD_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("rigd/config.yml");
        if cfg_dir.exists() {
            return Some(cfg_dir);
        }
    }

    let etc = Path::new("/etc/rigd/config.yml");
    etc.exists().then(|| etc.to_path_buf())
}

/// Configuration manager that owns the loaded config and where it came from.
///
/// # Example
///
/// ```no_run
/// use rigd::config::ConfigManager;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(None).await?;
/// let ladder = config_manager.get().await.speed_ladder.clone();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: Option<PathBuf>,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and source path.
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from file or standard locations.
    ///
    /// Searches in the following order:
    /// 1. Provided path parameter
    /// 2. RIGD_CONFIG environment variable
    /// 3. XDG_CONFIG_HOME/rigd/config.yml or ~/.config/rigd/config.yml
    /// 4. /etc/rigd/config.yml
    ///
    /// Falls back to built-in defaults when no file is found. An explicit
    /// path that cannot be read is an error.
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let Some(config_path) = path.or_else(locate_config) else {
            warn!("No configuration file found, using built-in defaults");
            return Ok(Self::new(Config::default(), None));
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path)?;

        Ok(Self::new(config, Some(config_path)))
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Returns the file the configuration was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Clones the current configuration.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}
