//! The rig: device state plus the drivers that act on it.
//!
//! All mutation goes through one `Mutex<DeviceState>`. Functions taking
//! `&mut DeviceState` expect the caller to hold that guard; they acquire the
//! actuation lock themselves, so the lock order is always state, then bus.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    auto_mode::{AutoModeController, whole_degrees},
    config::Config,
    drivers::{FanDriver, SWEEP_START_DUTY, ServoDriver},
    error::SensorReadError,
    hardware::{ActuationLock, PinIo, PinMode, RetryPolicy},
    input::Button,
    state::{DeviceState, DeviceStatus, SpeedLadder},
    sweep::SweepBounds,
};

pub struct Rig {
    state: Mutex<DeviceState>,
    bus: ActuationLock,
    fan: FanDriver,
    servo: ServoDriver,
    auto: AutoModeController,
    sweep: SweepBounds,
    dwell: Duration,
    dht_pin: u8,
    input_pins: [u8; 2],
    shut_down: AtomicBool,
}

impl Rig {
    /// Builds the rig around `io`. No hardware is touched until
    /// [`initialize`](Self::initialize).
    pub fn from_config(config: &Config, io: Box<dyn PinIo>) -> Result<Self> {
        let ladder = SpeedLadder::new(config.speed_ladder.clone())
            .ok_or_else(|| anyhow!("Speed ladder cannot be empty"))?;

        Ok(Self {
            state: Mutex::new(DeviceState::new(ladder)),
            bus: ActuationLock::new(io, RetryPolicy::from(&config.io)),
            fan: FanDriver::from(&config.pins),
            servo: ServoDriver::new(
                config.pins.servo,
                config.servo_pwm_hz,
                Duration::from_millis(config.sweep.settle_ms),
            ),
            auto: AutoModeController::from(&config.auto),
            sweep: SweepBounds::from(&config.sweep),
            dwell: Duration::from_millis(config.sweep.dwell_ms),
            dht_pin: config.pins.dht,
            input_pins: [config.pins.button_servo, config.pins.button_speed],
            shut_down: AtomicBool::new(false),
        })
    }

    /// Configures pins, starts the servo PWM and parks both actuators.
    pub async fn initialize(&self) {
        info!("Initializing servo, motor, and sensor...");
        {
            let mut bus = self.bus.acquire().await;
            for pin in self.input_pins {
                if let Err(e) = bus.set_pin_mode(pin, PinMode::Input).await {
                    warn!("Pin {pin} left unconfigured: {e}");
                }
            }
            for pin in [self.fan.in1, self.fan.in2, self.fan.ena] {
                if let Err(e) = bus.set_pin_mode(pin, PinMode::Output).await {
                    warn!("Pin {pin} left unconfigured: {e}");
                }
            }
            self.servo.start(&mut bus).await;
        }

        let mut state = self.state.lock().await;
        self.set_servo_angle(&state, 0).await;
        self.set_fan_speed(&mut state, 0).await;
    }

    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().await
    }

    pub async fn status(&self) -> DeviceStatus {
        self.state.lock().await.status()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Clamps `target` to a valid duty, records it and drives the fan.
    pub(crate) async fn set_fan_speed(&self, state: &mut DeviceState, target: i32) {
        let speed = u8::try_from(target.clamp(0, i32::from(u8::MAX))).unwrap_or(u8::MAX);
        state.fan_speed = speed;
        let mut bus = self.bus.acquire().await;
        self.fan.drive(&mut bus, speed).await;
    }

    /// Moves the servo and waits for it to settle. No-op after shutdown.
    pub(crate) async fn set_servo_angle(&self, state: &DeviceState, angle: i32) {
        if !state.servo_active {
            return;
        }
        {
            let mut bus = self.bus.acquire().await;
            self.servo.write_angle(&mut bus, angle).await;
        }
        self.servo.settle().await;
    }

    pub(crate) async fn start_sweep(&self, state: &mut DeviceState) {
        state.servo_sweeping = true;
        if state.servo_active {
            let mut bus = self.bus.acquire().await;
            self.servo.write_duty(&mut bus, SWEEP_START_DUTY).await;
        }
    }

    pub(crate) async fn stop_sweep(&self, state: &mut DeviceState) {
        state.servo_sweeping = false;
        self.park_servo(state).await;
    }

    /// Returns the servo to 0° and drops its duty to zero.
    pub(crate) async fn park_servo(&self, state: &mut DeviceState) {
        state.servo_angle = 0;
        if !state.servo_active {
            return;
        }
        self.set_servo_angle(state, 0).await;
        let mut bus = self.bus.acquire().await;
        self.servo.write_duty(&mut bus, 0.0).await;
    }

    /// Re-evaluates the fan from the last known temperature, if any.
    pub(crate) async fn apply_auto_mode(&self, state: &mut DeviceState) {
        if let Some(temp) = state.current_temperature {
            let speed = self.auto.evaluate(temp);
            debug!("Auto mode: {temp}°C -> fan {speed}");
            self.set_fan_speed(state, i32::from(speed)).await;
        }
    }

    /// Advances the sweep by one step if it is running.
    ///
    /// Returns whether the servo is sweeping. When the step lands on a bound
    /// this holds for the dwell time, with the state lock released.
    pub async fn sweep_step(&self) -> bool {
        let dwell = {
            let mut state = self.state.lock().await;
            if !state.servo_sweeping {
                return false;
            }
            let step = self.sweep.advance(state.servo_angle, state.servo_direction);
            state.servo_angle = step.angle;
            state.servo_direction = step.heading;
            self.set_servo_angle(&state, step.angle).await;
            step.dwell
        };

        if dwell {
            tokio::time::sleep(self.dwell).await;
        }
        true
    }

    /// Reads the ambient sensor and, in auto mode, retunes the fan.
    ///
    /// On failure nothing in the device state changes.
    pub async fn sample_temperature(&self) -> Result<i32, SensorReadError> {
        let (raw, _humidity) = self.bus.acquire().await.read_dht(self.dht_pin).await?;
        let temp = whole_degrees(raw)?;

        let mut state = self.state.lock().await;
        state.current_temperature = Some(temp);
        if state.auto_mode {
            self.apply_auto_mode(&mut state).await;
        }
        Ok(temp)
    }

    pub async fn read_input(&self, pin: u8) -> u8 {
        self.bus.acquire().await.read_digital(pin).await
    }

    /// Applies a debounced button press.
    pub async fn press(&self, button: Button) {
        let mut state = self.state.lock().await;
        match button {
            Button::Servo => {
                if state.servo_sweeping {
                    self.stop_sweep(&mut state).await;
                } else {
                    self.start_sweep(&mut state).await;
                }
                state.auto_mode = false;
                info!(
                    "Servo button: sweep {}",
                    if state.servo_sweeping { "on" } else { "off" }
                );
            }
            Button::Speed => {
                let index = state.speed_ladder.next_index(state.speed_index);
                let speed = state.speed_ladder.get(index).unwrap_or_default();
                state.speed_index = index;
                self.set_fan_speed(&mut state, i32::from(speed)).await;
                info!("Speed button: step {index} (duty {speed})");
            }
        }
        state.touch();
    }

    /// Timer expiry: fan and servo off, back to manual, sweep stopped.
    /// Does nothing once shutdown has started.
    pub async fn force_idle(&self) {
        let mut state = self.state.lock().await;
        if self.is_shut_down() {
            debug!("Rig already shut down, skipping idle");
            return;
        }
        self.set_fan_speed(&mut state, 0).await;
        state.servo_sweeping = false;
        self.park_servo(&mut state).await;
        state.auto_mode = false;
    }

    /// Final actuator shutdown. Runs its sequence once; later calls return
    /// `false` without touching the hardware.
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Shutting down actuators");

        let mut state = self.state.lock().await;
        state.servo_active = false;
        state.servo_sweeping = false;
        self.set_fan_speed(&mut state, 0).await;

        let mut bus = self.bus.acquire().await;
        self.servo.write_duty(&mut bus, 0.0).await;
        self.servo.stop(&mut bus).await;
        if let Err(e) = bus.release() {
            warn!("Bus release failed: {e}");
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        hardware::{SimulatedBus, simulated::BusOp},
        state::{Heading, Mode},
    };
    use pretty_assertions::assert_eq;

    pub(crate) fn test_rig() -> (SimulatedBus, Rig) {
        test_rig_with(Config::default())
    }

    pub(crate) fn test_rig_with(config: Config) -> (SimulatedBus, Rig) {
        let bus = SimulatedBus::new(22.0, 0.0);
        let rig = Rig::from_config(&config, Box::new(bus.clone())).unwrap();
        (bus, rig)
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_configures_pins_and_parks() {
        let (bus, rig) = test_rig();
        rig.initialize().await;

        assert_eq!(bus.pin_mode(2), Some(PinMode::Input));
        assert_eq!(bus.pin_mode(7), Some(PinMode::Input));
        assert_eq!(bus.pin_mode(5), Some(PinMode::Output));
        assert_eq!(bus.pwm(18).unwrap().duty, 5.0);
        assert_eq!(bus.analog_value(5), Some(0));
        assert_eq!(bus.digital_level(4), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn fan_speed_is_clamped() {
        let (bus, rig) = test_rig();
        let mut state = rig.lock_state().await;

        rig.set_fan_speed(&mut state, 400).await;
        assert_eq!(state.fan_speed, 255);
        assert_eq!(bus.analog_value(5), Some(255));

        rig.set_fan_speed(&mut state, -20).await;
        assert_eq!(state.fan_speed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_runs_between_bounds() {
        let (bus, rig) = test_rig();
        rig.initialize().await;
        {
            let mut state = rig.lock_state().await;
            rig.start_sweep(&mut state).await;
        }
        assert_eq!(bus.pwm(18).unwrap().duty, SWEEP_START_DUTY);

        let mut seen = Vec::new();
        for _ in 0..200 {
            assert!(rig.sweep_step().await);
            seen.push(rig.status().await.servo_angle);
        }
        assert!(seen.iter().all(|a| (30..=150).contains(a)));
        assert!(seen.contains(&150));
        assert_eq!(seen[0], 30);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_servo_does_not_step() {
        let (bus, rig) = test_rig();
        rig.initialize().await;
        bus.clear_ops();

        assert!(!rig.sweep_step().await);
        assert!(bus.ops().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dwell_holds_at_bounds() {
        let (_bus, rig) = test_rig();
        {
            let mut state = rig.lock_state().await;
            state.servo_sweeping = true;
            state.servo_angle = 148;
            state.servo_direction = Heading::Up;
        }

        let started = tokio::time::Instant::now();
        rig.sweep_step().await;
        // settle + dwell
        assert!(started.elapsed() >= Duration::from_millis(350));
        assert_eq!(rig.status().await.servo_direction, Heading::Down);
    }

    #[tokio::test(start_paused = true)]
    async fn sample_updates_temperature_and_auto_fan() {
        let (bus, rig) = test_rig();
        bus.set_temperature(Some(29.4));
        rig.lock_state().await.auto_mode = true;

        assert_eq!(rig.sample_temperature().await, Ok(29));
        let status = rig.status().await;
        assert_eq!(status.temperature, Some(29));
        assert_eq!(status.fan_speed, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn sample_in_manual_mode_leaves_fan() {
        let (bus, rig) = test_rig();
        bus.set_temperature(Some(40.0));

        rig.sample_temperature().await.unwrap();
        assert_eq!(rig.status().await.fan_speed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sample_changes_nothing() {
        let (bus, rig) = test_rig();
        bus.set_temperature(Some(30.0));
        rig.sample_temperature().await.unwrap();

        bus.set_temperature(None);
        assert_eq!(
            rig.sample_temperature().await,
            Err(SensorReadError::NoReading)
        );
        bus.set_temperature(Some(300.0));
        assert!(rig.sample_temperature().await.is_err());
        bus.fail_next(3);
        assert!(matches!(
            rig.sample_temperature().await,
            Err(SensorReadError::Bus(_))
        ));

        assert_eq!(rig.status().await.temperature, Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn servo_button_toggles_and_leaves_auto() {
        let (bus, rig) = test_rig();
        rig.initialize().await;
        rig.lock_state().await.auto_mode = true;

        rig.press(Button::Servo).await;
        let status = rig.status().await;
        assert!(status.servo_sweeping);
        assert_eq!(status.mode, Mode::Manual);

        rig.press(Button::Servo).await;
        let status = rig.status().await;
        assert!(!status.servo_sweeping);
        assert_eq!(status.servo_angle, 0);
        assert_eq!(bus.pwm(18).unwrap().duty, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn speed_button_cycles_ladder() {
        let (bus, rig) = test_rig();
        let mut speeds = Vec::new();
        for _ in 0..5 {
            rig.press(Button::Speed).await;
            speeds.push(rig.status().await.fan_speed);
        }
        assert_eq!(speeds, vec![40, 50, 70, 0, 40]);
        assert_eq!(bus.analog_value(5), Some(40));
    }

    #[tokio::test(start_paused = true)]
    async fn speed_button_keeps_auto_mode() {
        let (_bus, rig) = test_rig();
        rig.lock_state().await.auto_mode = true;
        rig.press(Button::Speed).await;
        assert_eq!(rig.status().await.mode, Mode::Auto);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_runs_once() {
        let (bus, rig) = test_rig();
        rig.initialize().await;
        {
            let mut state = rig.lock_state().await;
            rig.set_fan_speed(&mut state, 70).await;
            rig.start_sweep(&mut state).await;
        }

        assert!(rig.shutdown().await);
        assert!(!rig.shutdown().await);

        let status = rig.status().await;
        assert_eq!(status.fan_speed, 0);
        assert!(!status.servo_active);
        assert!(!status.servo_sweeping);
        assert!(bus.is_released());
        let line = bus.pwm(18).unwrap();
        assert!(!line.running);
        assert_eq!(line.duty, 0.0);
        assert_eq!(
            bus.ops().iter().filter(|op| **op == BusOp::Release).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_shutdown_runs_once() {
        let (bus, rig) = test_rig();
        rig.initialize().await;
        let rig = std::sync::Arc::new(rig);

        let calls: Vec<_> = (0..2)
            .map(|_| {
                let rig = std::sync::Arc::clone(&rig);
                tokio::spawn(async move { rig.shutdown().await })
            })
            .collect();
        let mut ran = 0;
        for call in calls {
            if call.await.unwrap() {
                ran += 1;
            }
        }

        assert_eq!(ran, 1);
        assert_eq!(
            bus.ops().iter().filter(|op| **op == BusOp::Release).count(),
            1
        );
        assert_eq!(
            bus.ops().iter().filter(|op| **op == BusOp::PwmStop(18)).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn force_idle_after_shutdown_leaves_bus_alone() {
        let (bus, rig) = test_rig();
        rig.initialize().await;
        rig.shutdown().await;
        bus.clear_ops();

        rig.force_idle().await;
        assert!(bus.ops().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn servo_writes_are_noops_after_shutdown() {
        let (bus, rig) = test_rig();
        rig.initialize().await;
        rig.shutdown().await;
        bus.clear_ops();

        let mut state = rig.lock_state().await;
        rig.set_servo_angle(&state, 90).await;
        rig.start_sweep(&mut state).await;
        rig.park_servo(&mut state).await;
        assert!(bus.ops().is_empty());
    }
}
