//! The periodic control tick: sample, poll buttons, step the sweep.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{debug, info};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    event::{Event, EventBus},
    input::{Button, ButtonReader},
    rig::Rig,
};

pub struct ControlLoop {
    rig: Arc<Rig>,
    buttons: ButtonReader,
    sweeping_tick: Duration,
    idle_tick: Duration,
    event_bus: EventBus,
    last_temperature: Option<i32>,
}

impl ControlLoop {
    pub fn new(rig: Arc<Rig>, config: &Config, event_bus: EventBus) -> Self {
        Self {
            rig,
            buttons: ButtonReader::new(
                config.pins.button_servo,
                config.pins.button_speed,
                Duration::from_millis(config.debounce_ms),
            ),
            sweeping_tick: config.control.sweeping_tick(),
            idle_tick: config.control.idle_tick(),
            event_bus,
            last_temperature: None,
        }
    }

    /// Runs one iteration and returns how long to wait before the next.
    pub async fn tick(&mut self) -> Duration {
        let now = Instant::now();

        match self.rig.sample_temperature().await {
            Ok(temp) if self.last_temperature != Some(temp) => {
                debug!("Ambient temperature {temp}°C");
                self.last_temperature = Some(temp);
                self.event_bus.notify(Event::TemperatureChanged(temp));
            }
            Ok(_) => {}
            Err(e) => debug!("Temperature sample skipped: {e}"),
        }

        for button in [Button::Servo, Button::Speed] {
            let level = self.rig.read_input(self.buttons.pin(button)).await;
            if self.buttons.register(button, level, now) {
                self.rig.press(button).await;
                self.event_bus.notify(Event::ButtonPressed(button));
            }
        }

        if self.rig.sweep_step().await {
            self.sweeping_tick
        } else {
            self.idle_tick
        }
    }

    /// Ticks until `cancel` fires. A tick in progress always completes.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!("Control loop started");
        loop {
            let pause = self.tick().await;
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }
        info!("Control loop stopped");
        Ok(())
    }
}
