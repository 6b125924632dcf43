use log::{debug, warn};

use crate::{config::PinCfg, hardware::BusSession};

/// H-bridge fan: two direction pins plus a PWM-capable enable pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanDriver {
    pub in1: u8,
    pub in2: u8,
    pub ena: u8,
}

impl From<&PinCfg> for FanDriver {
    fn from(pins: &PinCfg) -> Self {
        Self {
            in1: pins.motor_in1,
            in2: pins.motor_in2,
            ena: pins.motor_ena,
        }
    }
}

impl FanDriver {
    /// Drives the fan forward at `speed`.
    ///
    /// A speed of zero also pulls both direction pins low: a motor left with
    /// its direction asserted can coast or chatter at zero duty.
    /// Failed writes are logged and skipped; the remaining writes still go out.
    pub async fn drive(&self, bus: &mut BusSession<'_>, speed: u8) {
        debug!("Fan duty -> {speed}");

        let mut writes = vec![
            bus.write_digital(self.in1, 1).await,
            bus.write_digital(self.in2, 0).await,
            bus.write_analog(self.ena, speed).await,
        ];
        if speed == 0 {
            writes.push(bus.write_digital(self.in1, 0).await);
            writes.push(bus.write_digital(self.in2, 0).await);
        }

        for e in writes.into_iter().filter_map(Result::err) {
            warn!("Fan write abandoned: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{
        ActuationLock, RetryPolicy, SimulatedBus, simulated::BusOp,
    };
    use pretty_assertions::assert_eq;

    fn rig_bus() -> (SimulatedBus, ActuationLock) {
        let bus = SimulatedBus::new(22.0, 0.0);
        let lock = ActuationLock::new(Box::new(bus.clone()), RetryPolicy::default());
        (bus, lock)
    }

    #[tokio::test]
    async fn nonzero_speed_drives_forward() {
        let (bus, lock) = rig_bus();
        FanDriver::from(&PinCfg::default())
            .drive(&mut lock.acquire().await, 50)
            .await;

        assert_eq!(
            bus.ops(),
            vec![
                BusOp::DigitalWrite(4, 1),
                BusOp::DigitalWrite(8, 0),
                BusOp::AnalogWrite(5, 50),
            ]
        );
    }

    #[tokio::test]
    async fn zero_speed_releases_direction_pins() {
        let (bus, lock) = rig_bus();
        FanDriver::from(&PinCfg::default())
            .drive(&mut lock.acquire().await, 0)
            .await;

        assert_eq!(bus.analog_value(5), Some(0));
        assert_eq!(bus.digital_level(4), Some(0));
        assert_eq!(bus.digital_level(8), Some(0));
        assert_eq!(bus.ops().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_does_not_stop_the_rest() {
        let (bus, lock) = rig_bus();
        // exhausts every attempt of the first write
        bus.fail_next(3);
        FanDriver::from(&PinCfg::default())
            .drive(&mut lock.acquire().await, 70)
            .await;

        assert_eq!(bus.digital_level(4), None);
        assert_eq!(bus.digital_level(8), Some(0));
        assert_eq!(bus.analog_value(5), Some(70));
    }
}
