//! One-shot shutoff timers.
//!
//! Each armed timer is its own task. Timers never replace each other: arming
//! a second one leaves the first running, and whichever expires first idles
//! the rig.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use log::{debug, info};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    event::{Event, EventBus},
    rig::Rig,
};

/// Receipt for an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArmedTimer {
    pub id: Uuid,
    pub after: Duration,
}

pub struct TimerRegistry {
    active: DashMap<Uuid, CancellationToken>,
    root: CancellationToken,
    event_bus: EventBus,
}

impl TimerRegistry {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            active: DashMap::new(),
            root: CancellationToken::new(),
            event_bus,
        }
    }

    /// Schedules `rig` to be idled after `after`.
    pub fn arm(self: &Arc<Self>, rig: Arc<Rig>, after: Duration) -> ArmedTimer {
        let id = Uuid::new_v4();
        let token = self.root.child_token();
        self.active.insert(id, token.clone());

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => debug!("Timer {id} cancelled"),
                () = tokio::time::sleep(after) => {
                    info!("Timer {id} expired, stopping fan and servo");
                    rig.force_idle().await;
                    registry.event_bus.notify(Event::TimerExpired { id });
                }
            }
            registry.active.remove(&id);
        });

        info!("Timer {id} armed for {}s", after.as_secs());
        self.event_bus.notify(Event::TimerArmed { id, after });
        ArmedTimer { id, after }
    }

    pub fn cancel(&self, id: Uuid) -> bool {
        self.active
            .remove(&id)
            .map(|(_, token)| token.cancel())
            .is_some()
    }

    /// Cancels every pending timer, including ones armed afterwards.
    pub fn cancel_all(&self) {
        if !self.root.is_cancelled() {
            debug!("Cancelling {} pending timers", self.active.len());
        }
        self.root.cancel();
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rig::tests::test_rig, state::Mode};
    use pretty_assertions::assert_eq;

    fn setup() -> (Arc<Rig>, Arc<TimerRegistry>) {
        let (_bus, rig) = test_rig();
        (Arc::new(rig), Arc::new(TimerRegistry::new(EventBus::new())))
    }

    async fn run_fan(rig: &Rig) {
        let mut state = rig.lock_state().await;
        state.auto_mode = true;
        rig.set_fan_speed(&mut state, 70).await;
    }

    #[tokio::test(start_paused = true)]
    async fn one_minute_timer_idles_rig() {
        let (rig, timers) = setup();
        rig.initialize().await;
        run_fan(&rig).await;

        timers.arm(Arc::clone(&rig), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(rig.status().await.fan_speed, 70);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let status = rig.status().await;
        assert_eq!(status.fan_speed, 0);
        assert_eq!(status.mode, Mode::Manual);
        assert!(!status.servo_sweeping);
        assert_eq!(timers.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_timers_both_fire() {
        let (rig, timers) = setup();
        let mut events = timers.event_bus.subscribe();

        let first = timers.arm(Arc::clone(&rig), Duration::from_secs(60));
        let second = timers.arm(Arc::clone(&rig), Duration::from_secs(120));
        assert_ne!(first.id, second.id);
        assert_eq!(timers.active(), 2);

        tokio::time::sleep(Duration::from_secs(61)).await;
        run_fan(&rig).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(rig.status().await.fan_speed, 0);
        let expired: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e {
                Event::TimerExpired { id } => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(expired, vec![first.id, second.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_does_not_fire() {
        let (rig, timers) = setup();
        run_fan(&rig).await;

        let armed = timers.arm(Arc::clone(&rig), Duration::from_secs(60));
        assert!(timers.cancel(armed.id));
        assert!(!timers.cancel(armed.id));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(rig.status().await.fan_speed, 70);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_pending_timers() {
        let (rig, timers) = setup();
        run_fan(&rig).await;
        timers.arm(Arc::clone(&rig), Duration::from_secs(60));
        timers.arm(Arc::clone(&rig), Duration::from_secs(90));

        timers.cancel_all();
        tokio::time::sleep(Duration::from_secs(100)).await;

        assert_eq!(rig.status().await.fan_speed, 70);
        assert_eq!(timers.active(), 0);
    }
}
