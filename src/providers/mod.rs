//! Dependency injection providers for service management.
//!
//! The coordinator builds the shared state through [`AppStateProvider`] and
//! starts each [`ServiceProvider`] in priority order.

pub mod app_state;
pub mod control_loop;
pub mod dbus;
pub mod traits;

pub use app_state::AppStateProvider;
pub use control_loop::ControlLoopServiceProvider;
pub use dbus::DBusServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager},
        event::EventBus,
        hardware::SimulatedBus,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn control_loop_outranks_dbus() {
        let state = AppStateProvider::new(
            ConfigManager::new(Config::default(), None),
            EventBus::new(),
        )
        .with_backend(Box::new(SimulatedBus::default()))
        .provide()
        .await
        .unwrap();

        let control = ControlLoopServiceProvider::new(Arc::clone(&state), EventBus::new());
        assert_eq!(control.name(), "ControlLoop");
        assert_eq!(control.priority(), 10);

        if let Ok(dbus) = DBusServiceProvider::new(state, EventBus::new()).await {
            assert!(control.priority() > dbus.priority());
            assert!(control.is_critical() && !dbus.is_critical());
        }
    }
}
