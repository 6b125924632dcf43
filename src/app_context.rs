//! Shared application state.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLockReadGuard;

use crate::{
    commands::CommandProcessor,
    config::{Config, ConfigManager},
    event::EventBus,
    hardware::{self, PinIo},
    rig::Rig,
    timer::TimerRegistry,
};

/// Everything the services share: configuration, the rig, armed timers and
/// the command processor that fronts both.
pub struct AppState {
    pub config_manager: Arc<ConfigManager>,
    pub rig: Arc<Rig>,
    pub timers: Arc<TimerRegistry>,
    pub commands: Arc<CommandProcessor>,
}

impl AppState {
    /// Builds the state around the backend named in the configuration.
    pub async fn new(config_manager: ConfigManager, event_bus: EventBus) -> Result<Self> {
        let io = hardware::open_backend(&config_manager.get().await.backend);
        Self::with_backend(config_manager, io, event_bus).await
    }

    pub async fn with_backend(
        config_manager: ConfigManager,
        io: Box<dyn PinIo>,
        event_bus: EventBus,
    ) -> Result<Self> {
        let config = config_manager.clone_config().await;
        let rig = Arc::new(Rig::from_config(&config, io).context("Failed to build rig")?);
        let timers = Arc::new(TimerRegistry::new(event_bus));
        let commands = Arc::new(CommandProcessor::new(Arc::clone(&rig), Arc::clone(&timers)));

        Ok(Self {
            config_manager: Arc::new(config_manager),
            rig,
            timers,
            commands,
        })
    }

    pub async fn config(&self) -> RwLockReadGuard<'_, Config> {
        self.config_manager.get().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedBus;

    #[tokio::test]
    async fn state_shares_one_rig() {
        let state = AppState::with_backend(
            ConfigManager::new(Config::default(), None),
            Box::new(SimulatedBus::default()),
            EventBus::new(),
        )
        .await
        .unwrap();

        assert_eq!(Arc::strong_count(&state.rig), 2);
        assert!(state.config().await.dbus_enabled);
    }

    #[tokio::test]
    async fn empty_ladder_is_rejected() {
        let config = Config {
            speed_ladder: Vec::new(),
            ..Config::default()
        };
        let result = AppState::with_backend(
            ConfigManager::new(config, None),
            Box::new(SimulatedBus::default()),
            EventBus::new(),
        )
        .await;
        assert!(result.is_err());
    }
}
