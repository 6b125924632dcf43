//! Application state provider for dependency injection.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    app_context::AppState, config::ConfigManager, event::EventBus, hardware::PinIo,
    providers::traits::AsyncProvider,
};

/// Creates the shared [`AppState`].
///
/// Uses the configured backend unless one was injected with
/// [`with_backend`](Self::with_backend). An injected backend is consumed by
/// the first successful `provide`.
pub struct AppStateProvider {
    config_manager: ConfigManager,
    event_bus: EventBus,
    backend: Mutex<Option<Box<dyn PinIo>>>,
}

impl AppStateProvider {
    pub fn new(config_manager: ConfigManager, event_bus: EventBus) -> Self {
        Self {
            config_manager,
            event_bus,
            backend: Mutex::new(None),
        }
    }

    pub fn with_backend(self, io: Box<dyn PinIo>) -> Self {
        Self {
            backend: Mutex::new(Some(io)),
            ..self
        }
    }
}

#[async_trait]
impl AsyncProvider<Arc<AppState>> for AppStateProvider {
    async fn provide(&self) -> Result<Arc<AppState>> {
        let injected = self
            .backend
            .lock()
            .map_err(|_| anyhow::anyhow!("backend slot poisoned"))?
            .take();

        let state = match injected {
            Some(io) => {
                AppState::with_backend(self.config_manager.clone(), io, self.event_bus.clone())
                    .await?
            }
            None => AppState::new(self.config_manager.clone(), self.event_bus.clone()).await?,
        };
        Ok(Arc::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, hardware::SimulatedBus};

    #[tokio::test]
    async fn injected_backend_is_used() {
        let bus = SimulatedBus::default();
        let provider = AppStateProvider::new(
            ConfigManager::new(Config::default(), None),
            EventBus::new(),
        )
        .with_backend(Box::new(bus.clone()));

        let state = provider.provide().await.unwrap();
        state.rig.shutdown().await;
        assert!(bus.is_released());
    }

    #[tokio::test]
    async fn configured_backend_by_default() {
        let provider = AppStateProvider::new(
            ConfigManager::new(Config::default(), None),
            EventBus::new(),
        );
        let state = provider.provide().await.unwrap();
        assert!(!state.rig.is_shut_down());
    }
}
