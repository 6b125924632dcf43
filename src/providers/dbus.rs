//! D-Bus service provider for dependency injection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zbus::Connection;

use crate::{
    app_context::AppState, event::EventBus, interface::RigInterface,
    providers::traits::ServiceProvider, task_manager::TaskManager,
};

pub const BUS_NAME: &str = "io.github.rigd";
pub const OBJECT_PATH: &str = "/io/github/rigd";

/// Publishes [`RigInterface`] on the session bus.
///
/// Remote control is optional: the rig keeps running on its buttons when the
/// bus is missing, so this service is not critical.
pub struct DBusServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
}

impl DBusServiceProvider {
    pub async fn new(state: Arc<AppState>, event_bus: EventBus) -> Result<Self> {
        let connection = Connection::session()
            .await
            .context("Failed to connect to the session bus")?;
        Ok(Self {
            state,
            event_bus,
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let interface = RigInterface::new(
            Arc::clone(&self.state.commands),
            env!("CARGO_PKG_VERSION").to_string(),
            self.event_bus.clone(),
        );
        self.connection
            .object_server()
            .at(OBJECT_PATH, interface)
            .await?;
        self.connection
            .request_name(BUS_NAME)
            .await
            .with_context(|| format!("Failed to acquire {BUS_NAME}"))?;

        let connection = self.connection.clone();
        task_manager.spawn(self.name(), |cancel_token| {
            run_dbus_service(connection, cancel_token)
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        8
    }
}

/// Keeps the connection open until cancelled, then gives the name back.
async fn run_dbus_service(connection: Connection, cancel_token: CancellationToken) -> Result<()> {
    info!("D-Bus interface at {OBJECT_PATH} as {BUS_NAME}");
    cancel_token.cancelled().await;

    connection.object_server().remove::<RigInterface, _>(OBJECT_PATH).await?;
    connection.release_name(BUS_NAME).await?;
    info!("D-Bus service cancelled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager},
        hardware::SimulatedBus,
    };

    #[tokio::test]
    async fn provider_is_optional() {
        let state = Arc::new(
            AppState::with_backend(
                ConfigManager::new(Config::default(), None),
                Box::new(SimulatedBus::default()),
                EventBus::new(),
            )
            .await
            .unwrap(),
        );

        // A session bus is not guaranteed in test environments.
        match DBusServiceProvider::new(state, EventBus::new()).await {
            Ok(provider) => {
                assert_eq!(provider.name(), "DBusService");
                assert_eq!(provider.priority(), 8);
                assert!(!provider.is_critical());
            }
            Err(e) => assert!(format!("{e:#}").contains("session bus")),
        }
    }
}
