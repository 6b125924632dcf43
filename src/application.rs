//! Application entry point and builder.

use anyhow::Result;
use log::error;

use crate::{config::ConfigManager, coordinator::SystemCoordinator, hardware::PinIo};

/// The daemon as a whole.
///
/// # Example
///
/// ```no_run
/// use rigd::{application::Application, config::ConfigManager};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(None).await?;
/// let mut app = Application::builder()
///     .with_config_manager(config_manager)
///     .build()
///     .await?;
/// app.run().await
/// # }
/// ```
pub struct Application {
    pub coordinator: SystemCoordinator,
    config_manager: ConfigManager,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Runs the daemon to completion.
    ///
    /// The shutdown sequence runs on every exit path, including failed
    /// initialization; the run error, if any, takes precedence.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.run_services().await;
        if let Err(e) = &result {
            error!("{e:#}");
        }
        let shutdown = self.coordinator.shutdown().await;
        result.and(shutdown)
    }

    async fn run_services(&mut self) -> Result<()> {
        self.coordinator
            .initialize(self.config_manager.clone())
            .await?;
        self.coordinator.start_all_services().await?;
        self.coordinator.run_main_loop().await
    }
}

pub struct ApplicationBuilder {
    config_manager: Option<ConfigManager>,
    backend: Option<Box<dyn PinIo>>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config_manager: None,
            backend: None,
        }
    }

    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    /// Replaces the configured pin backend.
    pub fn with_backend(mut self, io: Box<dyn PinIo>) -> Self {
        self.backend = Some(io);
        self
    }

    pub async fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow::anyhow!("Configuration manager is required"))?;

        let mut coordinator = SystemCoordinator::new();
        if let Some(io) = self.backend {
            coordinator = coordinator.with_backend(io);
        }

        Ok(Application {
            coordinator,
            config_manager,
        })
    }
}
