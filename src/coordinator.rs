//! System coordinator for service lifecycle and dependency injection.

use std::{ops::ControlFlow, sync::Arc};

use anyhow::{Context, Result, anyhow};
use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    app_context::AppState,
    config::ConfigManager,
    event::{Event, EventBus},
    hardware::PinIo,
    providers::{
        AppStateProvider, AsyncProvider, ControlLoopServiceProvider, DBusServiceProvider,
        ServiceProvider,
    },
    task_manager::{TaskExit, TaskManager},
};

/// Owns the services and drives the daemon from bring-up to shutdown.
///
/// ```text
/// initialize -> start_all_services -> run_main_loop -> shutdown
/// ```
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
    backend: Option<Box<dyn PinIo>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
            backend: None,
        }
    }

    /// Uses `io` instead of the backend named in the configuration.
    pub fn with_backend(mut self, io: Box<dyn PinIo>) -> Self {
        self.backend = Some(io);
        self
    }

    /// Builds the shared state, brings the hardware to its rest position and
    /// registers the services.
    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let mut provider = AppStateProvider::new(config_manager, self.event_bus.clone());
        if let Some(io) = self.backend.take() {
            provider = provider.with_backend(io);
        }
        let state = provider
            .provide()
            .await
            .context("Failed to initialize application state")?;
        self.shared_state = Some(Arc::clone(&state));

        state.rig.initialize().await;
        let startup_delay = state.config().await.control.startup_delay();
        tokio::time::sleep(startup_delay).await;
        info!("Hardware initialized");

        self.register_service_providers(state).await;
        info!("SystemCoordinator initialization completed");
        Ok(())
    }

    async fn register_service_providers(&mut self, state: Arc<AppState>) {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![Box::new(
            ControlLoopServiceProvider::new(Arc::clone(&state), self.event_bus.clone()),
        )];

        if state.config().await.dbus_enabled {
            match DBusServiceProvider::new(Arc::clone(&state), self.event_bus.clone()).await {
                Ok(provider) => providers.push(Box::new(provider)),
                Err(e) => warn!("{e:#}, skipping D-Bus service"),
            }
        }

        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        self.service_providers = providers;
        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
    }

    pub async fn start_all_services(&mut self) -> Result<()> {
        for provider in &self.service_providers {
            let is_critical = provider.is_critical();

            match provider.start(&mut self.task_manager).await {
                Ok(()) => info!(
                    "Service '{}' started (priority: {}, critical: {})",
                    provider.name(),
                    provider.priority(),
                    is_critical
                ),
                Err(e) if is_critical => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => warn!(
                    "Non-critical service '{}' failed to start: {e:#}",
                    provider.name()
                ),
            }
        }
        Ok(())
    }

    /// Runs until Ctrl-C, SIGTERM, a [`Event::SystemShutdown`] or the exit of
    /// a critical service. Does not shut down by itself.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        info!("Starting main event loop");

        loop {
            let flow = tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl+C")?;
                    info!("Received Ctrl+C, initiating graceful shutdown...");
                    ControlFlow::Break(Ok(()))
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown...");
                    ControlFlow::Break(Ok(()))
                }
                event = event_rx.recv() => self.handle_event(event),
                Some(exit) = self.task_manager.next_exit(), if !self.task_manager.is_empty() => {
                    self.handle_task_exit(exit)
                }
            };
            if let ControlFlow::Break(result) = flow {
                info!("Main event loop terminated");
                return result;
            }
        }
    }

    fn handle_event(&self, event: Result<Event, RecvError>) -> ControlFlow<Result<()>> {
        match event {
            Ok(Event::SystemShutdown) => {
                info!("Processing SystemShutdown event");
                ControlFlow::Break(Ok(()))
            }
            Ok(event) => {
                debug!("Received event: {event:?}");
                ControlFlow::Continue(())
            }
            Err(RecvError::Closed) => {
                ControlFlow::Break(Err(anyhow!("Event bus channel closed unexpectedly")))
            }
            Err(RecvError::Lagged(n)) => {
                warn!("Event bus lagged by {n} messages");
                ControlFlow::Continue(())
            }
        }
    }

    fn handle_task_exit(&self, exit: TaskExit) -> ControlFlow<Result<()>> {
        let critical = self
            .service_providers
            .iter()
            .any(|p| p.is_critical() && p.name() == exit.name);

        match (critical, exit.result) {
            (true, Ok(())) => {
                ControlFlow::Break(Err(anyhow!("Critical service '{}' stopped", exit.name)))
            }
            (true, Err(e)) => ControlFlow::Break(
                Err(e).context(format!("Critical service '{}' failed", exit.name)),
            ),
            (false, Ok(())) => {
                info!("Service '{}' finished", exit.name);
                ControlFlow::Continue(())
            }
            (false, Err(e)) => {
                warn!("Service '{}' failed: {e:#}", exit.name);
                ControlFlow::Continue(())
            }
        }
    }

    /// Stops services, cancels pending timers and parks the hardware.
    ///
    /// Safe to call repeatedly and before initialization.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.task_manager.shutdown_all().await {
            error!("Error during task shutdown: {e:#}");
        }

        let Some(state) = &self.shared_state else {
            info!("Shutdown complete (nothing was initialized)");
            return Ok(());
        };
        state.timers.cancel_all();
        if state.rig.shutdown().await {
            info!("Shutdown complete");
        }
        Ok(())
    }

    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn state(&self) -> Option<&Arc<AppState>> {
        self.shared_state.as_ref()
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }
}
