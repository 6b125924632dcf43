//! # rigd
//!
//! A daemon for a small actuator rig: an H-bridge fan, a sweeping hobby
//! servo, two push buttons and a DHT temperature sensor on one shared bus.
//!
//! ## Features
//!
//! - **Async Architecture**: control loop, commands and timers are Tokio tasks
//! - **Single State Record**: one mutex-guarded device state, last write wins
//! - **Serialized Bus Access**: every pin transaction goes through the
//!   actuation lock with bounded retry
//! - **Auto Mode**: fan speed follows a temperature threshold ladder
//! - **Shutoff Timers**: independent one-shot timers that idle the rig
//! - **D-Bus Interface**: JSON command contract for remote control
//!
//! ## Architecture
//!
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - Lifecycle manager
//! - [`Rig`](rig::Rig) - Device state plus fan and servo drivers
//! - [`ControlLoop`](control_loop::ControlLoop) - Sampling, buttons and sweep
//! - [`CommandProcessor`](commands::CommandProcessor) - Remote commands
//! - [`EventBus`](event::EventBus) - Inter-service communication
//!
//! ## Example
//!
//! ```no_run
//! use rigd::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod api;
pub mod app_context;
pub mod application;
pub mod auto_mode;
pub mod cli;
pub mod commands;
pub mod config;
pub mod control_loop;
pub mod coordinator;
pub mod drivers;
pub mod error;
pub mod event;
pub mod hardware;
pub mod input;
pub mod interface;
pub mod providers;
pub mod rig;
pub mod state;
pub mod sweep;
pub mod task_manager;
pub mod timer;
