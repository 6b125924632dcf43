//! Control loop service provider.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    app_context::AppState, control_loop::ControlLoop, event::EventBus,
    providers::traits::ServiceProvider, task_manager::TaskManager,
};

/// Runs the [`ControlLoop`] for the lifetime of the daemon.
///
/// Without it the buttons and the sweep are dead, so it is critical.
pub struct ControlLoopServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl ControlLoopServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for ControlLoopServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let control = ControlLoop::new(
            Arc::clone(&self.state.rig),
            &*self.state.config().await,
            self.event_bus.clone(),
        );
        task_manager.spawn(self.name(), |cancel_token| control.run(cancel_token));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ControlLoop"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}
