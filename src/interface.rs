use std::sync::Arc;

use log::warn;
use serde_json::Value;
use zbus::{interface, object_server::SignalEmitter};

use crate::{
    api::{self, ApiResponse, Method},
    commands::CommandProcessor,
    event::{Event, EventBus},
};

pub struct RigInterface {
    commands: Arc<CommandProcessor>,
    event_bus: EventBus,
    version: String,
}

impl RigInterface {
    pub fn new(commands: Arc<CommandProcessor>, version: String, event_bus: EventBus) -> Self {
        Self {
            commands,
            event_bus,
            version,
        }
    }

    /// Runs one command-contract request. `body` is JSON text; empty means
    /// no body.
    pub async fn handle(&self, method: &str, route: &str, body: &str) -> ApiResponse {
        let method: Method = match method.parse() {
            Ok(method) => method,
            Err(_) => return ApiResponse::error(405, "Method not allowed"),
        };
        let body = match body.trim() {
            "" => None,
            text => match serde_json::from_str::<Value>(text) {
                Ok(value) => Some(value),
                Err(e) => return ApiResponse::error(400, format!("Malformed JSON: {e}")),
            },
        };
        api::dispatch(&self.commands, method, route, body.as_ref()).await
    }
}

#[interface(name = "io.github.rigd1")]
impl RigInterface {
    #[zbus(signal)]
    async fn stopped(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    async fn stop(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
    ) -> zbus::fdo::Result<()> {
        emitter.stopped().await?;
        self.event_bus
            .publish(Event::SystemShutdown)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Returns `(status, json)`.
    #[zbus(name = "Call")]
    async fn request(&self, method: &str, route: &str, body: &str) -> (u16, String) {
        let response = self.handle(method, route, body).await;
        (response.status, response.body.to_string())
    }

    #[zbus(property)]
    async fn status(&self) -> String {
        serde_json::to_string(&self.commands.status().await).unwrap_or_else(|e| {
            warn!("Status snapshot not serializable: {e}");
            String::from("{}")
        })
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }
}
