use std::time::Instant;

use async_trait::async_trait;
use modwire::{
    json, Args, Controller, HandlerResult, HttpError, Instance, MetadataRegistry, ModuleDescriptor,
    ModuleName, Token,
};
use serde::Serialize;

pub const HEALTH_MODULE: ModuleName = "health";
pub const HEALTH_CONTROLLER: Token = Token::new("health_controller");

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub uptime_secs: u64,
}

/// Built on first use by the fallback container.
pub struct HealthController {
    started: Instant,
}

impl HealthController {
    fn instance() -> Instance {
        Instance::controller(HealthController {
            started: Instant::now(),
        })
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            ok: true,
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

#[async_trait]
impl Controller for HealthController {
    async fn invoke(&self, handler: &str, _args: Args) -> HandlerResult {
        match handler {
            "health" => json(self.status()),
            other => Err(HttpError::unknown_handler(other)),
        }
    }
}

/// Attach the health module and its controller.
pub fn declare(registry: &mut MetadataRegistry) {
    registry
        .declare_controller(HEALTH_CONTROLLER, "/healthcheck")
        .constructor(HealthController::instance)
        .get("", "health");
    registry.attach_module(
        HEALTH_MODULE,
        ModuleDescriptor::new().controller(HEALTH_CONTROLLER),
    );
    tracing::debug!(module = HEALTH_MODULE, "Module declared");
}
