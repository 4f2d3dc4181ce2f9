//! Liveness endpoint: `GET /healthcheck`.
mod module;

pub use module::{declare, HealthController, HealthStatus, HEALTH_CONTROLLER, HEALTH_MODULE};
