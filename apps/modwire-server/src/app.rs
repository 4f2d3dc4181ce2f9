//! The application's module graph: `app` → {health, notifications, logger → config, queue}.
use std::sync::Arc;

use modwire::{
    Instance, JobQueue, MetadataRegistry, ModuleDescriptor, ModuleName, ProviderSpec, Runtime,
    Token, QUEUE_MODULE,
};
use modwire_bootstrap::AppConfig;

use crate::request_logger::RequestLogger;
use crate::services::{ConfigService, LoggerService, CONFIG_SERVICE, LOGGER_SERVICE};

pub const APP_MODULE: ModuleName = "app";
pub const CONFIG_MODULE: ModuleName = "config";
pub const LOGGER_MODULE: ModuleName = "logger";

pub const REQUEST_LOGGER: Token = Token::new("request_logger");

/// Build a runtime with every module of the application declared.
pub fn build_runtime(config: Arc<AppConfig>, queue: &JobQueue) -> Runtime {
    let mut rt = Runtime::new();
    let registry = rt.registry_mut();

    registry.attach_module(QUEUE_MODULE, queue.module());
    declare_config(registry, config);
    declare_logger(registry);
    health::declare(registry);
    notifications::declare(registry);
    declare_app(registry);

    rt
}

fn declare_config(registry: &mut MetadataRegistry, config: Arc<AppConfig>) {
    registry.attach_module(
        CONFIG_MODULE,
        ModuleDescriptor::new().provider(ProviderSpec::instance(
            CONFIG_SERVICE,
            Instance::new(ConfigService::new(config)),
        )),
    );
}

fn declare_logger(registry: &mut MetadataRegistry) {
    registry.attach_module(
        LOGGER_MODULE,
        ModuleDescriptor::new()
            .import(CONFIG_MODULE)
            .provider(ProviderSpec::factory(LOGGER_SERVICE, &[CONFIG_SERVICE], |deps| {
                let config = deps.get::<ConfigService>(0)?;
                Ok(Instance::new(LoggerService::from_config(&config)?))
            })),
    );
}

fn declare_app(registry: &mut MetadataRegistry) {
    registry.declare_middleware(REQUEST_LOGGER);
    registry.attach_module(
        APP_MODULE,
        ModuleDescriptor::new()
            .import(LOGGER_MODULE)
            .import(health::HEALTH_MODULE)
            .import(notifications::NOTIFICATIONS_MODULE)
            .provider(ProviderSpec::factory(REQUEST_LOGGER, &[LOGGER_SERVICE], |deps| {
                Ok(Instance::middleware(RequestLogger::new(deps.get(0)?)))
            }))
            .middleware(REQUEST_LOGGER),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use modwire::axum::body::{to_bytes, Body};
    use modwire::axum::extract::Request;
    use modwire::axum::http::StatusCode;
    use modwire::{BootOptions, HttpMethod};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn runtime() -> (Runtime, modwire::JobReceiver) {
        let (queue, rx) = JobQueue::channel();
        (build_runtime(Arc::new(AppConfig::default()), &queue), rx)
    }

    #[tokio::test]
    async fn app_graph_boots_with_all_routes() {
        let (rt, _rx) = runtime();
        let app = rt.boot(APP_MODULE, &BootOptions::default()).unwrap();

        assert!(app.routes.contains(HttpMethod::Get, "/healthcheck"));
        assert!(app.routes.contains(HttpMethod::Post, "/notifications/welcome"));
        assert_eq!(app.jobs.len(), 1);

        // logger was built from config before the request logger asked for it
        let logger = rt.container().require_as::<LoggerService>(LOGGER_SERVICE).unwrap();
        assert_eq!(logger.env(), "local");
        assert!(rt.container().contains(REQUEST_LOGGER));

        let resp = app
            .router
            .oneshot(Request::builder().uri("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn welcome_request_is_queued_through_the_app() {
        let (rt, mut rx) = runtime();
        let app = rt.boot(APP_MODULE, &BootOptions::default()).unwrap();

        let body = json!({ "to": "grace@example.com", "subject": "Hi", "body": "Welcome" });
        let resp = app
            .router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/notifications/welcome")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let handle: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(handle["name"], "send-welcome-email");
        assert_eq!(rx.try_recv().unwrap().payload, body);
    }

    #[test]
    fn shipped_config_files_load() {
        use modwire_bootstrap::ConfigSource;
        for env in ["local", "development", "production", "test"] {
            let source = ConfigSource::Environment {
                dir: "config".into(),
                env: env.to_string(),
            };
            let config = AppConfig::load(&source).unwrap_or_else(|e| panic!("{env}: {e:#}"));
            assert_eq!(config.env, env);
            let logger = LoggerService::from_config(&ConfigService::new(Arc::new(config)));
            assert!(logger.is_ok(), "{env}");
        }
    }

    #[test]
    fn config_service_is_shared_not_rebuilt() {
        let (rt, _rx) = runtime();
        rt.boot(APP_MODULE, &BootOptions::default()).unwrap();
        let a = rt.instance(CONFIG_SERVICE).unwrap();
        let b = rt.container().require(CONFIG_SERVICE).unwrap();
        assert!(a.same_as(&b));
    }
}
