use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use modwire::{App, BootOptions, JobDefinition, JobQueue, JobReceiver, Worker};
use modwire_bootstrap::{AppConfig, CliArgs, ConfigSource};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod app;
mod request_logger;
mod services;

use app::{build_runtime, APP_MODULE};
use services::{LoggerService, LOGGER_SERVICE};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Directory holding `base.yaml` and the per-environment files.
const CONFIG_DIR: &str = "config";

/// modwire server - module graph, DI container and HTTP dispatch
#[derive(Parser)]
#[command(name = "modwire-server")]
#[command(about = "modwire server - module graph, DI container and HTTP dispatch")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a configuration file (skips base/env layering)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment name; loads config/<env>.yaml over config/base.yaml
    #[arg(short, long)]
    env: Option<String>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve HTTP and run the job worker
    Run,
    /// Boot the module graph, print the route table and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        env: cli.env.clone(),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // 1) defaults -> 2) YAML -> 3) env (APP__*) -> 4) CLI overrides
    let source = ConfigSource::from_args(&args, CONFIG_DIR);
    let mut config = AppConfig::load(&source)?;
    config.apply_cli_overrides(&args);

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let logging_config = config
        .logging
        .clone()
        .unwrap_or_else(modwire_bootstrap::default_logging_config);
    modwire_bootstrap::init_logging(&logging_config, &AppConfig::log_base_dir(&source));

    tracing::info!(env = %config.env, "modwire server starting");

    let config = Arc::new(config);
    let (queue, rx) = JobQueue::channel();
    let rt = build_runtime(config.clone(), &queue);
    let opts = BootOptions {
        body_limit_bytes: config.server.body_limit_bytes,
        request_timeout: config.server.request_timeout(),
        cors_enabled: config.server.cors_enabled,
    };
    let app = rt
        .boot(APP_MODULE, &opts)
        .context("Failed to boot the application module graph")?;

    if let Ok(logger) = rt.container().require_as::<LoggerService>(LOGGER_SERVICE) {
        logger.info("bootstrap", &format!("{} routes mounted", app.routes.len()));
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(&config, app, rx).await,
        Commands::Check => {
            print!("{}", app.routes);
            println!("jobs: {}", Worker::new(app.jobs).job_names().join(", "));
            Ok(())
        }
    }
}

async fn run_server(config: &AppConfig, app: App, rx: JobReceiver) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind_addr()
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind_addr()))?;

    let cancel = modwire_bootstrap::shutdown_token();

    let worker = spawn_worker(config.jobs.enabled, app.jobs, rx, &cancel);

    let served = serve(addr, app.router, cancel.clone()).await;
    // The server may stop on its own (bind error); the worker must follow.
    cancel.cancel();

    if let Some(handle) = worker {
        match handle.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Worker stopped with an error"),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            Ok(Ok(())) => {}
        }
    }
    tracing::info!("modwire server stopped");
    served
}

/// The queue is in-process: without a worker its receiver is dropped so enqueueing fails.
fn spawn_worker(
    enabled: bool,
    jobs: Vec<JobDefinition>,
    rx: JobReceiver,
    cancel: &CancellationToken,
) -> Option<JoinHandle<Result<()>>> {
    if !enabled {
        tracing::info!("Job worker disabled by configuration; enqueueing will be rejected");
        drop(rx);
        return None;
    }
    Some(tokio::spawn(Worker::new(jobs).run(rx, cancel.child_token())))
}

async fn serve(addr: SocketAddr, router: modwire::axum::Router, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("HTTP server bound on {}", addr);

    let shutdown = async move {
        cancel.cancelled().await;
        tracing::info!("HTTP server shutting down gracefully (cancellation)");
    };

    modwire::axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modwire::axum::body::Body;
    use modwire::axum::extract::Request;
    use modwire::axum::http::StatusCode;
    use tower::ServiceExt;

    fn welcome_request() -> Request {
        Request::builder()
            .method("POST")
            .uri("/notifications/welcome")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"to":"ada@example.com","subject":"Hi","body":"Welcome"}"#))
            .unwrap()
    }

    #[tokio::test]
    async fn disabled_worker_makes_enqueue_fail() {
        let (queue, rx) = JobQueue::channel();
        let rt = build_runtime(Arc::new(AppConfig::default()), &queue);
        let app = rt.boot(APP_MODULE, &BootOptions::default()).unwrap();

        let cancel = CancellationToken::new();
        assert!(spawn_worker(false, app.jobs, rx, &cancel).is_none());

        let resp = app.router.oneshot(welcome_request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn enabled_worker_accepts_jobs_and_stops_on_cancel() {
        let (queue, rx) = JobQueue::channel();
        let rt = build_runtime(Arc::new(AppConfig::default()), &queue);
        let app = rt.boot(APP_MODULE, &BootOptions::default()).unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_worker(true, app.jobs, rx, &cancel).expect("worker spawned");

        let resp = app.router.oneshot(welcome_request()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
