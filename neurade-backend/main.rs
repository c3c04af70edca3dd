mod agent;
mod api;
mod config;
mod error;
mod github;
mod pipeline;
mod relay;
mod storage;
mod store;
mod tasks;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::Request;
use clap::Parser;
use dotenvy::dotenv;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::agent::client::HttpAgentClient;
use crate::config::Config;
use crate::github::client::HttpGithubClient;
use crate::pipeline::Pipeline;
use crate::relay::forward::HttpForwarder;
use crate::storage::S3Presigner;
use crate::store::SqliteStore;
use crate::tasks::{TaskQueue, TaskRunner};

#[derive(Parser)]
#[command(name = "neurade", about = "Course PR review pipeline")]
enum Cli {
    /// Start the backend HTTP server (default when no subcommand is given)
    #[command(alias = "run")]
    Serve,
    /// Start the GitHub webhook relay
    Relay,
    /// Load users, courses, assignments and LLM credentials from a JSON file
    Import {
        /// Path to the fixture file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    // No subcommand means serve, but --help and --version still work.
    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 {
        Cli::Serve
    } else {
        Cli::parse()
    };

    let config = Config::from_env();
    init_tracing();

    let _guard = sentry::init((
        config.sentry_dsn.clone().unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            send_default_pii: false,
            traces_sample_rate: 0.2,
            enable_logs: true,
            ..Default::default()
        },
    ));

    match cli {
        Cli::Serve => run_server(config).await?,
        Cli::Relay => run_relay(config).await?,
        Cli::Import { file } => run_import(config, file).await?,
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("neurade=info,tower_http=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true).with_bracketed_fields(false))
        .with(sentry::integrations::tracing::layer().event_filter(
            |metadata| match *metadata.level() {
                tracing::Level::ERROR => sentry::integrations::tracing::EventFilter::Event,
                tracing::Level::WARN | tracing::Level::INFO => {
                    sentry::integrations::tracing::EventFilter::Breadcrumb
                }
                _ => sentry::integrations::tracing::EventFilter::Ignore,
            },
        ))
        .init();
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(90))
        .build()
        .context("failed to build HTTP client")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

async fn run_server(config: Config) -> Result<()> {
    let http_client = http_client()?;

    let store = Arc::new(SqliteStore::open(&config.database_path).with_context(|| {
        format!("failed to open database at {}", config.database_path.display())
    })?);
    tracing::info!(path = %config.database_path.display(), "store opened");

    for (name, endpoint) in [
        ("REVIEW_ENDPOINT", &config.endpoints.review),
        ("CHAT_ENDPOINT", &config.endpoints.chat),
        ("LLM_SERVICE_ENDPOINT", &config.endpoints.llm_service),
    ] {
        if endpoint.is_none() {
            tracing::warn!("{name} is not set; calls to that service will fail");
        }
    }
    let presigner = S3Presigner::new(&config.storage).context("invalid object storage settings")?;
    if !presigner.is_configured() {
        tracing::warn!(
            "STORAGE_ENDPOINT, STORAGE_ACCESS_KEY or STORAGE_SECRET_KEY is not set; raw storage paths will be sent to the agent"
        );
    }

    let (queue, jobs) = TaskQueue::channel();
    let pipeline = Pipeline::new(
        store,
        Arc::new(HttpGithubClient::new(http_client.clone())),
        Arc::new(HttpAgentClient::new(http_client, config.endpoints.clone())),
        Arc::new(presigner),
        queue,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(TaskRunner::new(jobs, shutdown_rx).run(pipeline.clone()));

    let app = api::create_app(api::AppState { pipeline })
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(NewSentryLayer::<Request<Body>>::new_from_top());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = runner.await {
        tracing::error!(error = %e, "task runner panicked");
    }
    Ok(())
}

async fn run_relay(config: Config) -> Result<()> {
    let backend = config
        .relay
        .backend_endpoint
        .clone()
        .context("BACKEND_ENDPOINT must be set for the relay")?;
    if config.relay.secret_token.is_none() {
        tracing::warn!("SECRET_TOKEN is not set; every webhook delivery will be rejected");
    }

    let state = relay::RelayState {
        secret: config.relay.secret_token.clone(),
        forwarder: Arc::new(HttpForwarder::new(http_client()?, &backend)),
    };
    let app = relay::create_relay_app(state)
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(NewSentryLayer::<Request<Body>>::new_from_top());

    let addr = format!("0.0.0.0:{}", config.relay_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(backend = %backend, "Relay listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server error")?;
    Ok(())
}

async fn run_import(config: Config, file: PathBuf) -> Result<()> {
    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!("failed to open database at {}", config.database_path.display())
    })?;
    let summary = store::import::import_file(&file, &store).await?;
    tracing::info!(
        users = summary.users,
        courses = summary.courses,
        assignments = summary.assignments,
        llms = summary.llms,
        "fixture imported"
    );
    println!(
        "Imported {} users, {} courses, {} assignments, {} LLM credentials",
        summary.users, summary.courses, summary.assignments, summary.llms
    );
    Ok(())
}
