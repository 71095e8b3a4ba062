use std::sync::Arc;

use job_assistant::config::Config;
use job_assistant::credentials::{CredentialStore, MemoryCredentialStore, RedisCredentialStore};
use job_assistant::job_client::HttpJobService;
use job_assistant::metrics::Metrics;
use job_assistant::orchestrator::Orchestrator;
use job_assistant::redis_client::RedisClient;
use job_assistant::{api, middleware};
use tracing::{error, info};
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level))
        )
        .json()
        .init();

    info!("Starting job assistant");
    info!("Job service at {}", config.job_service_url);

    // Credential store
    let credentials: Arc<dyn CredentialStore> = match &config.redis_url {
        Some(redis_url) => {
            let redis_client = RedisClient::new(redis_url).await?;
            info!("Redis connection established, credentials stored in Redis");
            Arc::new(RedisCredentialStore::new(redis_client, config.api_key.clone()).await?)
        }
        None => {
            info!("No REDIS_URL set, credentials kept in memory");
            Arc::new(MemoryCredentialStore::new(config.api_key.clone()))
        }
    };

    let job_service = Arc::new(HttpJobService::new(
        &config.job_service_url,
        config.request_timeout,
    )?);
    let metrics = Arc::new(Metrics::new(prometheus::default_registry())?);

    let orchestrator = Arc::new(Orchestrator::new(
        job_service.clone(),
        job_service,
        credentials,
        metrics,
        config.default_model.clone(),
    ));

    // Build API routes
    let api_routes = api::routes(orchestrator)
        .with(warp::log("api"))
        .with(middleware::cors());

    // Health check route
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    // Metrics route
    let metrics = warp::path("metrics")
        .and(warp::get())
        .map(|| {
            use prometheus::{Encoder, TextEncoder};
            let encoder = TextEncoder::new();
            let metric_families = prometheus::gather();
            let mut buffer = vec![];
            if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                error!("Failed to encode metrics: {}", e);
            }
            warp::reply::with_header(
                buffer,
                "Content-Type",
                encoder.format_type(),
            )
        });

    let routes = health
        .or(metrics)
        .or(api_routes);

    // Start server
    let addr = ([0, 0, 0, 0], config.port);
    info!("Server listening on {}", addr.1);

    warp::serve(routes)
        .run(addr)
        .await;

    Ok(())
}
