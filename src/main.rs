use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use triage_engine::{
    api::{build_router, AppState},
    assessor::HttpSeverityAssessor,
    config::Config,
    ml::ModelArtifact,
    triage::InferenceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Initialize tracing
    let fmt_layer = if config.observability.json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "triage_engine={},tower_http=info",
                config.observability.log_level
            )
            .into()
        }))
        .with(fmt_layer)
        .init();

    if let Some(e) = config_error {
        tracing::warn!("Failed to load configuration: {}", e);
        tracing::warn!("Using default configuration");
    }

    tracing::info!(
        service = %config.observability.service_name,
        "Starting triage engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = triage_engine::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("Prometheus metrics initialized");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // A missing or inconsistent artifact is fatal
    let artifact = ModelArtifact::load(&config.model.artifact_dir).with_context(|| {
        format!(
            "cannot load model artifact from {}",
            config.model.artifact_dir.display()
        )
    })?;
    for (model, metrics) in &artifact.info().summary.evaluation {
        let model = model.to_string();
        triage_engine::metrics::MODEL_ACCURACY
            .with_label_values(&[model.as_str()])
            .set(metrics.accuracy);
    }
    tracing::info!(
        run_id = %artifact.run_id(),
        features = artifact.feature_names().len(),
        "Model artifact ready"
    );

    let assessor = HttpSeverityAssessor::from_config(&config.assessor)
        .context("cannot build assessor client")?;
    tracing::info!(endpoint = %config.assessor.endpoint, model = %config.assessor.model, "Assessor client initialized");

    let context = Arc::new(InferenceContext::new(
        Arc::new(artifact),
        Arc::new(assessor),
        config.assessor.timeout(),
    ));

    // Build HTTP router
    let app = build_router(AppState::new(context)).layer(TimeoutLayer::new(Duration::from_secs(
        config.server.request_timeout_secs,
    )));

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("cannot bind {}", http_addr))?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Triage API: http://{}/v1/triage", http_addr);
    tracing::info!("   Metrics: http://{}/metrics", http_addr);

    axum::serve(http_listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    tracing::info!("Shut down gracefully");
    Ok(())
}
