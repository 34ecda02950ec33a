//! SPARQL Endpoint - serves the reference snapshot store over HTTP.
//!
//! Usage:
//!   QUERY_ENDPOINT_CONFIG=endpoint.json sparql-endpoint '{"sources":[{"type":"versionedStore","value":"data/store"}]}'
//!
//! The config file sets `port` (default 3000) and `path` (default `/sparql`).

use axum::{
    extract::{Form, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use versioned_adapter::querying::sparql_client::SPARQL_RESULTS_JSON;
use versioned_adapter::store::{EndpointFileConfig, SnapshotEngine, SourceDescriptor};
use versioned_adapter::AdapterError;

#[derive(Parser, Debug)]
#[command(name = "sparql-endpoint")]
#[command(about = "SPARQL endpoint over the versioned snapshot store")]
struct Args {
    /// JSON source descriptor naming the store directory
    descriptor: String,

    /// Environment variable naming the endpoint config file
    #[arg(long, default_value = "QUERY_ENDPOINT_CONFIG")]
    config_var: String,
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    query: String,
}

async fn health_check() -> &'static str {
    "ok"
}

async fn get_query(
    State(engine): State<Arc<SnapshotEngine>>,
    Query(params): Query<QueryParams>,
) -> Response {
    evaluate(engine, params.query).await
}

async fn post_query(
    State(engine): State<Arc<SnapshotEngine>>,
    Form(params): Form<QueryParams>,
) -> Response {
    evaluate(engine, params.query).await
}

async fn evaluate(engine: Arc<SnapshotEngine>, query: String) -> Response {
    let outcome = tokio::task::spawn_blocking(move || {
        let results = engine.query(&query)?;
        results.to_json_bytes()
    })
    .await;

    match outcome {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, SPARQL_RESULTS_JSON)], body).into_response(),
        Ok(Err(AdapterError::QueryExecution(message))) => {
            (StatusCode::BAD_REQUEST, message).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "query evaluation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(error = %e, "query worker panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store_dir = SourceDescriptor::parse(&args.descriptor)?.store_dir()?;
    let config = match std::env::var_os(&args.config_var) {
        Some(path) => EndpointFileConfig::from_file(&PathBuf::from(path))?,
        None => EndpointFileConfig::default(),
    };

    let engine = Arc::new(SnapshotEngine::new(&store_dir)?);
    let loaded = engine.refresh()?;
    info!(store = %store_dir.display(), snapshots = loaded, "snapshot store opened");

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = Router::new()
        .route(&config.path, get(get_query).post(post_query))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(engine);

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, path = %config.path, "SPARQL endpoint listening");
    axum::serve(listener, app).await?;

    Ok(())
}
