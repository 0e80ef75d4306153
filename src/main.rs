use anyhow::Result;
use dsescraper::{
    cache::{CacheStore, MemoryStore, RedisStore},
    config::DseUrls,
    fetch::REQUEST_TIMEOUT,
    parse::Dataset,
    service::{DseClient, DEFAULT_INSTRUMENT},
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, env, sync::Arc};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};
use warp::{http::StatusCode, reject::Rejection, reply::Reply, Filter};

#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    message: String,
    data: Dataset,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

#[derive(Deserialize)]
struct DsexQuery {
    symbol: Option<String>,
}

#[derive(Deserialize)]
struct HistoricalQuery {
    start: Option<String>,
    end: Option<String>,
    code: Option<String>,
}

fn ok_reply(message: String, data: Dataset) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&ApiResponse {
            success: true,
            message,
            data,
        }),
        StatusCode::OK,
    )
}

fn bad_request(message: String) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&ErrorResponse {
            success: false,
            message,
        }),
        StatusCode::BAD_REQUEST,
    )
}

async fn health_check() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "status": "healthy",
        "service": "dse-stock-api"
    })))
}

async fn get_latest(client: Arc<DseClient>) -> Result<impl Reply, Rejection> {
    match client.latest().await {
        Ok(data) => Ok(ok_reply(
            format!("Retrieved {} latest stock records", data.len()),
            data,
        )),
        Err(e) => {
            warn!(error = %e, "latest request failed");
            Ok(bad_request("Failed to fetch latest stock data".to_string()))
        }
    }
}

async fn get_dsexdata(query: DsexQuery, client: Arc<DseClient>) -> Result<impl Reply, Rejection> {
    let symbol = query.symbol.as_deref().filter(|s| !s.is_empty());
    match client.dsex(symbol).await {
        Ok(data) => {
            let message = match symbol {
                Some(symbol) => {
                    format!("Retrieved DSEX data for symbol: {}", symbol.to_uppercase())
                }
                None => format!("Retrieved {} DSEX records", data.len()),
            };
            Ok(ok_reply(message, data))
        }
        Err(e) => {
            warn!(error = %e, "DSEX request failed");
            Ok(bad_request("Failed to fetch DSEX data".to_string()))
        }
    }
}

async fn get_top30(client: Arc<DseClient>) -> Result<impl Reply, Rejection> {
    match client.top30().await {
        Ok(data) => Ok(ok_reply("Retrieved top 30 stock records".to_string(), data)),
        Err(e) => {
            warn!(error = %e, "top 30 request failed");
            Ok(bad_request("Failed to fetch top 30 stock data".to_string()))
        }
    }
}

async fn get_historical(
    query: HistoricalQuery,
    client: Arc<DseClient>,
) -> Result<impl Reply, Rejection> {
    let start = query.start.as_deref().filter(|s| !s.is_empty());
    let end = query.end.as_deref().filter(|s| !s.is_empty());
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Ok(bad_request(
                "Both 'start' and 'end' date parameters are required. Format: YYYY-MM-DD"
                    .to_string(),
            ))
        }
    };
    let code = query.code.as_deref();
    match client.historical(start, end, code).await {
        Ok(data) => Ok(ok_reply(
            format!(
                "Retrieved {} historical records from {} to {} for {}",
                data.len(),
                start,
                end,
                code.filter(|c| !c.is_empty()).unwrap_or(DEFAULT_INSTRUMENT)
            ),
            data,
        )),
        Err(e) if e.is_validation() => Ok(bad_request(e.to_string())),
        Err(e) => {
            warn!(error = %e, "historical request failed");
            Ok(bad_request("Failed to fetch historical data".to_string()))
        }
    }
}

fn with_client(
    client: Arc<DseClient>,
) -> impl Filter<Extract = (Arc<DseClient>,), Error = Infallible> + Clone {
    warp::any().map(move || client.clone())
}

fn routes(
    client: Arc<DseClient>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    // Health check endpoint
    let health = warp::path("health").and(warp::get()).and_then(health_check);

    // Dataset endpoints
    let latest = warp::path!("v1" / "dse" / "latest")
        .and(warp::get())
        .and(with_client(client.clone()))
        .and_then(get_latest);

    let dsexdata = warp::path!("v1" / "dse" / "dsexdata")
        .and(warp::get())
        .and(warp::query::<DsexQuery>())
        .and(with_client(client.clone()))
        .and_then(get_dsexdata);

    let top30 = warp::path!("v1" / "dse" / "top30")
        .and(warp::get())
        .and(with_client(client.clone()))
        .and_then(get_top30);

    let historical = warp::path!("v1" / "dse" / "historical")
        .and(warp::get())
        .and(warp::query::<HistoricalQuery>())
        .and(with_client(client))
        .and_then(get_historical);

    health.or(latest).or(dsexdata).or(top30).or(historical)
}

/// Redis when `REDIS_URL` is set and reachable, in-memory otherwise.
async fn build_cache() -> Arc<dyn CacheStore> {
    match env::var("REDIS_URL") {
        Ok(url) => match RedisStore::connect(&url).await {
            Ok(store) => {
                info!("connected to redis cache");
                Arc::new(store)
            }
            Err(e) => {
                warn!(error = %e, "redis unavailable; falling back to in-memory cache");
                Arc::new(MemoryStore::new())
            }
        },
        Err(_) => {
            info!("REDIS_URL not set; using in-memory cache");
            Arc::new(MemoryStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();

    info!("Starting DSE stock data service");

    let cache = build_cache().await;
    let client = Arc::new(DseClient::new(DseUrls::from_env(), cache)?);

    // Get port from environment or default to 3000
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    info!("Server starting on port {}", port);
    info!("Upstream request timeout: {}s", REQUEST_TIMEOUT.as_secs());
    info!("Health check: http://localhost:{}/health", port);
    info!("Latest prices: http://localhost:{}/v1/dse/latest", port);
    info!(
        "Historical archive: http://localhost:{}/v1/dse/historical?start=YYYY-MM-DD&end=YYYY-MM-DD",
        port
    );

    warp::serve(routes(client)).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
