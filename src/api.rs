//! REST API for a proofchain node
//!
//! Exposes the ledger to clients and to other nodes: transaction
//! submission, mining, chain export, peer registration and conflict
//! resolution, plus health and request statistics.

use axum::{
    extract::{Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::ChainError;
use crate::network::ChainResponse;
use crate::node::{Node, NodeState};
use crate::transaction::Transaction;

/// Shared handler state: the node plus request bookkeeping.
pub struct ApiState {
    pub node: Arc<Node>,
    api_stats: RwLock<ApiStats>,
}

impl ApiState {
    pub fn new(node: Arc<Node>) -> Self {
        Self {
            node,
            api_stats: RwLock::new(ApiStats::new()),
        }
    }

    pub async fn get_stats(&self) -> ApiStatsResponse {
        let stats = self.api_stats.read().await;
        let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        ApiStatsResponse {
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            transactions_submitted: stats.transactions_submitted,
            resolutions: stats.resolutions,
            uptime_seconds: uptime,
            blocks_mined: self.node.blocks_mined(),
            is_mining: self.node.is_mining(),
        }
    }
}

#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    transactions_submitted: u64,
    resolutions: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Chain(ChainError),
    InvalidInput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Chain(e) => match e {
                ChainError::InvalidPeer(_) | ChainError::InvalidTransaction(_) => {
                    StatusCode::BAD_REQUEST
                }
                ChainError::MiningAlreadyRunning | ChainError::MiningNotRunning => {
                    StatusCode::CONFLICT
                }
                ChainError::ProofSearchExhausted { .. } | ChainError::MiningCancelled => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        let message = match self {
            ApiError::InvalidInput(msg) => msg,
            ApiError::Chain(e) => e.to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::Chain(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Every field is optional so a missing one is reported as such, not as a
/// generic deserialization failure.
#[derive(Deserialize)]
pub struct NewTransactionRequest {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<f64>,
}

#[derive(Deserialize)]
pub struct RegisterNodesRequest {
    pub nodes: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub transactions_submitted: u64,
    pub resolutions: u64,
    pub uptime_seconds: u64,
    pub blocks_mined: u64,
    pub is_mining: bool,
}

#[derive(Serialize)]
struct SuccessResponse {
    message: String,
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(State(api): State<Arc<ApiState>>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    api.api_stats.write().await.record_request(success);

    response
}

/// Logs method, path, status, duration and the current `NodeState`.
async fn logging_middleware(State(api): State<Arc<ApiState>>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();
    let node_state = api.node.state().await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        node_state = ?node_state,
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

pub fn build_api_router(api: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        // Ledger endpoints
        .route("/chain", get(get_chain))
        .route("/mine", get(mine))
        .route("/transactions/new", post(new_transaction))
        .route("/transactions/pending", get(get_pending))
        // Peer endpoints
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(resolve_nodes))
        .route("/nodes", get(get_nodes))
        // Background mining
        .route("/mining/start", post(start_mining))
        .route("/mining/stop", post(stop_mining))
        .route("/mining/status", get(get_mining_status))
        // System endpoints
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        // logging before stats so we always record timing and node-state
        .layer(middleware::from_fn_with_state(api.clone(), logging_middleware))
        .layer(middleware::from_fn_with_state(api.clone(), stats_middleware))
        .with_state(api)
        .layer(cors)
}

pub async fn run_api_server(api: Arc<ApiState>, port: u16) -> crate::error::Result<()> {
    let app = build_api_router(api);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "API server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(api): State<Arc<ApiState>>) -> impl IntoResponse {
    let state = api.node.state().await;
    let (status, label) = match state {
        NodeState::Ready => (StatusCode::OK, "healthy"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };
    (
        status,
        Json(serde_json::json!({
            "status": label,
            "node_id": api.node.node_id(),
            "node_state": format!("{:?}", state),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

async fn get_chain(State(api): State<Arc<ApiState>>) -> Json<ChainResponse> {
    Json(ChainResponse::new(api.node.chain().await))
}

async fn mine(State(api): State<Arc<ApiState>>) -> Result<impl IntoResponse, ApiError> {
    let block = api.node.mine().await?;
    Ok(Json(serde_json::json!({
        "message": "New Block Forged",
        "index": block.index,
        "transactions": block.transactions,
        "proof": block.proof,
        "previous_hash": block.previous_hash,
    })))
}

async fn new_transaction(
    State(api): State<Arc<ApiState>>,
    Json(req): Json<NewTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(sender), Some(recipient), Some(amount)) = (req.sender, req.recipient, req.amount)
    else {
        return Err(ApiError::InvalidInput("Missing values".to_string()));
    };

    let tx = Transaction::new(sender, recipient, amount);
    tx.validate()?;
    let index = api.node.new_transaction(tx).await;

    api.api_stats.write().await.transactions_submitted += 1;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": format!("Transaction will be added to Block {}", index),
            "index": index,
        })),
    ))
}

async fn get_pending(State(api): State<Arc<ApiState>>) -> impl IntoResponse {
    let transactions = api.node.pending().await;
    Json(serde_json::json!({
        "count": transactions.len(),
        "transactions": transactions
    }))
}

async fn register_nodes(
    State(api): State<Arc<ApiState>>,
    Json(req): Json<RegisterNodesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let nodes = match req.nodes {
        Some(nodes) if !nodes.is_empty() => nodes,
        _ => {
            return Err(ApiError::InvalidInput(
                "Error: Please supply a valid list of nodes".to_string(),
            ))
        }
    };

    let network = api.node.network();
    network.register_peers(&nodes)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "New nodes have been added",
            "total_nodes": network.list_peers(),
        })),
    ))
}

async fn get_nodes(State(api): State<Arc<ApiState>>) -> impl IntoResponse {
    let peers = api.node.network().list_peers();
    Json(serde_json::json!({
        "count": peers.len(),
        "nodes": peers
    }))
}

async fn resolve_nodes(State(api): State<Arc<ApiState>>) -> Result<impl IntoResponse, ApiError> {
    let resolution = api.node.resolve_conflicts().await?;
    api.api_stats.write().await.resolutions += 1;

    let body = if resolution.replaced {
        serde_json::json!({
            "message": "Our chain was replaced",
            "replaced": true,
            "new_chain": resolution.chain,
        })
    } else {
        serde_json::json!({
            "message": "Our chain is authoritative",
            "replaced": false,
            "chain": resolution.chain,
        })
    };
    Ok(Json(body))
}

async fn start_mining(State(api): State<Arc<ApiState>>) -> Result<Json<SuccessResponse>, ApiError> {
    api.node.start_mining().await?;

    Ok(Json(SuccessResponse {
        message: "Mining started successfully".to_string(),
    }))
}

async fn stop_mining(State(api): State<Arc<ApiState>>) -> Result<Json<SuccessResponse>, ApiError> {
    api.node.stop_mining().await?;

    Ok(Json(SuccessResponse {
        message: "Mining stopped successfully".to_string(),
    }))
}

async fn get_mining_status(State(api): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "is_mining": api.node.is_mining(),
        "blocks_mined": api.node.blocks_mined()
    }))
}

async fn get_api_stats(State(api): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(api.get_stats().await)
}
