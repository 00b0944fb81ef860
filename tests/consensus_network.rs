//! End-to-end conflict resolution between nodes talking real HTTP on loopback.

use axum::{http::StatusCode, routing::get, Json, Router};
use proofchain::api::{build_api_router, ApiState};
use proofchain::blockchain::valid_chain;
use proofchain::config::Config;
use proofchain::network::NetworkNode;
use proofchain::node::{Node, NodeState};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn node_config(id: &str) -> Config {
    let mut config = Config::default();
    config.miner.difficulty = 2;
    config.miner.node_id = Some(id.to_string());
    config.network.peer_timeout_ms = 2000;
    config
}

/// Serve `app` on an ephemeral loopback port and return its `host:port`.
async fn serve_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

async fn serve(node: Arc<Node>) -> String {
    node.set_state(NodeState::Ready).await;
    serve_router(build_api_router(Arc::new(ApiState::new(node)))).await
}

async fn serve_slow_peer() -> String {
    serve_router(Router::new().route(
        "/chain",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({"chain": [], "length": 0}))
        }),
    ))
    .await
}

async fn serve_failing_peer() -> String {
    serve_router(Router::new().route(
        "/chain",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    ))
    .await
}

async fn serve_malformed_peer() -> String {
    serve_router(Router::new().route("/chain", get(|| async { Json(json!({"chain": 5})) }))).await
}

#[tokio::test]
async fn test_longer_peer_chain_is_adopted_over_http() {
    tokio::time::timeout(Duration::from_secs(30), async {
        let node_a = Arc::new(Node::new(node_config("node-a")).unwrap());
        let node_b = Arc::new(Node::new(node_config("node-b")).unwrap());
        for _ in 0..3 {
            node_a.mine().await.unwrap();
        }
        node_b.mine().await.unwrap();

        let addr_a = serve(node_a.clone()).await;
        node_b.network().register_peer(&format!("http://{}/", addr_a)).unwrap();

        let resolution = node_b.resolve_conflicts().await.unwrap();
        assert!(resolution.replaced);
        assert_eq!(resolution.source.as_deref(), Some(addr_a.as_str()));
        assert_eq!(node_b.chain().await, node_a.chain().await);
        assert!(valid_chain(&node_b.chain().await, node_b.difficulty()));

        // Same length now: the local chain wins the tie.
        let resolution = node_b.resolve_conflicts().await.unwrap();
        assert!(!resolution.replaced);
    })
    .await
    .expect("test_longer_peer_chain_is_adopted_over_http timed out");
}

#[tokio::test]
async fn test_shorter_peer_and_dead_peer_are_ignored() {
    tokio::time::timeout(Duration::from_secs(30), async {
        let node_a = Arc::new(Node::new(node_config("node-a")).unwrap());
        let node_b = Arc::new(Node::new(node_config("node-b")).unwrap());
        node_a.mine().await.unwrap();
        for _ in 0..3 {
            node_b.mine().await.unwrap();
        }

        let addr_a = serve(node_a.clone()).await;
        node_b.network().register_peer(&addr_a).unwrap();
        node_b.network().register_peer("127.0.0.1:9").unwrap();

        let before = node_b.chain().await;
        let resolution = node_b.resolve_conflicts().await.unwrap();
        assert!(!resolution.replaced);
        assert_eq!(node_b.chain().await, before);

        // And the other way round, node A adopts node B's chain over HTTP.
        let addr_b = serve(node_b.clone()).await;
        node_a.network().register_peer(&addr_b).unwrap();
        let resolution = node_a.resolve_conflicts().await.unwrap();
        assert!(resolution.replaced);
        assert_eq!(node_a.chain().await.len(), 4);

        // Mining continues on top of the adopted chain.
        let block = node_a.mine().await.unwrap();
        assert_eq!(block.index, 5);
        assert!(valid_chain(&node_a.chain().await, node_a.difficulty()));
    })
    .await
    .expect("test_shorter_peer_and_dead_peer_are_ignored timed out");
}

#[tokio::test]
async fn test_misbehaving_peers_are_skipped_within_budget() {
    tokio::time::timeout(Duration::from_secs(10), async {
        let net = NetworkNode::new(Duration::from_millis(300)).unwrap();
        net.register_peer(&serve_slow_peer().await).unwrap();
        net.register_peer(&serve_failing_peer().await).unwrap();
        net.register_peer(&serve_malformed_peer().await).unwrap();

        let started = Instant::now();
        let chains = net.fetch_peer_chains().await;
        assert!(chains.is_empty());
        // Peers are queried concurrently, so the slow one costs one budget.
        assert!(started.elapsed() < Duration::from_secs(3));
    })
    .await
    .expect("test_misbehaving_peers_are_skipped_within_budget timed out");
}

#[tokio::test]
async fn test_good_peer_is_adopted_next_to_timed_out_peer() {
    tokio::time::timeout(Duration::from_secs(30), async {
        let node_a = Arc::new(Node::new(node_config("node-a")).unwrap());
        for _ in 0..2 {
            node_a.mine().await.unwrap();
        }
        let addr_a = serve(node_a.clone()).await;

        let mut config = node_config("node-b");
        config.network.peer_timeout_ms = 500;
        let node_b = Arc::new(Node::new(config).unwrap());
        node_b.network().register_peer(&serve_slow_peer().await).unwrap();
        node_b.network().register_peer(&serve_failing_peer().await).unwrap();
        node_b.network().register_peer(&addr_a).unwrap();

        let resolution = node_b.resolve_conflicts().await.unwrap();
        assert!(resolution.replaced);
        assert_eq!(resolution.source.as_deref(), Some(addr_a.as_str()));
        assert_eq!(node_b.chain().await, node_a.chain().await);
    })
    .await
    .expect("test_good_peer_is_adopted_next_to_timed_out_peer timed out");
}
