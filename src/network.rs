//! Peer registry and chain fetching for proofchain
//!
//! Peers are plain `host:port` strings. During conflict resolution every
//! registered peer is asked for its chain concurrently; a peer that is slow,
//! unreachable or answers with garbage simply has no say.

use crate::blockchain::Block;
use crate::consensus::PeerChain;
use crate::error::{ChainError, Result};
use parking_lot::RwLock;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Payload of `GET /chain`, also what peers exchange during resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
}

impl ChainResponse {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len();
        Self { chain, length }
    }
}

/// Reduce a peer location to canonical `host:port` form.
///
/// Accepts full `http://` URLs (`http://10.0.0.5:5000/`) and bare
/// `host[:port]` strings; any path is dropped and a missing port becomes 80.
/// Peers are spoken to over plain HTTP, so other schemes are rejected.
pub fn normalize_peer(address: &str) -> Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ChainError::InvalidPeer("empty address".to_string()));
    }

    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| ChainError::InvalidPeer(format!("{}: {}", address, e)))?;
    if url.scheme() != "http" {
        return Err(ChainError::InvalidPeer(format!(
            "{}: unsupported scheme {}",
            address,
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ChainError::InvalidPeer(format!("{}: missing host", address)))?;

    let port = url
        .port_or_known_default()
        .ok_or_else(|| ChainError::InvalidPeer(format!("{}: missing port", address)))?;
    Ok(format!("{}:{}", host, port))
}

/// Registered peers plus the HTTP client used to query them.
pub struct NetworkNode {
    peers: RwLock<BTreeSet<String>>,
    client: Client,
    fetch_timeout: Duration,
}

impl NetworkNode {
    pub fn new(fetch_timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            peers: RwLock::new(BTreeSet::new()),
            client,
            fetch_timeout,
        })
    }

    /// Register a peer, returning its normalised form.
    pub fn register_peer(&self, address: &str) -> Result<String> {
        let peer = normalize_peer(address)?;
        if self.peers.write().insert(peer.clone()) {
            debug!(peer = %peer, "peer registered");
        }
        Ok(peer)
    }

    /// Register several peers; all are validated before any is stored.
    pub fn register_peers<S: AsRef<str>>(&self, addresses: &[S]) -> Result<Vec<String>> {
        let normalized = addresses
            .iter()
            .map(|a| normalize_peer(a.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.peers.write().extend(normalized.iter().cloned());
        Ok(normalized)
    }

    pub fn list_peers(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Ask one peer for its chain.
    pub async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>> {
        fetch_chain_with(&self.client, peer).await
    }

    /// Fetch every registered peer's chain concurrently.
    ///
    /// Failed or timed-out peers are logged and left out of the result.
    pub async fn fetch_peer_chains(&self) -> Vec<PeerChain> {
        let mut tasks = JoinSet::new();
        for peer in self.list_peers() {
            let client = self.client.clone();
            let budget = self.fetch_timeout;
            tasks.spawn(async move {
                let outcome = tokio::time::timeout(budget, fetch_chain_with(&client, &peer)).await;
                (peer, outcome)
            });
        }

        let mut chains = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((peer, Ok(Ok(chain)))) => {
                    debug!(peer = %peer, length = chain.len(), "fetched peer chain");
                    chains.push(PeerChain::new(peer, chain));
                }
                Ok((peer, Ok(Err(e)))) => warn!(peer = %peer, error = %e, "peer chain fetch failed"),
                Ok((peer, Err(_))) => warn!(peer = %peer, "peer chain fetch timed out"),
                Err(e) => warn!(error = %e, "peer fetch task failed"),
            }
        }
        chains
    }
}

async fn fetch_chain_with(client: &Client, peer: &str) -> Result<Vec<Block>> {
    let url = format!("http://{}/chain", peer);
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(ChainError::NetworkError(format!(
            "{} answered {}",
            url,
            response.status()
        )));
    }
    let body: ChainResponse = response.json().await?;
    if body.length != body.chain.len() {
        debug!(
            peer = %peer,
            reported = body.length,
            actual = body.chain.len(),
            "peer reported a length that disagrees with its chain"
        );
    }
    Ok(body.chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_peer_forms() {
        assert_eq!(normalize_peer("http://192.168.0.5:5000").unwrap(), "192.168.0.5:5000");
        assert_eq!(normalize_peer("http://192.168.0.5:5000/").unwrap(), "192.168.0.5:5000");
        assert_eq!(normalize_peer("192.168.0.5:5000").unwrap(), "192.168.0.5:5000");
        assert_eq!(normalize_peer("  localhost:5001/chain ").unwrap(), "localhost:5001");
        assert_eq!(normalize_peer("HTTP://Node.Example:80").unwrap(), "node.example:80");
    }

    #[test]
    fn test_normalize_peer_always_carries_port() {
        assert_eq!(normalize_peer("localhost").unwrap(), "localhost:80");
        assert_eq!(normalize_peer("http://10.0.0.5").unwrap(), "10.0.0.5:80");
        assert_eq!(normalize_peer("http://10.0.0.5:80").unwrap(), "10.0.0.5:80");
        assert_eq!(normalize_peer("http://[::1]:5000/").unwrap(), "[::1]:5000");
    }

    #[test]
    fn test_normalize_peer_rejects_non_http_schemes() {
        for address in [
            "https://node.example",
            "https://node.example:443",
            "https://node.example:8443",
            "ftp://node.example:21",
        ] {
            assert!(
                matches!(normalize_peer(address), Err(ChainError::InvalidPeer(_))),
                "{} should be rejected",
                address
            );
        }
    }

    #[test]
    fn test_normalize_peer_rejects_garbage() {
        assert!(matches!(normalize_peer(""), Err(ChainError::InvalidPeer(_))));
        assert!(normalize_peer("   ").is_err());
        assert!(normalize_peer("http://").is_err());
        assert!(normalize_peer("host:notaport").is_err());
    }

    #[test]
    fn test_register_deduplicates_after_normalisation() {
        let net = NetworkNode::new(Duration::from_secs(1)).unwrap();
        net.register_peer("http://127.0.0.1:5001/").unwrap();
        net.register_peer("127.0.0.1:5001").unwrap();
        net.register_peers(&["127.0.0.1:5002", "http://127.0.0.1:5002"]).unwrap();
        assert_eq!(net.list_peers(), vec!["127.0.0.1:5001", "127.0.0.1:5002"]);
    }

    #[test]
    fn test_register_peers_is_all_or_nothing() {
        let net = NetworkNode::new(Duration::from_secs(1)).unwrap();
        assert!(net.register_peers(&["127.0.0.1:5001", ""]).is_err());
        assert_eq!(net.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_skipped() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let net = NetworkNode::new(Duration::from_millis(500)).unwrap();
            // Port 9 (discard) on loopback is essentially never serving HTTP.
            net.register_peer("127.0.0.1:9").unwrap();
            assert!(net.fetch_peer_chains().await.is_empty());
        })
        .await
        .expect("test_unreachable_peer_is_skipped timed out");
    }
}
