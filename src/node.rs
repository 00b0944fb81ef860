use crate::blockchain::{Block, Blockchain};
use crate::config::Config;
use crate::consensus::{resolve, Resolution};
use crate::error::{ChainError, Result};
use crate::miner::{build_mining_pool, find_proof, find_proof_parallel, Difficulty, ProofSearch};
use crate::network::NetworkNode;
use crate::transaction::Transaction;
use rand::RngCore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Ready,
    ShuttingDown,
}

struct MiningRun {
    task: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
}

/// Raises its flag when dropped, so a search outlives neither its caller nor
/// a dropped request future.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// One participant in the network.
///
/// Owns the single ledger instance and this node's identity. Every read or
/// write of the chain and pending pool goes through `blockchain`'s mutex, so a
/// block append can never interleave with a chain replacement.
pub struct Node {
    pub config: Config,
    node_id: String,
    difficulty: Difficulty,
    blockchain: Mutex<Blockchain>,
    network: Arc<NetworkNode>,
    mining_pool: Option<Arc<rayon::ThreadPool>>,
    state: RwLock<NodeState>,
    shutdown: Arc<AtomicBool>,
    is_mining: AtomicBool,
    blocks_mined: AtomicU64,
    mining_run: Mutex<Option<MiningRun>>,
}

fn random_node_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl Node {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let difficulty = config.miner.difficulty()?;
        let node_id = config.miner.node_id.clone().unwrap_or_else(random_node_id);

        let network = Arc::new(NetworkNode::new(config.network.peer_timeout())?);
        for peer in &config.network.bootstrap_peers {
            network.register_peer(peer)?;
        }

        let mining_pool = match config.miner.threads {
            0 | 1 => None,
            threads => Some(Arc::new(build_mining_pool(threads)?)),
        };

        info!(node_id = %node_id, difficulty = %difficulty, "ledger initialised");

        Ok(Self {
            blockchain: Mutex::new(Blockchain::new(difficulty)?),
            config,
            node_id,
            difficulty,
            network,
            mining_pool,
            state: RwLock::new(NodeState::Booting),
            shutdown: Arc::new(AtomicBool::new(false)),
            is_mining: AtomicBool::new(false),
            blocks_mined: AtomicU64::new(0),
            mining_run: Mutex::new(None),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn network(&self) -> &Arc<NetworkNode> {
        &self.network
    }

    pub async fn state(&self) -> NodeState {
        self.state.read().await.clone()
    }

    pub async fn set_state(&self, state: NodeState) {
        *self.state.write().await = state;
    }

    pub async fn chain(&self) -> Vec<Block> {
        self.blockchain.lock().await.chain().to_vec()
    }

    pub async fn pending(&self) -> Vec<Transaction> {
        self.blockchain.lock().await.pending().to_vec()
    }

    /// Queue a transaction; returns the index of the block that will hold it.
    pub async fn new_transaction(&self, tx: Transaction) -> u64 {
        self.blockchain
            .lock()
            .await
            .new_transaction(tx.sender, tx.recipient, tx.amount)
    }

    /// Mine one block, rewarding this node.
    ///
    /// Dropping the returned future cancels the proof search.
    pub async fn mine(&self) -> Result<Block> {
        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(cancel.clone());
        self.mine_until(cancel).await
    }

    // The proof search runs on a blocking worker without the ledger lock.
    // Committing re-checks the tip and starts over if the chain moved.
    async fn mine_until(&self, cancel: Arc<AtomicBool>) -> Result<Block> {
        loop {
            let tip = self.blockchain.lock().await.tip()?;
            let search = ProofSearch::new(self.difficulty)
                .with_max_attempts(self.config.miner.max_attempts)
                .with_cancel(cancel.clone())
                .with_cancel(self.shutdown.clone());

            let last_proof = tip.proof;
            let pool = self.mining_pool.clone();
            let proof = tokio::task::spawn_blocking(move || match pool {
                Some(pool) => find_proof_parallel(last_proof, &search, &pool),
                None => find_proof(last_proof, &search),
            })
            .await
            .map_err(|e| ChainError::TaskFailed(e.to_string()))??;

            let mut blockchain = self.blockchain.lock().await;
            match blockchain.commit_proof(&self.node_id, &tip, proof)? {
                Some(block) => {
                    self.blocks_mined.fetch_add(1, Ordering::SeqCst);
                    info!(
                        index = block.index,
                        proof = block.proof,
                        transactions = block.transactions.len(),
                        "new block forged"
                    );
                    return Ok(block);
                }
                None => {
                    info!(stale_length = tip.length, "chain advanced during proof search; retrying");
                }
            }
        }
    }

    /// Fetch every peer's chain and adopt the longest valid one.
    pub async fn resolve_conflicts(&self) -> Result<Resolution> {
        // Fetch without the lock; the decision is taken against whatever the
        // local chain is once the lock is held.
        let peer_chains = self.network.fetch_peer_chains().await;

        let mut blockchain = self.blockchain.lock().await;
        let resolution = resolve(blockchain.chain(), peer_chains, self.difficulty);
        if resolution.replaced {
            blockchain.replace_chain(resolution.chain.clone())?;
            info!(
                source = resolution.source.as_deref().unwrap_or("unknown"),
                length = resolution.chain.len(),
                "local chain replaced by peer chain"
            );
        } else {
            info!(length = resolution.chain.len(), "local chain is authoritative");
        }
        Ok(resolution)
    }

    pub fn is_mining(&self) -> bool {
        self.is_mining.load(Ordering::Relaxed)
    }

    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::Relaxed)
    }

    /// Mine continuously in the background until [`Node::stop_mining`].
    pub async fn start_mining(self: &Arc<Self>) -> Result<()> {
        // Held until the run is stored so a concurrent stop never sees a
        // started run without its handle.
        let mut slot = self.mining_run.lock().await;
        if self
            .is_mining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ChainError::MiningAlreadyRunning);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let node = self.clone();
        let run_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            info!(node_id = %node.node_id, "background mining started");
            while !run_cancel.load(Ordering::Relaxed) && !node.shutdown.load(Ordering::Relaxed) {
                match node.mine_until(run_cancel.clone()).await {
                    Ok(_) => {}
                    Err(ChainError::MiningCancelled) => break,
                    Err(e) => {
                        warn!(error = %e, "mining attempt failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            node.is_mining.store(false, Ordering::SeqCst);
            info!("background mining stopped");
        });

        *slot = Some(MiningRun { task, cancel });
        Ok(())
    }

    pub async fn stop_mining(&self) -> Result<()> {
        let run = self.mining_run.lock().await.take();
        match run {
            Some(run) if self.is_mining() => {
                run.cancel.store(true, Ordering::SeqCst);
                if let Err(e) = run.task.await {
                    warn!(error = %e, "mining task ended abnormally");
                }
                self.is_mining.store(false, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(ChainError::MiningNotRunning),
        }
    }

    /// Periodically resolve conflicts; does nothing when the interval is 0.
    pub fn spawn_resolver(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.config.network.resolve_interval_secs;
        if interval == 0 {
            return None;
        }
        let node = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval));
            ticker.tick().await;
            while !node.shutdown.load(Ordering::Relaxed) {
                ticker.tick().await;
                if let Err(e) = node.resolve_conflicts().await {
                    warn!(error = %e, "scheduled conflict resolution failed");
                }
            }
        }))
    }

    /// Abort in-flight searches and stop background work.
    pub async fn shutdown(&self) {
        self.set_state(NodeState::ShuttingDown).await;
        self.shutdown.store(true, Ordering::SeqCst);
        if self.is_mining() {
            let _ = self.stop_mining().await;
        }
    }

    /// Serve the HTTP API until the listener fails.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let resolver = self.spawn_resolver();
        self.set_state(NodeState::Ready).await;
        info!(
            node_id = %self.node_id,
            port = self.config.network.api_port,
            peers = self.network.peer_count(),
            "node ready"
        );

        let result = Node::start_api(self.clone()).await;
        if let Err(e) = &result {
            error!(error = %e, "API server failed");
        }
        if let Some(resolver) = resolver {
            resolver.abort();
        }
        self.shutdown().await;
        result
    }

    #[cfg(feature = "api")]
    async fn start_api(node: Arc<Self>) -> Result<()> {
        let port = node.config.network.api_port;
        let state = Arc::new(crate::api::ApiState::new(node));
        crate::api::run_api_server(state, port).await
    }

    #[cfg(not(feature = "api"))]
    async fn start_api(_node: Arc<Self>) -> Result<()> {
        Err(ChainError::Config(
            "API feature not enabled in this build".to_string(),
        ))
    }
}
