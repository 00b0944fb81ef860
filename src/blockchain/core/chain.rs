use crate::crypto::hash_block;
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::miner::{find_proof, Difficulty, ProofSearch};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `previous_hash` of the genesis block; it has no predecessor to hash.
pub const GENESIS_PREVIOUS_HASH: &str = "1";
/// Proof of the genesis block, agreed by convention rather than mined.
pub const GENESIS_PROOF: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    pub fn hash(&self) -> Result<String> {
        hash_block(self)
    }
}

/// Snapshot of the chain head taken before a proof search.
///
/// A proof found against one tip is only committed if the tip is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTip {
    pub length: usize,
    pub proof: u64,
    pub hash: String,
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// The ledger: an append-only chain of blocks plus the pending pool.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    mempool: Mempool,
    difficulty: Difficulty,
}

impl Blockchain {
    /// Create a ledger seeded with the genesis block.
    pub fn new(difficulty: Difficulty) -> Result<Self> {
        let mut blockchain = Blockchain {
            blocks: Vec::new(),
            mempool: Mempool::new(),
            difficulty,
        };
        blockchain.new_block(GENESIS_PROOF, Some(GENESIS_PREVIOUS_HASH.to_string()))?;
        Ok(blockchain)
    }

    pub fn chain(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn pending(&self) -> &[Transaction] {
        self.mempool.get_all_transactions()
    }

    pub fn last_block(&self) -> Result<&Block> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    pub fn tip(&self) -> Result<ChainTip> {
        let last = self.last_block()?;
        Ok(ChainTip {
            length: self.blocks.len(),
            proof: last.proof,
            hash: last.hash()?,
        })
    }

    /// Queue a transaction for the next block.
    ///
    /// Returns the index of the block that will contain it.
    pub fn new_transaction(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
    ) -> u64 {
        self.mempool
            .add_transaction(Transaction::new(sender, recipient, amount));
        self.blocks.len() as u64 + 1
    }

    /// Forge a block holding every pending transaction and append it.
    ///
    /// `previous_hash` defaults to the hash of the current last block.
    pub fn new_block(&mut self, proof: u64, previous_hash: Option<String>) -> Result<Block> {
        // Resolve the link before draining so a failure leaves the pool intact.
        let previous_hash = match previous_hash {
            Some(hash) => hash,
            None => self.last_block()?.hash()?,
        };

        let block = Block {
            index: self.blocks.len() as u64 + 1,
            timestamp: now_seconds(),
            transactions: self.mempool.drain(),
            proof,
            previous_hash,
        };

        debug!(
            index = block.index,
            transactions = block.transactions.len(),
            proof = block.proof,
            "block appended"
        );
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Search for the next proof and forge a block rewarding `node_id`.
    pub fn mine(&mut self, node_id: &str) -> Result<Block> {
        self.mine_with(node_id, &ProofSearch::new(self.difficulty))
    }

    /// [`Blockchain::mine`] with explicit search bounds.
    pub fn mine_with(&mut self, node_id: &str, search: &ProofSearch) -> Result<Block> {
        let last_proof = self.last_block()?.proof;
        let proof = find_proof(last_proof, search)?;
        self.mempool.add_transaction(Transaction::reward(node_id));
        self.new_block(proof, None)
    }

    /// Commit a proof found against `expected` while the lock was released.
    ///
    /// Returns `Ok(None)` when the tip moved in the meantime; the caller must
    /// search again against the new tip.
    pub fn commit_proof(
        &mut self,
        node_id: &str,
        expected: &ChainTip,
        proof: u64,
    ) -> Result<Option<Block>> {
        if self.tip()? != *expected {
            return Ok(None);
        }
        self.mempool.add_transaction(Transaction::reward(node_id));
        self.new_block(proof, None).map(Some)
    }

    /// Swap in a whole new chain. Used only by conflict resolution.
    pub fn replace_chain(&mut self, chain: Vec<Block>) -> Result<()> {
        if chain.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        self.blocks = chain;
        Ok(())
    }
}
