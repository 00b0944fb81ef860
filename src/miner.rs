//! Proof-of-work search and verification
//!
//! A proof `p` is valid against the previous block's proof `last` when the
//! SHA-256 of the decimal string `"{last}{p}"` starts with `difficulty`
//! hexadecimal zeros. Finding one is a brute-force scan; checking one is a
//! single hash.

use crate::crypto::sha256_hex;
use crate::error::{ChainError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How often the sequential search polls its cancel flag.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Candidates handed to the rayon pool per round in the parallel search.
const PARALLEL_BATCH_SIZE: u64 = 16_384;

/// Number of leading `'0'` hex characters a proof digest must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difficulty(u32);

impl Difficulty {
    pub const DEFAULT: Difficulty = Difficulty(4);
    /// A SHA-256 digest has 64 hex characters.
    pub const MAX: u32 = 64;

    pub fn new(leading_zeros: u32) -> Result<Self> {
        if leading_zeros > Self::MAX {
            return Err(ChainError::Config(format!(
                "difficulty {} exceeds the {} hex characters of a digest",
                leading_zeros,
                Self::MAX
            )));
        }
        Ok(Difficulty(leading_zeros))
    }

    pub fn leading_zeros(self) -> u32 {
        self.0
    }

    /// Whether a hex digest satisfies this difficulty.
    pub fn is_met_by(self, digest: &str) -> bool {
        let n = self.0 as usize;
        digest.len() >= n && digest.bytes().take(n).all(|b| b == b'0')
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Does `proof` solve the puzzle posed by `last_proof`?
pub fn valid_proof(last_proof: u64, proof: u64, difficulty: Difficulty) -> bool {
    let guess = format!("{}{}", last_proof, proof);
    difficulty.is_met_by(&sha256_hex(guess.as_bytes()))
}

/// Parameters bounding a proof search.
///
/// The default search starts at zero and never gives up. Raising any of the
/// attached cancel flags stops it.
#[derive(Debug, Clone, Default)]
pub struct ProofSearch {
    pub difficulty: Difficulty,
    pub start: u64,
    pub max_attempts: Option<u64>,
    pub cancel: Vec<Arc<AtomicBool>>,
}

impl ProofSearch {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            ..Default::default()
        }
    }

    pub fn with_start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel.push(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.iter().any(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Scan upward from `search.start` for the first proof valid against `last_proof`.
pub fn find_proof(last_proof: u64, search: &ProofSearch) -> Result<u64> {
    let mut proof = search.start;
    let mut attempts: u64 = 0;

    loop {
        if search.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(ChainError::ProofSearchExhausted { attempts });
        }
        if attempts % CANCEL_CHECK_INTERVAL == 0 && search.is_cancelled() {
            return Err(ChainError::MiningCancelled);
        }
        if valid_proof(last_proof, proof, search.difficulty) {
            return Ok(proof);
        }
        attempts += 1;
        proof = proof
            .checked_add(1)
            .ok_or(ChainError::ProofSearchExhausted { attempts })?;
    }
}

/// Worker pool for [`find_proof_parallel`]; build it once and reuse it.
pub fn build_mining_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("proofchain-miner-{}", i))
        .build()
        .map_err(|e| ChainError::Config(format!("failed to build mining pool: {}", e)))
}

/// Same search as [`find_proof`], spread over the workers of `pool`.
///
/// Candidates are tested in consecutive batches and each batch keeps the
/// lowest hit, so the result is identical to the sequential scan, including
/// at the top of the `u64` range.
pub fn find_proof_parallel(
    last_proof: u64,
    search: &ProofSearch,
    pool: &rayon::ThreadPool,
) -> Result<u64> {
    pool.install(|| {
        let mut base = search.start;
        let mut attempts: u64 = 0;

        loop {
            if search.is_cancelled() {
                return Err(ChainError::MiningCancelled);
            }

            let budget = search
                .max_attempts
                .map_or(u64::MAX, |max| max.saturating_sub(attempts));
            // Candidates left in base..=u64::MAX, saturating when base is 0.
            let remaining = (u64::MAX - base).saturating_add(1);
            let len = PARALLEL_BATCH_SIZE.min(budget).min(remaining);
            if len == 0 {
                return Err(ChainError::ProofSearchExhausted { attempts });
            }

            let last = base + (len - 1);
            let hit = (base..=last)
                .into_par_iter()
                .find_first(|&candidate| valid_proof(last_proof, candidate, search.difficulty));
            if let Some(proof) = hit {
                return Ok(proof);
            }

            attempts += len;
            if last == u64::MAX {
                return Err(ChainError::ProofSearchExhausted { attempts });
            }
            base = last + 1;
        }
    })
}
