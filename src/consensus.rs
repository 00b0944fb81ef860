//! Longest-valid-chain conflict resolution
//!
//! Deciding which chain wins is a pure function of the local chain and the
//! chains peers reported; fetching those chains is the network layer's job.

use crate::blockchain::{validate_chain, Block};
use crate::miner::Difficulty;
use tracing::{debug, info};

/// A chain as reported by one peer.
#[derive(Debug, Clone)]
pub struct PeerChain {
    pub peer: String,
    pub chain: Vec<Block>,
}

impl PeerChain {
    pub fn new(peer: impl Into<String>, chain: Vec<Block>) -> Self {
        Self {
            peer: peer.into(),
            chain,
        }
    }
}

/// Outcome of a resolution round.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub replaced: bool,
    /// The winning chain: a peer's if `replaced`, otherwise the local one.
    pub chain: Vec<Block>,
    /// Peer that supplied the winning chain.
    pub source: Option<String>,
}

/// Pick the longest valid chain among the local chain and `peers`.
///
/// A peer chain must be strictly longer than the best seen so far, so the
/// local chain wins every tie. Chains are never merged.
pub fn resolve(
    local: &[Block],
    peers: impl IntoIterator<Item = PeerChain>,
    difficulty: Difficulty,
) -> Resolution {
    let mut best: Option<PeerChain> = None;
    let mut best_length = local.len();

    for candidate in peers {
        if candidate.chain.len() <= best_length {
            debug!(
                peer = %candidate.peer,
                length = candidate.chain.len(),
                best_length,
                "peer chain not longer; ignoring"
            );
            continue;
        }
        if let Err(e) = validate_chain(&candidate.chain, difficulty) {
            info!(peer = %candidate.peer, reason = %e, "rejecting invalid peer chain");
            continue;
        }
        best_length = candidate.chain.len();
        best = Some(candidate);
    }

    match best {
        Some(winner) => Resolution {
            replaced: true,
            chain: winner.chain,
            source: Some(winner.peer),
        },
        None => Resolution {
            replaced: false,
            chain: local.to_vec(),
            source: None,
        },
    }
}
