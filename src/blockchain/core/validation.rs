use crate::blockchain::core::chain::Block;
use crate::error::{ChainError, Result};
use crate::miner::{valid_proof, Difficulty};

/// Walk a candidate chain and report the first broken link or proof.
///
/// Only hash linkage and proof-of-work are checked. Chains of zero or one
/// block pass vacuously.
pub fn validate_chain(chain: &[Block], difficulty: Difficulty) -> Result<()> {
    for pair in chain.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);

        // A block that cannot be hashed cannot be linked to.
        let linked = previous
            .hash()
            .map(|hash| hash == current.previous_hash)
            .unwrap_or(false);
        if !linked {
            return Err(ChainError::InvalidBlockLinkage {
                index: current.index,
            });
        }

        if !valid_proof(previous.proof, current.proof, difficulty) {
            return Err(ChainError::InvalidProofOfWork {
                index: current.index,
            });
        }
    }
    Ok(())
}

pub fn valid_chain(chain: &[Block], difficulty: Difficulty) -> bool {
    validate_chain(chain, difficulty).is_ok()
}
