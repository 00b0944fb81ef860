//! Transaction types for proofchain

use crate::error::ChainError;
use serde::{Deserialize, Serialize};

/// Sender recorded on the reward transaction paid to a node for mining.
pub const REWARD_SENDER: &str = "0";

/// Amount paid to the miner of every block.
pub const MINING_REWARD: f64 = 1.0;

/// A value transfer waiting to be, or already, committed to a block.
///
/// Transactions carry no identity beyond their content and are never
/// checked against balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    /// Reward paid to `node_id` for forging a block.
    pub fn reward(node_id: impl Into<String>) -> Self {
        Self::new(REWARD_SENDER, node_id, MINING_REWARD)
    }

    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }

    /// Shape check applied to externally submitted transactions.
    ///
    /// JSON has no encoding for NaN or infinity, so such an amount would not
    /// survive the trip to a peer intact.
    pub fn validate(&self) -> Result<(), ChainError> {
        if !self.amount.is_finite() {
            return Err(ChainError::InvalidTransaction(format!(
                "amount must be a finite number, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_transaction() {
        let tx = Transaction::reward("node-a");
        assert_eq!(tx.sender, REWARD_SENDER);
        assert_eq!(tx.recipient, "node-a");
        assert_eq!(tx.amount, MINING_REWARD);
        assert!(tx.is_reward());
        assert!(!Transaction::new("alice", "bob", 1.0).is_reward());
    }

    #[test]
    fn test_validate_rejects_non_finite_amount() {
        assert!(Transaction::new("a", "b", 3.5).validate().is_ok());
        assert!(matches!(
            Transaction::new("a", "b", f64::NAN).validate(),
            Err(ChainError::InvalidTransaction(_))
        ));
        assert!(Transaction::new("a", "b", f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_serde_field_names() {
        let tx = Transaction::new("alice", "bob", 2.0);
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["sender"], "alice");
        assert_eq!(value["recipient"], "bob");
        assert_eq!(value["amount"], 2.0);
    }
}
