//! Network-facing collaborators. Implementations own transport, retry, and
//! timeout policy; the payment flows await them once and propagate failures.

use async_trait::async_trait;
use btc_payment::{RpcEndpoint, Utxo};

use crate::error::BoxError;

/// Node a collaborator should talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    /// Network the node serves.
    pub network: RpcEndpoint,
    /// Configured override, or the network's default Esplora base URL.
    pub base_url: String,
}

/// Source of the signer's spendable outputs.
#[async_trait]
pub trait UtxoSource: Send + Sync {
    /// Snapshot of the UTXOs currently spendable by `address`.
    async fn get_spendable_outputs(
        &self,
        address: &str,
        endpoint: &NodeEndpoint,
    ) -> Result<Vec<Utxo>, BoxError>;
}

/// Sink that relays a finalized transaction to a node.
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    /// Submit `tx_hex` and return the transaction id reported by the node.
    async fn submit(&self, tx_hex: &str, endpoint: &NodeEndpoint) -> Result<String, BoxError>;
}
