use btc_payment::BtcError;
use thiserror::Error;

/// Boxed error returned by the UTXO source and broadcast collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("Payment failed: {0}")]
    Payment(#[from] BtcError),

    #[error("UTXO source failed: {0}")]
    UtxoSource(#[source] BoxError),

    #[error("Broadcast failed: {0}")]
    Broadcast(#[source] BoxError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
