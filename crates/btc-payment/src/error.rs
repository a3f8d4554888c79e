use thiserror::Error;

/// Errors raised while resolving signers and building payments.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("no viable selection: {0}")]
    NoViableSelection(String),

    #[error("finalization error: {0}")]
    Finalization(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}
