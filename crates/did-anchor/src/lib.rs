//! Anchor DID registrations and SegWit payments on Bitcoin.
//!
//! Wraps the pure builders of `btc-payment` with the network collaborators
//! (UTXO lookup, broadcast), configuration, and logging a host needs.

pub mod collaborator;
pub mod config;
pub mod error;
pub mod logging;
pub mod payment;

pub use btc_payment::{
    resolve_signer, BtcError, BtcNetwork, Payment, RpcEndpoint, SigningIdentity, Utxo,
    MAX_FEE_RATE_SAT_VBYTE,
};
pub use collaborator::{BroadcastSink, NodeEndpoint, UtxoSource};
pub use config::PaymentConfig;
pub use error::{AnchorError, BoxError};
pub use payment::{AnchorClient, DID_OWNER_MARKER_SAT};

/// Resolve a signer on the network `config` is set up for.
pub fn signer_for(private_key: &[u8], config: &PaymentConfig) -> Result<SigningIdentity, AnchorError> {
    Ok(resolve_signer(private_key, config.network)?)
}
