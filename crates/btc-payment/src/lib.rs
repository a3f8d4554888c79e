//! Bitcoin payment construction for on-chain anchoring.
//!
//! Resolves a P2WPKH signing identity from a raw key, selects UTXOs against
//! a size-based fee, and assembles, signs, and finalizes native SegWit
//! transactions that may carry one `OP_RETURN` data payload. Everything here
//! is synchronous and free of I/O.

pub mod address;
pub mod error;
pub mod fee;
pub mod network;
pub mod signer;
pub mod transaction;
pub mod utxo;

pub use error::BtcError;
pub use fee::{DEFAULT_FEE_RATE_SAT_VBYTE, MAX_FEE_RATE_SAT_VBYTE};
pub use network::{network_of, BtcNetwork, RpcEndpoint};
pub use signer::{resolve_signer, SigningIdentity};
pub use transaction::{
    assemble_sign_and_serialize, build_transaction, decode_transaction, FinalizedTransaction,
};
pub use utxo::{select_inputs_and_outputs, Destination, Payment, SelectedOutput, Selection, Utxo};
