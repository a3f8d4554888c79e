use bitcoin::address::{Address, NetworkUnchecked};
use bitcoin::script::ScriptBuf;
use bitcoin::CompressedPublicKey;

use crate::error::BtcError;
use crate::network::BtcNetwork;

/// Derive a P2WPKH (native SegWit bech32) address from a compressed public key.
///
/// `bc1...` on mainnet, `tb1...` on testnet, `bcrt1...` on liquid.
pub fn pubkey_to_p2wpkh_address(pubkey: &CompressedPublicKey, network: BtcNetwork) -> Address {
    Address::p2wpkh(pubkey, network.to_bitcoin_network())
}

/// Parse an address and require that it belongs to `network`.
pub fn parse_address(address: &str, network: BtcNetwork) -> Result<Address, BtcError> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address {address}: {e}")))?
        .require_network(network.to_bitcoin_network())
        .map_err(|e| BtcError::InvalidAddress(format!("address {address} wrong network: {e}")))
}

/// Locking script of an address without checking its network.
///
/// Only used for size estimation; assembly re-parses with [`parse_address`].
pub fn script_pubkey_unchecked(address: &str) -> Result<ScriptBuf, BtcError> {
    let parsed = address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address {address}: {e}")))?;
    Ok(parsed.assume_checked().script_pubkey())
}
