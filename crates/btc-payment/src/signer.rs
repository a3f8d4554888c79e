use std::fmt;

use bitcoin::address::Address;
use bitcoin::key::{CompressedPublicKey, PrivateKey};
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::WPubkeyHash;
use tracing::debug;
use zeroize::Zeroizing;

use crate::address::pubkey_to_p2wpkh_address;
use crate::error::BtcError;
use crate::network::BtcNetwork;

/// Everything needed to fund and sign a payment from one P2WPKH key.
///
/// Built once per operation by [`resolve_signer`] and never persisted.
#[derive(Clone)]
pub struct SigningIdentity {
    private_key: PrivateKey,
    public_key: CompressedPublicKey,
    address: Address,
    network: BtcNetwork,
    output_script: ScriptBuf,
}

impl SigningIdentity {
    pub fn public_key(&self) -> &CompressedPublicKey {
        &self.public_key
    }

    /// The signer's P2WPKH address; also the destination of change outputs.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    /// Locking script of the signer's address (`OP_0 <20-byte key hash>`).
    pub fn output_script(&self) -> &ScriptBuf {
        &self.output_script
    }

    pub fn wpubkey_hash(&self) -> WPubkeyHash {
        self.public_key.wpubkey_hash()
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.private_key.inner
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address.to_string())
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

/// Resolve the signing identity of a raw 32-byte secp256k1 private key.
///
/// The key is round-tripped through its compressed WIF encoding before the
/// key pair and the version-0 P2WPKH address are derived, so the result is a
/// pure function of `(private_key, network)`.
pub fn resolve_signer(private_key: &[u8], network: BtcNetwork) -> Result<SigningIdentity, BtcError> {
    let raw: Zeroizing<[u8; 32]> = Zeroizing::new(private_key.try_into().map_err(|_| {
        BtcError::InvalidPrivateKey(format!("expected 32 bytes, got {}", private_key.len()))
    })?);

    let secret_key = SecretKey::from_slice(&raw[..])
        .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;

    let wif = Zeroizing::new(PrivateKey::new(secret_key, network.to_bitcoin_network()).to_wif());
    let private_key = PrivateKey::from_wif(wif.as_str())
        .map_err(|e| BtcError::InvalidPrivateKey(format!("WIF import failed: {e}")))?;

    let secp = Secp256k1::new();
    let public_key = CompressedPublicKey::from_private_key(&secp, &private_key)
        .map_err(|e| BtcError::InvalidPublicKey(format!("key is not compressed: {e}")))?;

    let address = pubkey_to_p2wpkh_address(&public_key, network);
    let output_script = address.script_pubkey();

    debug!(%address, %network, "resolved signer");

    Ok(SigningIdentity {
        private_key,
        public_key,
        address,
        network,
        output_script,
    })
}
