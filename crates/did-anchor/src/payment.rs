use btc_payment::{build_transaction, network_of, Payment, SigningIdentity};
use tracing::{debug, info, warn};

use crate::collaborator::{BroadcastSink, UtxoSource};
use crate::config::PaymentConfig;
use crate::error::AnchorError;

/// Value sent to each DID owner address alongside the registration payload.
pub const DID_OWNER_MARKER_SAT: u64 = 1;

/// Funds, builds, and broadcasts payments for a signer.
///
/// Holds no state between calls. Two calls for the same signer must not run
/// concurrently: both would select from the same UTXO snapshot.
pub struct AnchorClient<U, B> {
    utxo_source: U,
    broadcast: B,
    config: PaymentConfig,
}

impl<U: UtxoSource, B: BroadcastSink> AnchorClient<U, B> {
    pub fn new(utxo_source: U, broadcast: B, config: PaymentConfig) -> Result<Self, AnchorError> {
        config.validate()?;
        Ok(Self {
            utxo_source,
            broadcast,
            config,
        })
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Pay `receivers` from the signer's UTXOs. Returns the broadcast txid.
    pub async fn segwit_transfer(
        &self,
        signer: &SigningIdentity,
        receivers: &[Payment],
    ) -> Result<String, AnchorError> {
        self.fund_and_broadcast(signer, receivers, None).await
    }

    /// Anchor a DID registration: one marker payment per owner address, plus
    /// `did_message` committed as embedded data.
    pub async fn register_did(
        &self,
        signer: &SigningIdentity,
        owner_addresses: &[String],
        did_message: &str,
    ) -> Result<String, AnchorError> {
        let receivers: Vec<Payment> = owner_addresses
            .iter()
            .map(|address| Payment::to_address(address.as_str(), DID_OWNER_MARKER_SAT))
            .collect();

        self.fund_and_broadcast(signer, &receivers, Some(did_message.as_bytes()))
            .await
    }

    async fn fund_and_broadcast(
        &self,
        signer: &SigningIdentity,
        receivers: &[Payment],
        embedded_data: Option<&[u8]>,
    ) -> Result<String, AnchorError> {
        if signer.network() != self.config.network {
            return Err(AnchorError::Config(format!(
                "signer is on {}, client is configured for {}",
                signer.network(),
                self.config.network
            )));
        }

        let endpoint = self.config.node_endpoint(network_of(signer));
        let address = signer.address().to_string();

        let utxos = self
            .utxo_source
            .get_spendable_outputs(&address, &endpoint)
            .await
            .map_err(AnchorError::UtxoSource)?;
        debug!(%address, utxos = utxos.len(), "fetched spendable outputs");

        let finalized = build_transaction(
            signer,
            &utxos,
            receivers,
            embedded_data,
            self.config.fee_rate_sat_vbyte,
        )?;

        let txid = self
            .broadcast
            .submit(&finalized.hex, &endpoint)
            .await
            .map_err(AnchorError::Broadcast)?;

        let expected = finalized.txid().to_string();
        if txid != expected {
            warn!(%txid, %expected, "node reported a different txid");
        }
        info!(%txid, endpoint = %endpoint.base_url, "broadcast transaction");

        Ok(txid)
    }
}
