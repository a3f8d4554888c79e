//! Payment configuration - passed in by the host application.

use btc_payment::{BtcNetwork, RpcEndpoint, DEFAULT_FEE_RATE_SAT_VBYTE, MAX_FEE_RATE_SAT_VBYTE};
use serde::{Deserialize, Serialize};

use crate::collaborator::NodeEndpoint;
use crate::error::AnchorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Network signers are expected to belong to.
    pub network: BtcNetwork,
    pub fee_rate_sat_vbyte: u64,
    /// Overrides the endpoint's default base URL.
    pub rpc_url: Option<String>,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            network: BtcNetwork::Testnet,
            fee_rate_sat_vbyte: DEFAULT_FEE_RATE_SAT_VBYTE,
            rpc_url: None,
        }
    }
}

impl PaymentConfig {
    pub fn new(network: BtcNetwork) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    pub fn with_fee_rate(mut self, sat_per_vbyte: u64) -> Self {
        self.fee_rate_sat_vbyte = sat_per_vbyte;
        self
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    /// Parse and validate a TOML document, e.g.
    ///
    /// ```toml
    /// network = "liquid"
    /// fee_rate_sat_vbyte = 20
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self, AnchorError> {
        let config: Self =
            toml::from_str(s).map_err(|e| AnchorError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnchorError> {
        if self.fee_rate_sat_vbyte == 0 {
            return Err(AnchorError::Config("fee rate must be positive".into()));
        }
        if self.fee_rate_sat_vbyte > MAX_FEE_RATE_SAT_VBYTE {
            return Err(AnchorError::Config(format!(
                "fee rate {} sat/vB exceeds {MAX_FEE_RATE_SAT_VBYTE}",
                self.fee_rate_sat_vbyte
            )));
        }
        if let Some(url) = &self.rpc_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(AnchorError::Config(format!("rpc_url must be http(s): {url}")));
            }
        }
        Ok(())
    }

    /// Base URL collaborators should use for `endpoint`.
    pub fn endpoint_url(&self, endpoint: RpcEndpoint) -> &str {
        self.rpc_url.as_deref().unwrap_or(endpoint.url())
    }

    /// Endpoint handed to the UTXO source and broadcast sink.
    pub fn node_endpoint(&self, endpoint: RpcEndpoint) -> NodeEndpoint {
        NodeEndpoint {
            network: endpoint,
            base_url: self.endpoint_url(endpoint).to_string(),
        }
    }
}
