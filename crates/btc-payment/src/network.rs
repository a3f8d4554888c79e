use std::str::FromStr;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::error::BtcError;
use crate::signer::SigningIdentity;

/// Esplora endpoint for Bitcoin mainnet.
pub const MAINNET_RPC: &str = "https://blockstream.info/api";

/// Esplora endpoint for Bitcoin testnet.
pub const TESTNET_RPC: &str = "https://blockstream.info/testnet/api";

/// Esplora endpoint for the liquid (regtest-parameter) network.
pub const LIQUID_RPC: &str = "https://blockstream.info/liquid/api";

/// Supported Bitcoin networks.
///
/// `Liquid` signs with regtest address parameters (`bcrt1...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
    Liquid,
}

/// Node endpoint used by the UTXO source and broadcast collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcEndpoint {
    Mainnet,
    Testnet,
    Liquid,
}

impl BtcNetwork {
    /// Convert to the `bitcoin` crate's `Network` type.
    pub fn to_bitcoin_network(self) -> Network {
        match self {
            BtcNetwork::Mainnet => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
            BtcNetwork::Liquid => Network::Regtest,
        }
    }

    /// Endpoint selector for this network.
    pub fn endpoint(self) -> RpcEndpoint {
        match self {
            BtcNetwork::Mainnet => RpcEndpoint::Mainnet,
            BtcNetwork::Testnet => RpcEndpoint::Testnet,
            BtcNetwork::Liquid => RpcEndpoint::Liquid,
        }
    }
}

impl RpcEndpoint {
    /// Default base URL of the endpoint.
    pub fn url(self) -> &'static str {
        match self {
            RpcEndpoint::Mainnet => MAINNET_RPC,
            RpcEndpoint::Testnet => TESTNET_RPC,
            RpcEndpoint::Liquid => LIQUID_RPC,
        }
    }
}

/// Map a signer to the endpoint its UTXOs are fetched from and its
/// transactions are broadcast to.
pub fn network_of(signer: &SigningIdentity) -> RpcEndpoint {
    signer.network().endpoint()
}

impl FromStr for BtcNetwork {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(BtcNetwork::Mainnet),
            "testnet" => Ok(BtcNetwork::Testnet),
            "liquid" => Ok(BtcNetwork::Liquid),
            other => Err(BtcError::InvalidNetwork(format!("unknown network: {other}"))),
        }
    }
}

impl TryFrom<Network> for BtcNetwork {
    type Error = BtcError;

    fn try_from(network: Network) -> Result<Self, Self::Error> {
        match network {
            Network::Bitcoin => Ok(BtcNetwork::Mainnet),
            Network::Testnet => Ok(BtcNetwork::Testnet),
            Network::Regtest => Ok(BtcNetwork::Liquid),
            other => Err(BtcError::InvalidNetwork(format!("{other} not supported"))),
        }
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
            BtcNetwork::Liquid => write!(f, "liquid"),
        }
    }
}
