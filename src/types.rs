use std::fmt;
use std::str::FromStr;
use bitcoin::{
    secp256k1::{All, Secp256k1},
    Address, CompressedPublicKey, Network as BitcoinNetwork, NetworkKind, PrivateKey, PublicKey,
};

use crate::error::AppError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScriptType {
    P2PKH,
    P2WPKH,
}

impl FromStr for ScriptType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "p2pkh" | "legacy" => Ok(ScriptType::P2PKH),
            "p2wpkh" | "segwit" => Ok(ScriptType::P2WPKH),
            other => Err(AppError::InvalidInput(format!("未対応のアドレスタイプです: {}", other))),
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptType::P2PKH => f.write_str("p2pkh"),
            ScriptType::P2WPKH => f.write_str("p2wpkh"),
        }
    }
}

/// セッションで使う単一の鍵ペアと、そこから導いた受取/おつりアドレス。
#[derive(Debug, Clone)]
pub struct WalletKey {
    pub name: String,
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
    pub script_type: ScriptType,
    pub address: Address,
    pub network: BitcoinNetwork,
}

impl WalletKey {
    pub fn from_wif(
        name: &str,
        wif: &str,
        script_type: ScriptType,
        network: BitcoinNetwork,
        secp: &Secp256k1<All>,
    ) -> Result<Self, AppError> {
        let private_key = PrivateKey::from_wif(wif).map_err(AppError::BitcoinKey)?;
        Self::from_private_key(name, private_key, script_type, network, secp)
    }

    pub fn from_private_key(
        name: &str,
        private_key: PrivateKey,
        script_type: ScriptType,
        network: BitcoinNetwork,
        secp: &Secp256k1<All>,
    ) -> Result<Self, AppError> {
        if private_key.network != NetworkKind::from(network) {
            return Err(AppError::NetworkMismatch {
                cli_network: format!("{:?}", network),
                inferred_network: format!("{:?}", private_key.network),
            });
        }
        let public_key = private_key.public_key(secp);

        let address = match script_type {
            ScriptType::P2PKH => Address::p2pkh(public_key.pubkey_hash(), network),
            ScriptType::P2WPKH => {
                let compressed = CompressedPublicKey::try_from(public_key)
                    .map_err(|_| AppError::UncompressedKey { wallet: name.to_string() })?;
                Address::p2wpkh(&compressed, network)
            }
        };
        log::debug!("ウォレット {} のアドレスを導出: {} ({})", name, address, script_type);

        Ok(WalletKey {
            name: name.to_string(),
            private_key,
            public_key,
            script_type,
            address,
            network,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use bitcoin::secp256k1::SecretKey;

    pub fn test_key(script_type: ScriptType) -> WalletKey {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let private_key = PrivateKey::new(secret, BitcoinNetwork::Testnet);
        WalletKey::from_private_key("test", private_key, script_type, BitcoinNetwork::Testnet, &secp)
            .unwrap()
    }

    /// 別の鍵で作った送金先アドレス
    pub fn other_address() -> Address {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let private_key = PrivateKey::new(secret, BitcoinNetwork::Testnet);
        Address::p2pkh(private_key.public_key(&secp).pubkey_hash(), BitcoinNetwork::Testnet)
    }
}
