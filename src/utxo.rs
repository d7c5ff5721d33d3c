use std::str::FromStr;
use bitcoin::{Amount, OutPoint, Txid};
use serde::Deserialize;

use crate::error::AppError;

/// プロバイダが返す未使用出力 (`{txid, vout, satoshis}`)
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderOutput {
    pub txid: String,
    pub vout: u32,
    pub satoshis: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utxo {
    pub out_point: OutPoint,
    pub value: Amount,
}

/// 1アドレス分の UTXO スナップショット。取得のたびに作り直し、変更はしない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSet {
    utxos: Vec<Utxo>,
    total_available: Amount,
}

impl UtxoSet {
    /// プロバイダの結果をそのまま信用する (重複排除はしない)。
    pub fn from_provider_snapshot(outputs: Vec<ProviderOutput>) -> Result<Self, AppError> {
        let mut utxos = Vec::with_capacity(outputs.len());
        let mut total_available = Amount::ZERO;

        for output in outputs {
            let txid = Txid::from_str(&output.txid)
                .map_err(|e| AppError::InvalidInput(format!("無効なTXID形式 ({}): {}", output.txid, e)))?;
            let value = Amount::from_sat(output.satoshis);
            total_available = total_available.checked_add(value).ok_or_else(|| {
                AppError::InvalidInput("UTXO 合計額がオーバーフローしました".to_string())
            })?;
            log::debug!("UTXO追加: txid={}, vout={}, value={}", output.txid, output.vout, output.satoshis);
            utxos.push(Utxo {
                out_point: OutPoint::new(txid, output.vout),
                value,
            });
        }

        Ok(UtxoSet { utxos, total_available })
    }

    pub fn total_available(&self) -> Amount {
        self.total_available
    }

    pub fn count(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos.iter()
    }
}

impl IntoIterator for UtxoSet {
    type Item = Utxo;
    type IntoIter = std::vec::IntoIter<Utxo>;

    fn into_iter(self) -> Self::IntoIter {
        self.utxos.into_iter()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_and_counts() {
        let set = test_support::snapshot(&[100_000, 2_500, 1]);
        assert_eq!(set.count(), 3);
        assert_eq!(set.total_available(), Amount::from_sat(102_501));
        let values: Vec<u64> = set.iter().map(|u| u.value.to_sat()).collect();
        assert_eq!(values, vec![100_000, 2_500, 1]);
    }

    #[test]
    fn empty_snapshot() {
        let set = UtxoSet::from_provider_snapshot(Vec::new()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.total_available(), Amount::ZERO);
    }

    #[test]
    fn duplicates_are_kept() {
        let dup = ProviderOutput { txid: "ab".repeat(32), vout: 0, satoshis: 10 };
        let set = UtxoSet::from_provider_snapshot(vec![dup.clone(), dup]).unwrap();
        assert_eq!(set.count(), 2);
        assert_eq!(set.total_available(), Amount::from_sat(20));
    }

    #[test]
    fn rejects_malformed_txid() {
        let bad = ProviderOutput { txid: "a".into(), vout: 0, satoshis: 100_000 };
        assert!(matches!(
            UtxoSet::from_provider_snapshot(vec![bad]),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_overflowing_total() {
        let outputs = vec![
            ProviderOutput { txid: "01".repeat(32), vout: 0, satoshis: u64::MAX },
            ProviderOutput { txid: "02".repeat(32), vout: 0, satoshis: 1 },
        ];
        assert!(UtxoSet::from_provider_snapshot(outputs).is_err());
    }

    #[test]
    fn deserializes_insight_utxo() {
        let json = r#"[{"address":"mxyz","txid":"0101010101010101010101010101010101010101010101010101010101010101","vout":1,"scriptPubKey":"76a9","amount":0.001,"satoshis":100000,"height":10,"confirmations":3}]"#;
        let outputs: Vec<ProviderOutput> = serde_json::from_str(json).unwrap();
        let set = UtxoSet::from_provider_snapshot(outputs).unwrap();
        assert_eq!(set.total_available(), Amount::from_sat(100_000));
        assert_eq!(set.iter().next().unwrap().out_point.vout, 1);
    }
}
