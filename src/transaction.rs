use bitcoin::{
    absolute::LockTime, consensus::encode, secp256k1::{All, Secp256k1}, transaction::Version,
    Address, Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use serde::Serialize;

use crate::{
    error::AppError,
    fee::FeeQuantum,
    signer,
    types::WalletKey,
    utxo::{Utxo, UtxoSet},
};

// Bitcoin Coreのデフォルトダスト閾値 (P2PKH/P2WPKH出力に対して)
const DUST_THRESHOLD_SATS: u64 = 546;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub destination: Address,
    pub target: Amount,
}

/// 構築自体は続行するが、オペレーターに知らせるべき状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanWarning {
    /// 送金額が 0
    ZeroTarget,
    /// おつりがダスト閾値未満
    DustChange(Amount),
}

/// 入力選択と手数料・おつりの計算結果。
///
/// 常に `入力合計 == target + total_fee + change` が成り立つ。
/// 成り立たない場合は構築されず [`AppError::InsufficientFunds`] になる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPlan {
    pub inputs: Vec<Utxo>,
    pub total_fee: Amount,
    pub change: Amount,
    pub change_address: Address,
    pub destination: Address,
    pub target: Amount,
    pub warnings: Vec<PlanWarning>,
}

/// 表示用の要約 `{target, total_fee, leftovers}`
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub target_sats: u64,
    pub total_fee_sats: u64,
    pub leftovers_sats: u64,
}

#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub plan: TransactionPlan,
    pub transaction: Transaction,
    pub txid: Txid,
    pub hex: String,
}

impl TransactionPlan {
    pub fn input_value(&self) -> Amount {
        self.inputs.iter().map(|u| u.value).sum()
    }

    pub fn destination_output(&self) -> TxOut {
        TxOut {
            value: self.target,
            script_pubkey: self.destination.script_pubkey(),
        }
    }

    pub fn change_output(&self) -> Option<TxOut> {
        (self.change > Amount::ZERO).then(|| TxOut {
            value: self.change,
            script_pubkey: self.change_address.script_pubkey(),
        })
    }

    /// 送金先が先頭、おつりがあればその後ろ
    pub fn outputs(&self) -> Vec<TxOut> {
        let mut outputs = vec![self.destination_output()];
        outputs.extend(self.change_output());
        outputs
    }

    pub fn summary(&self) -> TransactionSummary {
        TransactionSummary {
            target_sats: self.target.to_sat(),
            total_fee_sats: self.total_fee.to_sat(),
            leftovers_sats: self.change.to_sat(),
        }
    }

    /// 署名前のトランザクション (script_sig と witness は空)
    pub fn unsigned_transaction(&self) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: self
                .inputs
                .iter()
                .map(|u| TxIn {
                    previous_output: u.out_point,
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output: self.outputs(),
        }
    }
}

/// スナップショット内の UTXO をすべて消費する。手数料は入力1つにつき `fee` を加算。
pub fn plan_transaction(
    utxos: UtxoSet,
    fee: FeeQuantum,
    request: &TransactionRequest,
    change_address: &Address,
) -> Result<TransactionPlan, AppError> {
    let available = utxos.total_available();
    let mut inputs: Vec<Utxo> = Vec::with_capacity(utxos.count());
    let mut total_fee = Amount::ZERO;

    for utxo in utxos {
        total_fee = total_fee.checked_add(fee.amount()).ok_or_else(|| insufficient(available, None, total_fee))?;
        inputs.push(utxo);
    }
    log::debug!("入力数: {}, 1入力あたりの手数料: {}, 手数料合計: {} sats", inputs.len(), fee, total_fee.to_sat());

    let required = request.target.checked_add(total_fee);
    let change = required
        .and_then(|required| available.checked_sub(required))
        .ok_or_else(|| insufficient(available, required, total_fee))?;

    let mut warnings = Vec::new();
    if request.target == Amount::ZERO {
        log::warn!("送金額が 0 sats です。");
        warnings.push(PlanWarning::ZeroTarget);
    }
    if change > Amount::ZERO && change.to_sat() < DUST_THRESHOLD_SATS {
        log::warn!("おつり {} sats はダスト閾値 {} sats 未満です。", change.to_sat(), DUST_THRESHOLD_SATS);
        warnings.push(PlanWarning::DustChange(change));
    }

    let plan = TransactionPlan {
        inputs,
        total_fee,
        change,
        change_address: change_address.clone(),
        destination: request.destination.clone(),
        target: request.target,
        warnings,
    };
    debug_assert_eq!(plan.input_value(), plan.target + plan.total_fee + plan.change);
    Ok(plan)
}

/// 計画・組み立て・署名までを行い、16進シリアライズ済みのトランザクションを返す。
/// 資金不足の場合は何も署名しない。
pub fn build_transaction(
    utxos: UtxoSet,
    fee: FeeQuantum,
    request: &TransactionRequest,
    key: &WalletKey,
    secp: &Secp256k1<All>,
) -> Result<BuiltTransaction, AppError> {
    log::info!("トランザクション構築処理を開始します。");
    let plan = plan_transaction(utxos, fee, request, &key.address)?;

    let mut transaction = plan.unsigned_transaction();
    signer::sign_inputs(&mut transaction, &plan.inputs, key, secp)?;

    let hex = encode::serialize_hex(&transaction);
    let txid = transaction.compute_txid();
    log::info!("署名済みトランザクションの生成に成功しました。txid: {}", txid);

    Ok(BuiltTransaction { plan, transaction, txid, hex })
}

fn insufficient(available: Amount, required: Option<Amount>, fee: Amount) -> AppError {
    AppError::InsufficientFunds {
        available: available.to_sat(),
        required: required.map_or(u64::MAX, |r| r.to_sat()),
        fee: fee.to_sat(),
    }
}
