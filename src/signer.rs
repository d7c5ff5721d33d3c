use bitcoin::{
    ecdsa,
    hashes::Hash,
    script::{Builder, PushBytesBuf},
    secp256k1::{All, Message, Secp256k1},
    sighash::{EcdsaSighashType, SighashCache},
    Transaction, Witness,
};

use crate::{
    error::AppError,
    types::{ScriptType, WalletKey},
    utxo::Utxo,
};

/// 署名に必要な情報を一時的に保持するための構造体
struct SigningInfo {
    input_index: usize,
    sighash_message: Message,
}

/// 全入力をセッションの単一鍵で署名する (SIGHASH_ALL)。
/// `prevouts` は `transaction.input` と同じ順序であること。
pub fn sign_inputs(
    transaction: &mut Transaction,
    prevouts: &[Utxo],
    key: &WalletKey,
    secp: &Secp256k1<All>,
) -> Result<(), AppError> {
    if prevouts.len() != transaction.input.len() {
        return Err(AppError::SigningFailure {
            input_index: prevouts.len().min(transaction.input.len()),
            reason: format!(
                "入力数 {} と prevout 数 {} が一致しません",
                transaction.input.len(),
                prevouts.len()
            ),
        });
    }

    log::info!("トランザクション署名処理を開始します。");
    let sighash_type = EcdsaSighashType::All;
    let script_pubkey = key.address.script_pubkey();
    let mut signing_infos: Vec<SigningInfo> = Vec::with_capacity(prevouts.len());

    // 1. 署名ハッシュ計算フェーズ
    // sighash_cache がこのスコープ内で transaction を借用する
    {
        let mut sighash_cache = SighashCache::new(&*transaction);

        for (input_index, prevout) in prevouts.iter().enumerate() {
            log::debug!(
                "入力 {} (txid={}, vout={}) の署名ハッシュ計算を開始します。",
                input_index, prevout.out_point.txid, prevout.out_point.vout
            );
            let digest = match key.script_type {
                ScriptType::P2PKH => sighash_cache
                    .legacy_signature_hash(input_index, &script_pubkey, sighash_type.to_u32())
                    .map_err(|e| AppError::SigningFailure { input_index, reason: e.to_string() })?
                    .to_byte_array(),
                ScriptType::P2WPKH => sighash_cache
                    .p2wpkh_signature_hash(input_index, &script_pubkey, prevout.value, sighash_type)
                    .map_err(|e| AppError::SigningFailure { input_index, reason: e.to_string() })?
                    .to_byte_array(),
            };
            signing_infos.push(SigningInfo {
                input_index,
                sighash_message: Message::from_digest(digest),
            });
        }
    }

    // 2. 署名生成と適用フェーズ
    for info in signing_infos {
        let signature = ecdsa::Signature {
            signature: secp.sign_ecdsa(&info.sighash_message, &key.private_key.inner),
            sighash_type,
        };

        match key.script_type {
            ScriptType::P2PKH => {
                let push = PushBytesBuf::try_from(signature.to_vec()).map_err(|e| {
                    AppError::SigningFailure { input_index: info.input_index, reason: e.to_string() }
                })?;
                transaction.input[info.input_index].script_sig = Builder::new()
                    .push_slice(push)
                    .push_key(&key.public_key)
                    .into_script();
            }
            ScriptType::P2WPKH => {
                let mut witness = Witness::new();
                witness.push(signature.to_vec());
                witness.push(key.public_key.to_bytes());
                transaction.input[info.input_index].witness = witness;
            }
        }
        log::debug!("入力 {} ({:?}) の署名適用完了。", info.input_index, key.script_type);
    }
    log::info!("全ての入力の署名が完了しました。");

    Ok(())
}
