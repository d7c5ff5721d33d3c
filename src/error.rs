use std::path::PathBuf;
use bitcoin::key::FromWifError as BitcoinKeyError; // WIFデコードエラー用
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSONパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    JsonParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Bitcoin秘密鍵(WIF)処理エラー: {0}")]
    BitcoinKey(#[from] BitcoinKeyError),

    #[error("ネットワーク不整合: CLI指定 ({cli_network}) vs WIF ({inferred_network})")]
    NetworkMismatch {
        cli_network: String,
        inferred_network: String,
    },

    #[error("P2WPKHには圧縮公開鍵が必要です (ウォレット: {wallet})")]
    UncompressedKey { wallet: String },

    #[error("ウォレット選択エラー: {0}")]
    WalletSelection(String),

    #[error("入力検証エラー: {0}")]
    InvalidInput(String),

    #[error("資金不足: 利用可能な総額 {available} sats, 要求額 {required} sats (手数料 {fee} sats を含む)")]
    InsufficientFunds {
        available: u64,
        required: u64,
        fee: u64,
    },

    #[error("データプロバイダに接続できません: {0}")]
    ProviderUnavailable(String),

    #[error("署名エラー (入力インデックス {input_index}): {reason}")]
    SigningFailure {
        input_index: usize,
        reason: String,
    },
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            AppError::ProviderUnavailable(format!("タイムアウト: {}", value))
        } else {
            AppError::ProviderUnavailable(value.to_string())
        }
    }
}

impl AppError {
    /// セッションのアクション単位で回復可能なエラーかどうか。
    /// 起動時の設定・鍵エラーだけがプロセスを終了させる。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::InvalidInput(_)
                | AppError::InsufficientFunds { .. }
                | AppError::ProviderUnavailable(_)
                | AppError::SigningFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_errors_are_recoverable() {
        assert!(AppError::InvalidInput("x".into()).is_recoverable());
        assert!(AppError::ProviderUnavailable("down".into()).is_recoverable());
        assert!(
            AppError::InsufficientFunds { available: 1, required: 2, fee: 0 }.is_recoverable()
        );
        assert!(
            AppError::SigningFailure { input_index: 0, reason: "bad".into() }.is_recoverable()
        );
    }

    #[test]
    fn startup_errors_are_not_recoverable() {
        assert!(!AppError::WalletSelection("none".into()).is_recoverable());
        assert!(!AppError::UncompressedKey { wallet: "w".into() }.is_recoverable());
    }

    #[test]
    fn insufficient_funds_message_carries_amounts() {
        let msg = AppError::InsufficientFunds { available: 100000, required: 100005, fee: 10 }
            .to_string();
        assert!(msg.contains("100000"));
        assert!(msg.contains("100005"));
        assert!(msg.contains("10 sats"));
    }
}
