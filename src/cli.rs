use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use bitcoin::Network as BitcoinNetwork;
use crate::error::AppError;

const DEFAULT_RATES_URL: &str = "https://bitpay.com/rates";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// ウォレット一覧 (`[{"name", "privKey"}]`) を記述したJSONファイルへのパス
    #[clap(short, long, value_parser, default_value = "keys.json")]
    pub keys_file: PathBuf,

    /// 使用するウォレットの番号。省略時は起動後に尋ねる
    #[clap(short, long, value_parser)]
    pub wallet: Option<usize>,

    /// 使用するネットワーク ("bitcoin", "testnet", "regtest")
    #[clap(short, long, value_parser, default_value = "testnet")]
    pub network: String,

    /// アドレスタイプ ("p2pkh", "p2wpkh")。鍵ファイル側の指定が優先される
    #[clap(short, long, value_parser, default_value = "p2pkh")]
    pub address_type: String,

    /// 送金額を入力する単位 ("usd", "btc", "sat")
    #[clap(short = 'u', long, value_parser, default_value = "usd")]
    pub amount_unit: String,

    /// Insight API のベースURL。省略時はネットワークごとの既定値
    #[clap(long, value_parser)]
    pub insight_url: Option<String>,

    /// USD レート取得先
    #[clap(long, value_parser, default_value = DEFAULT_RATES_URL)]
    pub rates_url: String,

    /// 外部APIの応答待ち上限 (秒)
    #[clap(short, long, value_parser, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl CliArgs {
    pub fn timeout(&self) -> Result<Duration, AppError> {
        if self.timeout_secs == 0 {
            return Err(AppError::InvalidInput("タイムアウトは1秒以上を指定してください".to_string()));
        }
        Ok(Duration::from_secs(self.timeout_secs))
    }

    pub fn insight_url(&self, network: BitcoinNetwork) -> String {
        self.insight_url
            .clone()
            .unwrap_or_else(|| default_insight_url(network).to_string())
    }
}

pub fn parse_network(network_str: &str) -> Result<BitcoinNetwork, AppError> {
    match network_str.to_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(BitcoinNetwork::Bitcoin),
        "testnet" => Ok(BitcoinNetwork::Testnet),
        "regtest" => Ok(BitcoinNetwork::Regtest),
        s => Err(AppError::InvalidInput(format!("無効なネットワークが指定されました: {}", s))),
    }
}

pub fn default_insight_url(network: BitcoinNetwork) -> &'static str {
    match network {
        BitcoinNetwork::Bitcoin => "https://insight.bitpay.com/api",
        BitcoinNetwork::Regtest => "http://localhost:3001/api",
        _ => "https://test-insight.bitpay.com/api",
    }
}

/// 手動ブロードキャスト用ページ (`{insight}/api` -> `{insight}/tx/send`)
pub fn manual_broadcast_url(insight_url: &str) -> String {
    let base = insight_url.trim_end_matches('/');
    let base = base.strip_suffix("/api").unwrap_or(base);
    format!("{}/tx/send", base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_networks() {
        assert_eq!(parse_network("Mainnet").unwrap(), BitcoinNetwork::Bitcoin);
        assert_eq!(parse_network("testnet").unwrap(), BitcoinNetwork::Testnet);
        assert_eq!(parse_network("regtest").unwrap(), BitcoinNetwork::Regtest);
        assert!(parse_network("litecoin").is_err());
    }

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["btc-wallet-driver"]);
        assert_eq!(args.keys_file, PathBuf::from("keys.json"));
        assert_eq!(args.wallet, None);
        assert_eq!(args.network, "testnet");
        assert_eq!(args.amount_unit, "usd");
        assert_eq!(args.timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(args.insight_url(BitcoinNetwork::Testnet), "https://test-insight.bitpay.com/api");
    }

    #[test]
    fn explicit_insight_url_wins() {
        let args = CliArgs::parse_from(["btc-wallet-driver", "--insight-url", "http://node:3001/api", "-w", "2"]);
        assert_eq!(args.insight_url(BitcoinNetwork::Bitcoin), "http://node:3001/api");
        assert_eq!(args.wallet, Some(2));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let args = CliArgs::parse_from(["btc-wallet-driver", "--timeout-secs", "0"]);
        assert!(args.timeout().is_err());
    }

    #[test]
    fn broadcast_url_from_insight_base() {
        assert_eq!(manual_broadcast_url("https://insight.bitpay.com/api"), "https://insight.bitpay.com/tx/send");
        assert_eq!(manual_broadcast_url("http://node:3001/api/"), "http://node:3001/tx/send");
    }
}
