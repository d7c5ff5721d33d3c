//! 外部データプロバイダ (Insight 互換 REST API + BitPay レート API)。
//!
//! 呼び出しはすべて結果を丸ごと返す単発リクエストで、部分的な応答は扱わない。

use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use bitcoin::{Address, Amount};
use serde::Deserialize;

use crate::{error::AppError, units::ExchangeRate, utxo::ProviderOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressBalance {
    pub confirmed: Amount,
    pub unconfirmed: Amount,
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch_exchange_rate(&self) -> Result<ExchangeRate, AppError>;

    /// 1ブロック以内の承認に必要な手数料率 (BTC/kB)
    async fn fetch_fee_rate_per_kb(&self) -> Result<f64, AppError>;

    async fn fetch_utxos(&self, address: &Address) -> Result<Vec<ProviderOutput>, AppError>;

    async fn fetch_balance(&self, address: &Address) -> Result<AddressBalance, AppError>;
}

#[derive(Deserialize, Debug)]
struct RatesResponse {
    data: Vec<RateEntry>,
}

#[derive(Deserialize, Debug)]
struct RateEntry {
    code: String,
    rate: f64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AddressResponse {
    balance_sat: u64,
    unconfirmed_balance_sat: i64,
}

pub struct InsightProvider {
    client: reqwest::Client,
    insight_url: String,
    rates_url: String,
}

impl InsightProvider {
    pub fn new(insight_url: &str, rates_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(InsightProvider {
            client,
            insight_url: insight_url.trim_end_matches('/').to_string(),
            rates_url: rates_url.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ProviderUnavailable(format!("{} が {} を返しました: {}", url, status, body)));
        }

        response.json::<T>().await.map_err(|e| {
            AppError::ProviderUnavailable(format!("{} の応答を解釈できません: {}", url, e))
        })
    }
}

#[async_trait]
impl DataProvider for InsightProvider {
    async fn fetch_exchange_rate(&self) -> Result<ExchangeRate, AppError> {
        let rates: RatesResponse = self.get_json(&self.rates_url).await?;
        usd_rate(rates)
    }

    async fn fetch_fee_rate_per_kb(&self) -> Result<f64, AppError> {
        let url = format!("{}/utils/estimatefee?nbBlocks=1", self.insight_url);
        let estimates: HashMap<String, f64> = self.get_json(&url).await?;
        estimates
            .get("1")
            .copied()
            .ok_or_else(|| AppError::ProviderUnavailable("手数料見積もりに nbBlocks=1 の値がありません".to_string()))
    }

    async fn fetch_utxos(&self, address: &Address) -> Result<Vec<ProviderOutput>, AppError> {
        let url = format!("{}/addr/{}/utxo", self.insight_url, address);
        self.get_json(&url).await
    }

    async fn fetch_balance(&self, address: &Address) -> Result<AddressBalance, AppError> {
        let url = format!("{}/addr/{}", self.insight_url, address);
        let details: AddressResponse = self.get_json(&url).await?;
        Ok(balance_from(details))
    }
}

fn usd_rate(rates: RatesResponse) -> Result<ExchangeRate, AppError> {
    let entry = rates
        .data
        .into_iter()
        .find(|entry| entry.code == "USD")
        .ok_or_else(|| AppError::ProviderUnavailable("USD レートが見つかりません".to_string()))?;
    ExchangeRate::new(entry.rate)
        .map_err(|e| AppError::ProviderUnavailable(format!("USD レートが不正です: {}", e)))
}

// 未承認残高は出金中だと負になるので 0 で切る
fn balance_from(details: AddressResponse) -> AddressBalance {
    AddressBalance {
        confirmed: Amount::from_sat(details.balance_sat),
        unconfirmed: Amount::from_sat(details.unconfirmed_balance_sat.max(0) as u64),
    }
}
