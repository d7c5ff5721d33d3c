use std::fmt;
use bitcoin::Amount;

use crate::error::AppError;

/// 入力/出力ごとに固定で上乗せする優先手数料 (sats)
const PRIORITY_SURCHARGE_SATS: u64 = 5;

/// 1入力あたりに課す手数料。手数料はバイトサイズではなく入力数に比例する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuantum(Amount);

impl FeeQuantum {
    /// 外部の手数料見積もり (BTC/kB) から導出する。
    /// `round(rate * 1e8 / 1024) + 5`
    pub fn derive(raw_fee_rate_per_kb: f64) -> Result<Self, AppError> {
        if !raw_fee_rate_per_kb.is_finite() || raw_fee_rate_per_kb < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "手数料見積もりが無効です: {} BTC/kB",
                raw_fee_rate_per_kb
            )));
        }
        let per_byte = (raw_fee_rate_per_kb * 1e8 / 1024.0).round();
        if per_byte > Amount::MAX_MONEY.to_sat() as f64 {
            return Err(AppError::InvalidInput(format!(
                "手数料見積もりが大きすぎます: {} BTC/kB",
                raw_fee_rate_per_kb
            )));
        }
        let quantum = Amount::from_sat(per_byte as u64 + PRIORITY_SURCHARGE_SATS);
        log::debug!("手数料見積もり {} BTC/kB から 1入力あたり {} sats を導出", raw_fee_rate_per_kb, quantum.to_sat());
        Ok(FeeQuantum(quantum))
    }

    /// オペレーターが指定した satoshi 値をそのまま使う。
    pub fn override_with(input: &str) -> Result<Self, AppError> {
        let input = input.trim();
        let sats = input.parse::<u64>().map_err(|e| {
            AppError::InvalidInput(format!("手数料は0以上の整数 (sats) で指定してください ({}): {}", input, e))
        })?;
        Ok(FeeQuantum::from_sat(sats))
    }

    pub fn from_sat(sats: u64) -> Self {
        FeeQuantum(Amount::from_sat(sats))
    }

    pub fn amount(&self) -> Amount {
        self.0
    }
}

impl fmt::Display for FeeQuantum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sats", self.0.to_sat())
    }
}
