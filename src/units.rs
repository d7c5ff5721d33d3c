//! 表示用の単位換算。
//!
//! 金額の正本は常に整数の [`Amount`] (satoshi)。ここで作る BTC / microbits / USD の
//! 浮動小数値は表示専用で、手数料やおつりの計算には二度と戻さない。

use std::fmt;
use std::str::FromStr;
use bitcoin::Amount;

use crate::error::AppError;

const SATS_PER_BTC: f64 = 1e8;
const MICROBITS_PER_BTC: f64 = 1e6;

/// 1 BTC あたりの USD レート。正の有限値のみ。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeRate(f64);

impl ExchangeRate {
    pub fn new(usd_per_btc: f64) -> Result<Self, AppError> {
        if !usd_per_btc.is_finite() || usd_per_btc <= 0.0 {
            return Err(AppError::InvalidInput(format!(
                "為替レートは正の有限値である必要があります: {}",
                usd_per_btc
            )));
        }
        Ok(ExchangeRate(usd_per_btc))
    }

    pub fn usd_per_btc(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 入力金額の単位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denomination {
    Btc,
    Satoshi,
    Usd,
}

impl FromStr for Denomination {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "btc" => Ok(Denomination::Btc),
            "sat" | "sats" | "satoshi" | "satoshis" => Ok(Denomination::Satoshi),
            "usd" => Ok(Denomination::Usd),
            other => Err(AppError::InvalidInput(format!("無効な単位が指定されました: {}", other))),
        }
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Denomination::Btc => "BTC",
            Denomination::Satoshi => "satoshi",
            Denomination::Usd => "USD",
        };
        f.write_str(s)
    }
}

/// 1つの金額を全単位で表したもの。`satoshis` だけが計算に使える値。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub satoshis: Amount,
    pub btc: f64,
    pub microbits: f64,
    pub usd: f64,
}

impl Conversion {
    pub fn from_sats(amount: Amount, rate: ExchangeRate) -> Self {
        let sats = amount.to_sat() as f64;
        let btc = sats / SATS_PER_BTC;
        Conversion {
            satoshis: amount,
            btc,
            // satoshi 起点の microbits は sats / 1e6 で算出する
            microbits: sats / 1e6,
            usd: round2(btc * rate.usd_per_btc()),
        }
    }

    pub fn from_btc(amount: f64, rate: ExchangeRate) -> Result<Self, AppError> {
        check_amount(amount, "BTC")?;
        Ok(Conversion {
            satoshis: sats_from_btc(amount)?,
            btc: amount,
            microbits: amount * MICROBITS_PER_BTC,
            usd: round2(amount * rate.usd_per_btc()),
        })
    }

    pub fn from_usd(amount: f64, rate: ExchangeRate) -> Result<Self, AppError> {
        check_amount(amount, "USD")?;
        let btc = amount / rate.usd_per_btc();
        Ok(Conversion {
            satoshis: sats_from_btc(btc)?,
            btc,
            microbits: btc * MICROBITS_PER_BTC,
            usd: amount,
        })
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.8} BTC ({:.2} USD)", self.btc, self.usd)
    }
}

/// `amount` が無い場合は 0 として扱う。
pub fn convert(
    amount: Option<f64>,
    unit: Denomination,
    rate: ExchangeRate,
) -> Result<Conversion, AppError> {
    let amount = amount.unwrap_or(0.0);
    match unit {
        Denomination::Btc => Conversion::from_btc(amount, rate),
        Denomination::Usd => Conversion::from_usd(amount, rate),
        Denomination::Satoshi => {
            check_amount(amount, "satoshi")?;
            if amount.fract() != 0.0 {
                return Err(AppError::InvalidInput(format!(
                    "satoshi 金額は整数である必要があります: {}",
                    amount
                )));
            }
            Ok(Conversion::from_sats(sats_checked(amount)?, rate))
        }
    }
}

/// オペレーター入力の文字列を単位に応じて解釈する。
pub fn parse_amount(
    input: &str,
    unit: Denomination,
    rate: ExchangeRate,
) -> Result<Conversion, AppError> {
    let input = input.trim();
    match unit {
        Denomination::Satoshi => {
            let sats = input.parse::<u64>().map_err(|e| {
                AppError::InvalidInput(format!("satoshi 金額として解釈できません ({}): {}", input, e))
            })?;
            Ok(Conversion::from_sats(sats_checked(sats as f64)?, rate))
        }
        Denomination::Btc | Denomination::Usd => {
            let value = input.parse::<f64>().map_err(|e| {
                AppError::InvalidInput(format!("{} 金額として解釈できません ({}): {}", unit, input, e))
            })?;
            convert(Some(value), unit, rate)
        }
    }
}

/// 小数第2位で四捨五入 (0 から遠い方へ)
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn check_amount(amount: f64, unit: &str) -> Result<(), AppError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::InvalidInput(format!(
            "{} 金額は0以上の有限値である必要があります: {}",
            unit, amount
        )));
    }
    Ok(())
}

fn sats_from_btc(btc: f64) -> Result<Amount, AppError> {
    sats_checked((btc * SATS_PER_BTC).round())
}

fn sats_checked(sats: f64) -> Result<Amount, AppError> {
    if sats > Amount::MAX_MONEY.to_sat() as f64 {
        return Err(AppError::InvalidInput(format!(
            "金額が発行上限を超えています: {} sats",
            sats
        )));
    }
    Ok(Amount::from_sat(sats as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rate(r: f64) -> ExchangeRate {
        ExchangeRate::new(r).unwrap()
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(ExchangeRate::new(0.0).is_err());
        assert!(ExchangeRate::new(-3.0).is_err());
        assert!(ExchangeRate::new(f64::NAN).is_err());
        assert!(ExchangeRate::new(f64::INFINITY).is_err());
    }

    #[test]
    fn btc_source() {
        let c = Conversion::from_btc(0.5, rate(30000.0)).unwrap();
        assert_eq!(c.satoshis, Amount::from_sat(50_000_000));
        assert_eq!(c.microbits, 500_000.0);
        assert_eq!(c.usd, 15000.0);
    }

    #[test]
    fn satoshi_source() {
        let c = Conversion::from_sats(Amount::from_sat(150_000), rate(20000.0));
        assert_eq!(c.btc, 0.0015);
        assert_eq!(c.microbits, 0.15);
        assert_eq!(c.usd, 30.0);
    }

    #[test]
    fn usd_source_rounds_to_nearest_satoshi() {
        let c = Conversion::from_usd(10.0, rate(30000.0)).unwrap();
        // 10 / 30000 BTC = 33333.33.. sats
        assert_eq!(c.satoshis, Amount::from_sat(33_333));
        assert_eq!(c.usd, 10.0);
    }

    #[test]
    fn usd_is_rounded_to_cents() {
        let c = Conversion::from_sats(Amount::from_sat(12_345), rate(27123.45));
        assert_eq!(c.usd, 3.35);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
    }

    #[test]
    fn absent_amount_defaults_to_zero() {
        let c = convert(None, Denomination::Usd, rate(100.0)).unwrap();
        assert_eq!(c.satoshis, Amount::ZERO);
        assert_eq!(c.usd, 0.0);
    }

    #[test]
    fn rejects_negative_and_nan_amounts() {
        assert!(convert(Some(-1.0), Denomination::Btc, rate(1.0)).is_err());
        assert!(convert(Some(f64::NAN), Denomination::Usd, rate(1.0)).is_err());
        assert!(convert(Some(1.5), Denomination::Satoshi, rate(1.0)).is_err());
        assert!(convert(Some(22_000_000.0), Denomination::Btc, rate(1.0)).is_err());
    }

    #[test]
    fn parses_operator_text() {
        let r = rate(40000.0);
        assert_eq!(
            parse_amount(" 2500 ", Denomination::Satoshi, r).unwrap().satoshis,
            Amount::from_sat(2500)
        );
        assert_eq!(
            parse_amount("0.001", Denomination::Btc, r).unwrap().satoshis,
            Amount::from_sat(100_000)
        );
        assert_eq!(
            parse_amount("4", Denomination::Usd, r).unwrap().satoshis,
            Amount::from_sat(10_000)
        );
        assert!(matches!(
            parse_amount("ten", Denomination::Usd, r),
            Err(AppError::InvalidInput(_))
        ));
        assert!(parse_amount("-5", Denomination::Satoshi, r).is_err());
    }

    #[test]
    fn denomination_from_str() {
        assert_eq!("USD".parse::<Denomination>().unwrap(), Denomination::Usd);
        assert_eq!("sats".parse::<Denomination>().unwrap(), Denomination::Satoshi);
        assert!("eur".parse::<Denomination>().is_err());
    }

    #[test]
    fn display_shows_btc_and_usd() {
        let c = Conversion::from_sats(Amount::from_sat(100_000), rate(50000.0));
        assert_eq!(c.to_string(), "0.00100000 BTC (50.00 USD)");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn btc_satoshi_round_trip_within_one_sat(sats in 0u64..=2_000_000_000_000_000u64) {
            let r = rate(25000.0);
            let there = Conversion::from_sats(Amount::from_sat(sats), r);
            let back = Conversion::from_btc(there.btc, r).unwrap();
            let diff = back.satoshis.to_sat().abs_diff(sats);
            prop_assert!(diff <= 1, "{} -> {} -> {}", sats, there.btc, back.satoshis);
        }
    }
}
