//! 1つの鍵ペア/アドレスに対する対話ループ。
//!
//! アルゴリズムは持たず、プロバイダ・オペレーター・各コンポーネントを順番に呼ぶだけ。
//! アクションは1つずつ直列に実行し、失敗してもループは継続する。

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use bitcoin::{
    secp256k1::{All, Secp256k1},
    Address,
};

use crate::{
    error::AppError,
    fee::FeeQuantum,
    operator::Operator,
    provider::{AddressBalance, DataProvider},
    qr,
    transaction::{self, BuiltTransaction, PlanWarning, TransactionRequest},
    types::WalletKey,
    units::{parse_amount, Conversion, Denomination, ExchangeRate},
    utxo::UtxoSet,
};

/// セッション中に差し替わる値。取得のたびに丸ごと置き換える。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionContext {
    pub rate: ExchangeRate,
    pub fee: FeeQuantum,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub amount_unit: Denomination,
    pub timeout: Duration,
    pub manual_broadcast_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Qr,
    Balance,
    Send,
    SetFee,
    Quit,
}

impl Action {
    pub const ALL: [Action; 5] = [Action::Qr, Action::Balance, Action::Send, Action::SetFee, Action::Quit];

    pub fn name(&self) -> &'static str {
        match self {
            Action::Qr => "qr",
            Action::Balance => "balance",
            Action::Send => "send",
            Action::SetFee => "set",
            Action::Quit => "quit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Action::Qr => "受取アドレスのQRコードを表示",
            Action::Balance => "ウォレット残高を表示",
            Action::Send => "ビットコインを送金",
            Action::SetFee => "手数料 (satoshi) を上書き",
            Action::Quit => "このウォレットの操作を終了",
        }
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Action::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AppError::InvalidInput(format!("不明なアクションです: {}", s)))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct WalletSession<P, O> {
    provider: P,
    operator: O,
    key: WalletKey,
    context: SessionContext,
    options: SessionOptions,
    secp: Secp256k1<All>,
}

impl<P: DataProvider, O: Operator> WalletSession<P, O> {
    /// 為替レートと手数料見積もりを取得してセッションを開始する。
    pub async fn start(
        provider: P,
        operator: O,
        key: WalletKey,
        options: SessionOptions,
    ) -> Result<Self, AppError> {
        let rate = with_timeout(options.timeout, provider.fetch_exchange_rate()).await?;
        println!("現在の USD レート: {}", rate);

        let raw_fee_rate = with_timeout(options.timeout, provider.fetch_fee_rate_per_kb()).await?;
        let fee = FeeQuantum::derive(raw_fee_rate)?;
        println!(
            "現在の推定手数料: 1入力/出力あたり {} ({:.2} USD)\n",
            fee,
            Conversion::from_sats(fee.amount(), rate).usd
        );
        log::info!("セッション開始: wallet={}, address={}, rate={}, fee={}", key.name, key.address, rate, fee);

        Ok(WalletSession {
            provider,
            operator,
            key,
            context: SessionContext { rate, fee },
            options,
            secp: Secp256k1::new(),
        })
    }

    pub fn context(&self) -> SessionContext {
        self.context
    }

    pub fn key(&self) -> &WalletKey {
        &self.key
    }

    /// `quit`、入力終了、または `shutdown` の完了までアクションを処理する。
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        println!("ウォレット {} を操作します -- アドレス {}\n", self.key.name, self.key.address);
        tokio::pin!(shutdown);

        loop {
            let flow = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::info!("終了シグナルを受信しました。");
                    Flow::Quit
                }
                result = self.next_action() => match result {
                    Ok(flow) => flow,
                    Err(e) if e.is_recoverable() => {
                        log::error!("アクションが失敗しました: {}", e);
                        println!("\nエラー: {}\n", e);
                        Flow::Continue
                    }
                    Err(e) => return Err(e),
                }
            };

            if flow == Flow::Quit {
                println!("\nさようなら! :-)\n");
                return Ok(());
            }
        }
    }

    async fn next_action(&mut self) -> Result<Flow, AppError> {
        println!("利用可能なアクション:\n");
        for action in Action::ALL {
            println!("{} -> {}", action.name(), action.description());
        }
        println!();

        let Some(answer) = self.operator.prompt("どのアクションを実行しますか?").await? else {
            return Ok(Flow::Quit);
        };
        match answer.parse::<Action>() {
            Ok(action) => self.dispatch(action).await,
            Err(e) => {
                log::warn!("{}", e);
                Ok(Flow::Continue)
            }
        }
    }

    async fn dispatch(&mut self, action: Action) -> Result<Flow, AppError> {
        log::debug!("アクション実行: {}", action);
        match action {
            Action::Qr => {
                println!("QRコードを生成しています...\n");
                println!("{}", self.receive_qr()?);
                println!("{}\n", qr::payment_uri(&self.key.address));
            }
            Action::Balance => {
                println!("ウォレット残高を取得しています....\n");
                self.show_balance().await?;
            }
            Action::SetFee => {
                println!("手数料を設定します....\n");
                if self.override_fee().await?.is_none() {
                    return Ok(Flow::Quit);
                }
            }
            Action::Send => {
                println!("送金の準備をしています...\n");
                if self.send().await?.is_none() {
                    return Ok(Flow::Quit);
                }
            }
            Action::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    pub fn receive_qr(&self) -> Result<String, AppError> {
        qr::render_receive_qr(&self.key.address)
    }

    pub async fn show_balance(&self) -> Result<AddressBalance, AppError> {
        let balance = with_timeout(self.options.timeout, self.provider.fetch_balance(&self.key.address)).await?;
        let confirmed = Conversion::from_sats(balance.confirmed, self.context.rate);
        let unconfirmed = Conversion::from_sats(balance.unconfirmed, self.context.rate);

        println!("このウォレットの現在の残高:\n");
        println!("承認済み: {} / {} microbits", confirmed, confirmed.microbits);
        println!("未承認: {} / {} microbits\n", unconfirmed, unconfirmed.microbits);
        Ok(balance)
    }

    /// 入力が閉じられた場合は `None`。失敗時は現在の手数料をそのまま残す。
    pub async fn override_fee(&mut self) -> Result<Option<FeeQuantum>, AppError> {
        let Some(answer) = self.operator.prompt("satoshi 金額を入力してください:").await? else {
            return Ok(None);
        };
        let fee = FeeQuantum::override_with(&answer)?;
        self.context.fee = fee;

        let usd = Conversion::from_sats(fee.amount(), self.context.rate).usd;
        println!("\n手数料を 1入力/出力あたり {} に設定しました ({:.2} USD)。\n", fee, usd);
        log::info!("手数料を上書きしました: {}", fee);
        Ok(Some(fee))
    }

    /// UTXO を取り直してトランザクションを構築・署名する。ブロードキャストはしない。
    pub async fn send(&mut self) -> Result<Option<BuiltTransaction>, AppError> {
        println!("UTXO を取得しています.... \n");
        let utxos = self.fetch_utxo_set().await?;
        let total = Conversion::from_sats(utxos.total_available(), self.context.rate);
        println!("このウォレットには {} 個の UTXO があり、合計 {} です。\n", utxos.count(), total);
        if utxos.is_empty() {
            log::warn!("アドレス {} に使用可能な UTXO がありません。", self.key.address);
        }

        let unit = self.options.amount_unit;
        let Some(answer) = self.operator.prompt(&format!("送金額を {} で入力してください:", unit)).await? else {
            return Ok(None);
        };
        let amount = parse_amount(&answer, unit, self.context.rate)?;
        println!("\n{} satoshi ({}) を送金する準備をしています。\n", amount.satoshis.to_sat(), amount);

        let Some(answer) = self.operator.prompt("送金先アドレスを入力してください:").await? else {
            return Ok(None);
        };
        let destination = parse_destination(&answer, &self.key)?;

        println!("\nトランザクションを構築しています... ");
        let request = TransactionRequest { destination, target: amount.satoshis };
        let built = transaction::build_transaction(utxos, self.context.fee, &request, &self.key, &self.secp)?;
        self.report(&built);

        let broadcast = match self.operator.confirm("このトランザクションをブロードキャストしますか (y/n)?:").await {
            Ok(answer) => answer.unwrap_or(false),
            Err(AppError::InvalidInput(_)) => false,
            Err(e) => return Err(e),
        };
        if broadcast {
            println!("ブロードキャストにはまだ対応していません。");
        }
        println!("{} から手動でブロードキャストできます。\n", self.options.manual_broadcast_url);

        Ok(Some(built))
    }

    async fn fetch_utxo_set(&self) -> Result<UtxoSet, AppError> {
        let outputs = with_timeout(self.options.timeout, self.provider.fetch_utxos(&self.key.address)).await?;
        UtxoSet::from_provider_snapshot(outputs)
    }

    fn report(&self, built: &BuiltTransaction) {
        println!("\nトランザクションの構築に成功しました。");
        for warning in &built.plan.warnings {
            match warning {
                PlanWarning::ZeroTarget => println!("警告: 送金額が 0 satoshi です。"),
                PlanWarning::DustChange(change) => {
                    println!("警告: おつり {} satoshi はダスト閾値未満です。", change.to_sat())
                }
            }
        }

        println!("\nトランザクション情報\n");
        match serde_json::to_string_pretty(&built.plan.summary()) {
            Ok(json) => println!("{}", json),
            Err(e) => log::warn!("要約のシリアライズに失敗しました: {}", e),
        }
        println!("\ntxid: {} ({} vB)", built.txid, built.transaction.vsize());
        println!("\nトランザクション hex: \n");
        println!("{}\n", built.hex);
    }
}

fn parse_destination(input: &str, key: &WalletKey) -> Result<Address, AppError> {
    let input = input.trim();
    Address::from_str(input)
        .and_then(|addr| addr.require_network(key.network))
        .map_err(|e| {
            AppError::InvalidInput(format!("送金先アドレス形式エラーまたはネットワーク不整合 ({}): {}", input, e))
        })
}

async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, call).await.map_err(|_| {
        AppError::ProviderUnavailable(format!("{:?} 以内に応答がありませんでした", limit))
    })?
}
