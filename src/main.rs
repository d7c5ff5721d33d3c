use bitcoin::secp256k1::Secp256k1;
use bitcoin::secp256k1::All as AllContext;
use clap::Parser;
use tokio::signal;

mod cli;
mod config;
mod error;
mod fee;
mod operator;
mod provider;
mod qr;
mod session;
mod signer;
mod transaction;
mod types;
mod units;
mod utxo;

use cli::{manual_broadcast_url, parse_network, CliArgs};
use config::KeyEntry;
use error::AppError;
use operator::{Operator, StdinOperator};
use provider::InsightProvider;
use session::{SessionOptions, WalletSession};
use types::{ScriptType, WalletKey};
use units::Denomination;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("アプリケーションを開始します。引数: {:?}", args);

    let network = parse_network(&args.network)?;
    log::info!("指定されたネットワーク: {:?}", network);
    let default_script_type: ScriptType = args.address_type.parse()?;
    let amount_unit: Denomination = args.amount_unit.parse()?;
    let timeout = args.timeout()?;

    let entries = config::load_key_entries(&args.keys_file)?;
    let mut operator = StdinOperator::spawn();

    let Some(entry) = choose_wallet(&entries, args.wallet, &mut operator).await? else {
        log::info!("ウォレットが選択されないまま入力が終了しました。");
        return Ok(());
    };

    let secp: Secp256k1<AllContext> = Secp256k1::new();
    let key = WalletKey::from_wif(
        &entry.name,
        &entry.priv_key,
        entry.script_type(default_script_type)?,
        network,
        &secp,
    )?;

    let insight_url = args.insight_url(network);
    let provider = InsightProvider::new(&insight_url, &args.rates_url, timeout)?;
    let options = SessionOptions {
        amount_unit,
        timeout,
        manual_broadcast_url: manual_broadcast_url(&insight_url),
    };

    let mut session = WalletSession::start(provider, operator, key, options).await?;
    log::info!(
        "ウォレット {} ({}) のセッションを開始しました。手数料: {}",
        session.key().name,
        session.key().address,
        session.context().fee
    );

    session.run(shutdown_signal()).await?;

    log::info!("処理が正常に完了しました。");
    Ok(())
}

async fn choose_wallet<'a>(
    entries: &'a [KeyEntry],
    preselected: Option<usize>,
    operator: &mut StdinOperator,
) -> Result<Option<&'a KeyEntry>, AppError> {
    if let Some(index) = preselected {
        return config::select_entry(entries, &index.to_string()).map(Some);
    }

    println!("利用可能なウォレット:\n");
    for (i, entry) in entries.iter().enumerate() {
        println!("[{}] -- {}", i, entry.name);
    }
    println!();

    match operator.prompt("どのウォレットを操作しますか?").await? {
        Some(choice) => config::select_entry(entries, &choice).map(Some),
        None => Ok(None),
    }
}

/// Ctrl-C または SIGTERM で完了する
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Ctrl-C ハンドラを登録できませんでした: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("SIGTERM ハンドラを登録できませんでした: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
