use std::io::{self, BufRead, Write};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AppError;

/// オペレーターからの入力。`None` は入力が閉じられたことを表す。
#[async_trait]
pub trait Operator: Send {
    async fn prompt(&mut self, message: &str) -> Result<Option<String>, AppError>;

    /// y/n の確認。解釈できない回答は `InvalidInput`。
    async fn confirm(&mut self, message: &str) -> Result<Option<bool>, AppError> {
        match self.prompt(message).await? {
            None => Ok(None),
            Some(answer) => parse_yes_no(&answer).map(Some),
        }
    }
}

pub fn parse_yes_no(answer: &str) -> Result<bool, AppError> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Ok(true),
        "n" | "no" => Ok(false),
        other => Err(AppError::InvalidInput(format!("y か n で答えてください: {}", other))),
    }
}

/// 標準入力を専用スレッドで1行ずつ読む。
/// 読み込み中のスレッドが終了を妨げないよう、tokio の blocking プールは使わない。
pub struct StdinOperator {
    lines: mpsc::UnboundedReceiver<String>,
}

impl StdinOperator {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("標準入力の読み込みに失敗しました: {}", e);
                        break;
                    }
                }
            }
            log::debug!("標準入力が閉じられました。");
        });
        StdinOperator { lines: rx }
    }
}

#[async_trait]
impl Operator for StdinOperator {
    async fn prompt(&mut self, message: &str) -> Result<Option<String>, AppError> {
        print!("{} ", message);
        io::stdout().flush()?;
        Ok(self.lines.recv().await.map(|line| line.trim().to_string()))
    }
}
