use std::fs;
use std::path::Path;
use serde::Deserialize;

use crate::{error::AppError, types::ScriptType};

/// 鍵ファイルの1エントリ。`[{"name": ..., "privKey": <WIF>}]`
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntry {
    pub name: String,
    pub priv_key: String,
    #[serde(default)]
    pub address_type: Option<String>,
}

impl KeyEntry {
    /// エントリ固有の指定があればそれを、なければ CLI の既定値を使う
    pub fn script_type(&self, default: ScriptType) -> Result<ScriptType, AppError> {
        match &self.address_type {
            Some(s) => s.parse(),
            None => Ok(default),
        }
    }
}

pub fn load_key_entries(path: &Path) -> Result<Vec<KeyEntry>, AppError> {
    let content = fs::read_to_string(path).map_err(|e| {
        log::error!("鍵ファイルの読み込みに失敗しました: {:?}", path);
        AppError::Io(e)
    })?;
    let entries: Vec<KeyEntry> = serde_json::from_str(&content).map_err(|e| {
        log::error!("鍵ファイルのパースに失敗しました。");
        AppError::JsonParse {
            file_path: path.to_path_buf(),
            source: e,
        }
    })?;
    if entries.is_empty() {
        return Err(AppError::WalletSelection(format!("鍵ファイル {:?} にウォレットがありません", path)));
    }
    log::debug!("鍵ファイルから {} 件のウォレットを読み込みました。", entries.len());
    Ok(entries)
}

/// オペレーターが入力した番号でウォレットを選ぶ
pub fn select_entry<'a>(entries: &'a [KeyEntry], choice: &str) -> Result<&'a KeyEntry, AppError> {
    let index = choice
        .trim()
        .parse::<usize>()
        .map_err(|_| AppError::WalletSelection(format!("無効なウォレット番号です: {}", choice.trim())))?;
    let entry = entries
        .get(index)
        .ok_or_else(|| AppError::WalletSelection(format!("ウォレット番号 {} は存在しません", index)))?;
    if entry.priv_key.trim().is_empty() {
        return Err(AppError::WalletSelection(format!("ウォレット {} に秘密鍵がありません", entry.name)));
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn entries() -> Vec<KeyEntry> {
        serde_json::from_str(
            r#"[{"name":"savings","privKey":"cQ..."},{"name":"spending","privKey":"","addressType":"p2wpkh"}]"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_key_file_format() {
        let entries = entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "savings");
        assert_eq!(entries[0].script_type(ScriptType::P2PKH).unwrap(), ScriptType::P2PKH);
        assert_eq!(entries[1].script_type(ScriptType::P2PKH).unwrap(), ScriptType::P2WPKH);
    }

    #[test]
    fn selects_by_index() {
        let entries = entries();
        assert_eq!(select_entry(&entries, " 0 ").unwrap().name, "savings");
        assert!(matches!(select_entry(&entries, "7"), Err(AppError::WalletSelection(_))));
        assert!(matches!(select_entry(&entries, "x"), Err(AppError::WalletSelection(_))));
        // 秘密鍵が空のエントリは選べない
        assert!(matches!(select_entry(&entries, "1"), Err(AppError::WalletSelection(_))));
    }

    #[test]
    fn load_reports_json_errors_with_path() {
        let path = std::env::temp_dir().join(format!("btc-wallet-driver-keys-{}.json", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"{not json").unwrap();
        drop(file);

        let err = load_key_entries(&path).unwrap_err();
        fs::remove_file(&path).unwrap();
        match err {
            AppError::JsonParse { file_path, .. } => assert_eq!(file_path, path),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_key_entries(Path::new("/nonexistent/keys.json")).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }
}
