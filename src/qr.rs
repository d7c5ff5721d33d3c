use bitcoin::Address;
use qrcode::{render::unicode, QrCode};

use crate::error::AppError;

pub fn payment_uri(address: &Address) -> String {
    format!("bitcoin:{}", address)
}

/// 受取用 URI を端末表示用の QR コード文字列にする
pub fn render_receive_qr(address: &Address) -> Result<String, AppError> {
    let code = QrCode::new(payment_uri(address).as_bytes())
        .map_err(|e| AppError::InvalidInput(format!("QRコードを生成できません: {}", e)))?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}
