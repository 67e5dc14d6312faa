//! 挂号二维码生成

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use qrcode::render::svg;
use qrcode::QrCode;

use crate::error::{ClinicError, Result};

/// 缓存的二维码图片的 MIME 类型
pub const QR_MIME_TYPE: &str = "image/svg+xml";

/// 将URL渲染为SVG二维码
pub fn render_svg(data: &str) -> Result<String> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| ClinicError::Internal(format!("QR generation failed: {}", e)))?;

    Ok(code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .quiet_zone(true)
        .build())
}

/// 生成可缓存的文本形式二维码（base64 编码的 SVG）
pub fn encode_base64(data: &str) -> Result<String> {
    let svg = render_svg(data)?;
    Ok(STANDARD.encode(svg.as_bytes()))
}

/// 还原缓存的二维码图片字节
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| ClinicError::Internal(format!("Corrupt cached QR code: {}", e)))
}

/// 用于 `<img src>` 的 data URI
pub fn data_uri(encoded: &str) -> String {
    format!("data:{};base64,{}", QR_MIME_TYPE, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_deterministic() {
        let url = "https://clinic.example/register/abc";
        assert_eq!(encode_base64(url).unwrap(), encode_base64(url).unwrap());
        assert_ne!(
            encode_base64(url).unwrap(),
            encode_base64("https://clinic.example/register/abd").unwrap()
        );
    }

    #[test]
    fn cached_form_round_trips_to_svg() {
        let encoded = encode_base64("https://clinic.example/register/abc").unwrap();
        let bytes = decode_base64(&encoded).unwrap();
        let svg = String::from_utf8(bytes).unwrap();
        assert!(svg.contains("<svg"));
        assert!(data_uri(&encoded).starts_with("data:image/svg+xml;base64,"));
    }
}
