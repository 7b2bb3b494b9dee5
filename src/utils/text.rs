use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;
use std::path::Path;

use crate::error::Result;

/// Decode raw bytes as UTF-8, falling back to Windows-1252 for provider
/// files whose unit strings were saved in a legacy code page.
pub fn decode_bytes(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text.trim_start_matches('\u{feff}')),
        Err(_) => {
            let (decoded, _, _) = WINDOWS_1252.decode(bytes);
            decoded
        }
    }
}

pub fn read_text_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode_bytes(&bytes).into_owned())
}

/// Normalize unit spellings so `ug/m3`, `µg/m³` and `μg/m³` compare equal.
pub fn normalize_unit(unit: &str) -> String {
    let lowered = unit.trim().to_lowercase();
    match lowered.as_str() {
        "ug/m3" | "µg/m3" | "μg/m3" | "µg/m³" | "μg/m³" | "ug/m³" => "µg/m³".to_string(),
        "mg/m3" | "mg/m³" => "mg/m³".to_string(),
        "ppm" => "ppm".to_string(),
        "ppb" => "ppb".to_string(),
        _ => unit.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8() {
        assert_eq!(decode_bytes("pm25,µg/m³".as_bytes()), "pm25,µg/m³");
    }

    #[test]
    fn test_decode_strips_bom() {
        assert_eq!(decode_bytes(b"\xef\xbb\xbfparameter"), "parameter");
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        // 0xB5 is the micro sign and 0xB3 is superscript three in Windows-1252
        assert_eq!(decode_bytes(b"\xb5g/m\xb3"), "µg/m³");
    }

    #[test]
    fn test_normalize_unit() {
        assert_eq!(normalize_unit("ug/m3"), "µg/m³");
        assert_eq!(normalize_unit("μg/m³"), "µg/m³");
        assert_eq!(normalize_unit(" MG/M3 "), "mg/m³");
        assert_eq!(normalize_unit("°C"), "°C");
    }
}
