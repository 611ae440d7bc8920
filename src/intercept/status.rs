//! HTTP status text lookup

use reqwest::StatusCode;

/// Reason phrase for a status code, `"Unknown"` when there is none
pub fn status_text(code: i64) -> &'static str {
    u16::try_from(code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown")
}
