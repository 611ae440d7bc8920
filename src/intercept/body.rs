//! Body transport encoding
//!
//! The protocol takes bodies as base64. Encoding is an ordered chain of
//! fallible attempts: the UTF-8 byte path first, then a direct one-byte-per-
//! character path. If both fail the caller omits the body field.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

/// Which step of the chain produced the encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePath {
    Utf8,
    Latin1,
}

/// A body ready to be placed in a protocol command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub data: String,
    pub path: EncodePath,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("UTF-8 encoding did not round-trip")]
    Utf8RoundTrip,

    #[error("character {0:?} cannot be encoded as a single byte")]
    NotLatin1(char),
}

/// Encode text as base64 of its UTF-8 bytes
pub fn encode_utf8(text: &str) -> Result<String, EncodeError> {
    let encoded = STANDARD.encode(text.as_bytes());
    match STANDARD.decode(&encoded) {
        Ok(bytes) if bytes == text.as_bytes() => Ok(encoded),
        _ => Err(EncodeError::Utf8RoundTrip),
    }
}

/// Encode text as base64 with one byte per character
///
/// Only characters up to U+00FF can be represented.
pub fn encode_latin1(text: &str) -> Result<String, EncodeError> {
    let bytes = text
        .chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| EncodeError::NotLatin1(c)))
        .collect::<Result<Vec<u8>, _>>()?;
    Ok(STANDARD.encode(bytes))
}

/// Run the encoding chain; `None` means the body must be omitted
pub fn encode_body(text: &str) -> Option<EncodedBody> {
    match encode_utf8(text) {
        Ok(data) => {
            return Some(EncodedBody {
                data,
                path: EncodePath::Utf8,
            })
        }
        Err(e) => tracing::warn!(error = %e, "UTF-8 body encoding failed; trying direct encoding"),
    }

    match encode_latin1(text) {
        Ok(data) => Some(EncodedBody {
            data,
            path: EncodePath::Latin1,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Body could not be encoded; omitting it from the command");
            None
        }
    }
}

/// Decode base64 chunks of one body and read the joined bytes as UTF-8
///
/// Chunks are concatenated before decoding to text, so a character split
/// across a chunk boundary survives. Chunks that are not valid base64 are
/// skipped; invalid UTF-8 sequences become replacement characters.
pub fn decode_chunks_to_text<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut bytes = Vec::new();
    for chunk in chunks {
        match STANDARD.decode(chunk) {
            Ok(decoded) => bytes.extend_from_slice(&decoded),
            Err(e) => tracing::warn!(error = %e, "Skipping body chunk that is not base64"),
        }
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_uses_utf8_path() {
        let encoded = encode_body("{\"hello\":\"world\"}").unwrap();
        assert_eq!(encoded.path, EncodePath::Utf8);
        assert_eq!(encoded.data, "eyJoZWxsbyI6IndvcmxkIn0=");
    }

    #[test]
    fn test_utf8_round_trip() {
        let text = "naïve café — 日本語 🚀";
        let encoded = encode_body(text).unwrap();
        assert_eq!(encoded.path, EncodePath::Utf8);
        assert_eq!(decode_chunks_to_text([encoded.data.as_str()]).as_deref(), Some(text));
    }

    #[test]
    fn test_empty_body_encodes_to_empty() {
        let encoded = encode_body("").unwrap();
        assert_eq!(encoded.data, "");
    }

    #[test]
    fn test_latin1_path() {
        assert_eq!(encode_latin1("café").unwrap(), STANDARD.encode([b'c', b'a', b'f', 0xE9]));
        assert_eq!(encode_latin1("日本"), Err(EncodeError::NotLatin1('日')));
    }

    #[test]
    fn test_decode_skips_invalid_chunks() {
        assert_eq!(decode_chunks_to_text(["***", "aGk="]).as_deref(), Some("hi"));
    }

    #[test]
    fn test_decode_joins_split_character() {
        let chunks = [STANDARD.encode([0xE6, 0x97]), STANDARD.encode([0xA5])];
        assert_eq!(
            decode_chunks_to_text(chunks.iter().map(String::as_str)).as_deref(),
            Some("日")
        );
    }
}
