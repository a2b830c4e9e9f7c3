//! Gzip for large extracted texts before they reach the document store.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::config::COMPRESS_THRESHOLD;

/// Extracted text as persisted: verbatim below the threshold, gzipped above.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "encoding", content = "data")]
pub enum StoredBody {
    Plain(String),
    #[serde(with = "base64_bytes")]
    Gzip(Vec<u8>),
}

impl StoredBody {
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Plain(s) => s.len(),
            Self::Gzip(b) => b.len(),
        }
    }
}

/// Compress when the text crosses the storage threshold (1MB).
pub fn compress_if_large(text: &str) -> std::io::Result<StoredBody> {
    if text.len() <= COMPRESS_THRESHOLD {
        return Ok(StoredBody::Plain(text.to_string()));
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(StoredBody::Gzip(encoder.finish()?))
}

pub fn decompress(body: &StoredBody) -> std::io::Result<String> {
    match body {
        StoredBody::Plain(s) => Ok(s.clone()),
        StoredBody::Gzip(bytes) => {
            let mut decoder = GzDecoder::new(&bytes[..]);
            let mut out = String::new();
            decoder.read_to_string(&mut out)?;
            Ok(out)
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_stays_plain() {
        let body = compress_if_large("short transcript").unwrap();
        assert_eq!(body, StoredBody::Plain("short transcript".to_string()));
    }

    #[test]
    fn large_text_round_trips_through_gzip() {
        let text = "client session ".repeat(100_000); // ~1.5MB
        let body = compress_if_large(&text).unwrap();
        assert!(matches!(body, StoredBody::Gzip(_)));
        assert!(body.byte_len() < text.len());
        assert_eq!(decompress(&body).unwrap(), text);
    }

    #[test]
    fn stored_body_serializes_with_encoding_tag() {
        let json = serde_json::to_value(StoredBody::Plain("x".into())).unwrap();
        assert_eq!(json["encoding"], "plain");
    }
}
