//! Inline `data:<mime>;base64,<payload>` URLs

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use error_stack::Report;
use regex::Regex;

use crate::constants::{BASE64_MARKER, DATA_URL_PREFIX, DEFAULT_MIME_TYPE};
use crate::error::{Error, Result};

static DATA_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)^data:(?<mime>[^;,]*);base64,(?<payload>.+)$").ok());

/// A decoded data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Declared mime type, [`DEFAULT_MIME_TYPE`] when empty
    pub mime_type: String,
    /// Decoded payload
    pub bytes:     Vec<u8>,
}

impl DataUrl {
    /// Parse and decode `url`
    ///
    /// Whitespace inside the payload (MIME line breaks) is ignored.
    pub fn parse(url: &str) -> Result<Self> {
        let captures = DATA_URL
            .as_ref()
            .and_then(|regex| regex.captures(url))
            .ok_or_else(|| Report::new(Error::unexpected("data URL", "missing ';base64,' payload")))?;
        let mime_type = captures
            .name("mime")
            .map(|mime| mime.as_str())
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let payload: String = captures
            .name("payload")
            .map(|payload| payload.as_str())
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| Report::new(Error::unexpected("data URL payload", e)))?;
        Ok(Self { mime_type, bytes })
    }

    /// Encode as a data URL
    pub fn encode(&self) -> String { encode(&self.mime_type, &self.bytes) }
}

/// Whether `url` carries an inline base64 payload
pub fn is_data_url(url: &str) -> bool {
    DATA_URL.as_ref().is_some_and(|regex| regex.is_match(url))
}

/// Encode `bytes` as a data URL of type `mime_type`
pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    let mime_type = if mime_type.is_empty() { DEFAULT_MIME_TYPE } else { mime_type };
    format!(
        "{DATA_URL_PREFIX}{mime_type}{BASE64_MARKER}{}",
        STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_url() {
        let parsed = DataUrl::parse("data:application/json;base64,eyJ9");
        assert_eq!(
            parsed.ok(),
            Some(DataUrl {
                mime_type: "application/json".to_string(),
                bytes:     b"{\"}".to_vec(),
            })
        );
    }

    #[test]
    fn test_mime_line_breaks_ignored() {
        let parsed = DataUrl::parse("data:text/plain;base64,aGVs\r\nbG8=");
        assert_eq!(parsed.map(|url| url.bytes).ok(), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_empty_mime_defaults() {
        let parsed = DataUrl::parse("data:;base64,AA==");
        assert_eq!(parsed.map(|url| url.mime_type).ok().as_deref(), Some(DEFAULT_MIME_TYPE));
        assert_eq!(encode("", &[0]), "data:application/octet-stream;base64,AA==");
    }

    #[test]
    fn test_non_data_urls() {
        assert!(!is_data_url("https://example.com/a.pdf"));
        assert!(!is_data_url("data:text/plain,hello"));
        assert!(is_data_url("data:image/png;base64,iVBORw0KGgo="));
        assert!(matches!(
            DataUrl::parse("data:text/plain;base64,@@@").map_err(|e| e.current_context().clone()),
            Err(Error::MalformedData(_))
        ));
    }
}
