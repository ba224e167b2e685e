//! Source locator parsing
//!
//! A locator is an address optionally followed by one header directive,
//! separated by whitespace:
//!
//! ```text
//! http://cam.local/video.mjpeg
//! https://cam.local/stream Authorization s3cr3t
//! tcp://10.0.0.5:8000
//! ```
//!
//! An `Authorization` header value gets a `Bearer ` prefix. Addresses that
//! contain literal spaces cannot be expressed.

use crate::error::{Error, Result};

/// Parsed source locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    /// Address with scheme, exactly as given
    pub address: String,
    /// Optional header name and (possibly prefixed) value
    pub header: Option<(String, String)>,
}

impl Locator {
    /// Split a raw locator into address and optional header.
    ///
    /// One token means no header, three mean address, header name, header
    /// value. Anything else is [`Error::MalformedLocator`].
    pub fn parse(raw: &str) -> Result<Self> {
        let tokens: Vec<&str> = raw.split_whitespace().collect();

        match tokens.as_slice() {
            [address] => Ok(Self {
                address: address.to_string(),
                header: None,
            }),
            [address, name, value] => {
                let value = if name.eq_ignore_ascii_case("authorization") {
                    format!("Bearer {}", value)
                } else {
                    value.to_string()
                };
                Ok(Self {
                    address: address.to_string(),
                    header: Some((name.to_string(), value)),
                })
            }
            _ => Err(Error::MalformedLocator(format!(
                "expected 1 or 3 tokens, got {}",
                tokens.len()
            ))),
        }
    }

    /// Lowercased scheme, if the address has one
    pub fn scheme(&self) -> Option<String> {
        scheme_of(&self.address)
    }
}

/// Lowercased scheme of a raw locator
pub fn scheme_of(raw: &str) -> Option<String> {
    raw.trim_start()
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_only() {
        let locator = Locator::parse("http://cam.local/video.mjpeg").unwrap();
        assert_eq!(locator.address, "http://cam.local/video.mjpeg");
        assert!(locator.header.is_none());
    }

    #[test]
    fn test_header_directive() {
        let locator = Locator::parse("http://cam.local/a X-Api-Key abc").unwrap();
        assert_eq!(locator.address, "http://cam.local/a");
        assert_eq!(
            locator.header,
            Some(("X-Api-Key".to_string(), "abc".to_string()))
        );
    }

    #[test]
    fn test_authorization_gets_bearer_prefix() {
        let locator = Locator::parse("https://cam.local/a Authorization tok").unwrap();
        assert_eq!(
            locator.header,
            Some(("Authorization".to_string(), "Bearer tok".to_string()))
        );

        // Case-insensitive match, name casing kept
        let locator = Locator::parse("https://cam.local/a authorization tok").unwrap();
        assert_eq!(
            locator.header,
            Some(("authorization".to_string(), "Bearer tok".to_string()))
        );
    }

    #[test]
    fn test_wrong_token_count() {
        for raw in ["", "   ", "http://a X-Key", "http://a b c d"] {
            assert!(
                matches!(Locator::parse(raw), Err(Error::MalformedLocator(_))),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_scheme() {
        assert_eq!(scheme_of("HTTPX://cam"), Some("httpx".to_string()));
        assert_eq!(scheme_of("tcp://10.0.0.5:8000"), Some("tcp".to_string()));
        assert_eq!(scheme_of("cam1"), None);
    }
}
