// Copyright 2025 Cowboy AI, LLC.

//! Host extraction and normalization
//!
//! The normalized host is the deduplication unit for the whole pipeline:
//! lowercased, with a single leading `www.` stripped.

use crate::errors::{DiscoveryError, DiscoveryResult};
use url::Url;

/// Extract the normalized host from a URL
///
/// Fails with [`DiscoveryError::InvalidUrl`] when the input has no parseable
/// host. Bare domains without a scheme are accepted (`example.org/page`).
pub fn extract_domain(input: &str) -> DiscoveryResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DiscoveryError::InvalidUrl("empty input".to_string()));
    }

    let parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        // Engines occasionally emit scheme-less URLs; retry as https.
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{trimmed}"))
                .map_err(|e| DiscoveryError::InvalidUrl(format!("{trimmed}: {e}")))?
        }
        Err(e) => return Err(DiscoveryError::InvalidUrl(format!("{trimmed}: {e}"))),
    };

    let host = parsed
        .host_str()
        .ok_or_else(|| DiscoveryError::InvalidUrl(format!("no host in '{trimmed}'")))?
        .to_ascii_lowercase();

    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return Err(DiscoveryError::InvalidUrl(format!("no host in '{trimmed}'")));
    }

    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips_www() {
        assert_eq!(
            extract_domain("https://WWW.Example.ORG/grants").unwrap(),
            "example.org"
        );
        assert_eq!(extract_domain("https://example.org").unwrap(), "example.org");
    }

    #[test]
    fn test_strips_only_leading_www() {
        assert_eq!(
            extract_domain("https://www.www2.example.org").unwrap(),
            "www2.example.org"
        );
    }

    #[test]
    fn test_scheme_less_input_accepted() {
        assert_eq!(extract_domain("example.ngo/apply").unwrap(), "example.ngo");
    }

    #[test]
    fn test_port_and_path_ignored() {
        assert_eq!(
            extract_domain("http://example.org:8080/a/b?c=d").unwrap(),
            "example.org"
        );
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(extract_domain("").is_err());
        assert!(extract_domain("   ").is_err());
        assert!(extract_domain("mailto:someone@example.org").is_err());
        assert!(extract_domain("https://").is_err());
        assert!(extract_domain("https://www.").is_err());
    }
}
