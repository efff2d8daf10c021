//! Domain-name normalization for FQDN-producing plugins.
//!
//! External sources return names in every imaginable shape: mixed case,
//! wildcard labels, URL fragments, IDN labels, trailing dots. Every name
//! passes through [`normalize_fqdn`] before it is scope-checked or
//! stored; the function is idempotent.

/// Maximum total length of a domain name, in octets.
const MAX_NAME_OCTETS: usize = 253;

/// Maximum length of a single label, in octets.
const MAX_LABEL_OCTETS: usize = 63;

/// Strips URL artifacts from a raw name: scheme prefix, path suffix,
/// port, surrounding whitespace, and a trailing dot.
pub fn clean_name(raw: &str) -> &str {
    let mut name = raw.trim();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = name.strip_prefix(scheme) {
            name = rest;
        }
    }
    if let Some(idx) = name.find('/') {
        name = &name[..idx];
    }
    if let Some(idx) = name.find(':') {
        name = &name[..idx];
    }
    name.trim().trim_end_matches('.')
}

/// Removes one leading wildcard label (`*.`) if present.
pub fn remove_wildcard_label(name: &str) -> &str {
    name.strip_prefix("*.").unwrap_or(name)
}

/// Normalizes a raw name into canonical FQDN form.
///
/// Cleans URL artifacts, strips a leading wildcard label, folds to lower
/// case, converts IDN labels to ASCII, and validates the result as an
/// LDH domain name within DNS length limits. Returns `None` when no
/// valid name remains.
pub fn normalize_fqdn(raw: &str) -> Option<String> {
    let name = remove_wildcard_label(clean_name(raw));
    if name.is_empty() {
        return None;
    }

    let ascii = if name.is_ascii() {
        name.to_ascii_lowercase()
    } else {
        idna::domain_to_ascii(name).ok()?.to_ascii_lowercase()
    };

    if ascii.len() > MAX_NAME_OCTETS {
        return None;
    }
    for label in ascii.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_OCTETS {
            return None;
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return None;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return None;
        }
    }

    Some(ascii)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cleanup() {
        assert_eq!(
            normalize_fqdn("  WWW.Example.COM  "),
            Some("www.example.com".to_string())
        );
        assert_eq!(
            normalize_fqdn("example.com."),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn test_wildcard_label_removed() {
        assert_eq!(
            normalize_fqdn("*.api.example.com"),
            Some("api.example.com".to_string())
        );
        // Only a leading wildcard is stripped.
        assert_eq!(normalize_fqdn("a.*.example.com"), None);
    }

    #[test]
    fn test_url_artifacts_stripped() {
        assert_eq!(
            normalize_fqdn("https://www.example.com/path?q=1"),
            Some("www.example.com".to_string())
        );
        assert_eq!(
            normalize_fqdn("example.com:8443"),
            Some("example.com".to_string())
        );
    }

    #[test]
    fn test_idn_converted_to_ascii() {
        assert_eq!(
            normalize_fqdn("bücher.example"),
            Some("xn--bcher-kva.example".to_string())
        );
    }

    #[test]
    fn test_non_ldh_rejected() {
        assert_eq!(normalize_fqdn("exa mple.com"), None);
        assert_eq!(normalize_fqdn("_dmarc.example.com"), None);
        assert_eq!(normalize_fqdn("-bad.example.com"), None);
        assert_eq!(normalize_fqdn("bad-.example.com"), None);
        assert_eq!(normalize_fqdn(""), None);
        assert_eq!(normalize_fqdn(" . "), None);
    }

    #[test]
    fn test_length_limits() {
        let long_label = format!("{}.example.com", "a".repeat(64));
        assert_eq!(normalize_fqdn(&long_label), None);

        let ok_label = format!("{}.example.com", "a".repeat(63));
        assert!(normalize_fqdn(&ok_label).is_some());

        let long_name = std::iter::repeat("abcdefgh")
            .take(32)
            .collect::<Vec<_>>()
            .join(".");
        assert!(long_name.len() > 253);
        assert_eq!(normalize_fqdn(&long_name), None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [
            "  WWW.Example.COM ",
            "*.api.example.com",
            "https://host.example.org/x",
            "bücher.example",
            "plain.example.net",
        ] {
            if let Some(once) = normalize_fqdn(raw) {
                assert_eq!(normalize_fqdn(&once), Some(once.clone()));
            }
        }
    }
}
