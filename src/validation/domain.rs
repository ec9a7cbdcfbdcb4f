//! Domain name checks applied before a rule is sent to a region.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ValidationError;

pub const MAX_DOMAIN_LENGTH: usize = 253;

static DNS1123_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*\.)?[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("static regex is valid")
});

static CJK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[一-龥]").expect("static regex is valid"));

/// Accept a lowercase DNS-1123 subdomain, optionally with a leading `*.` label.
pub fn validate_domain_name(domain: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidDomain {
        domain: domain.to_string(),
        reason: reason.to_string(),
    };

    if domain.is_empty() {
        return Err(invalid("domain can not be empty"));
    }
    if CJK.is_match(domain) {
        return Err(invalid("domain can not include chinese characters"));
    }
    if domain.len() > MAX_DOMAIN_LENGTH {
        return Err(invalid("domain more than 253 characters"));
    }
    if domain.split('.').any(|label| label.len() > 63) {
        return Err(invalid("label more than 63 characters"));
    }
    if !DNS1123_SUBDOMAIN.is_match(domain) {
        return Err(invalid(
            "must consist of lower case alphanumeric characters, '-' or '.', optionally prefixed by '*.'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_plain_and_wildcard() {
        for domain in ["api.example.com", "a", "8080.svc-1.prod.apps.local", "*.example.com"] {
            assert!(validate_domain_name(domain).is_ok(), "{domain}");
        }
    }

    #[test]
    fn test_rejects_bad_domains() {
        for domain in [
            "",
            "API.example.com",
            "-api.example.com",
            "api-.example.com",
            "api..example.com",
            "api.*.example.com",
            "**.example.com",
            "api_v1.example.com",
            "例子.example.com",
            "api.example.com/",
        ] {
            assert!(validate_domain_name(domain).is_err(), "{domain}");
        }
    }

    #[test]
    fn test_length_limits() {
        let label = "a".repeat(63);
        let long = [label.as_str(); 4].join(".");
        assert_eq!(long.len(), 255);
        assert!(validate_domain_name(&long).is_err());
        assert!(validate_domain_name(&long[..251]).is_ok());
        assert!(validate_domain_name(&format!("{}.com", "a".repeat(64))).is_err());
    }

    proptest! {
        #[test]
        fn prop_generated_subdomains_are_accepted(
            labels in prop::collection::vec("[a-z0-9]([a-z0-9-]{0,10}[a-z0-9])?", 1..5),
            wildcard in any::<bool>(),
        ) {
            let mut domain = labels.join(".");
            if wildcard {
                domain = format!("*.{domain}");
            }
            prop_assert!(validate_domain_name(&domain).is_ok());
        }

        #[test]
        fn prop_uppercase_is_rejected(s in "[a-z]{0,5}[A-Z][a-z]{0,5}") {
            prop_assert!(validate_domain_name(&s).is_err());
        }
    }
}
