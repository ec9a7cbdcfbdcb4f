//! Header names accepted in a rule's `set_headers`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::HeaderSetting;
use crate::errors::ValidationError;

static HEADER_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").expect("static regex is valid")
});

/// Accept a header name made of alphanumerics, `-`, `_` and `.`, starting and
/// ending with an alphanumeric.
pub fn validate_header_key(key: &str) -> Result<(), ValidationError> {
    if HEADER_KEY.is_match(key) {
        Ok(())
    } else {
        Err(ValidationError::ForbiddenHeaderKey { key: key.to_string() })
    }
}

/// Reject the first header whose key is not acceptable.
pub fn validate_set_headers(headers: &[HeaderSetting]) -> Result<(), ValidationError> {
    headers.iter().try_for_each(|header| validate_header_key(&header.item_key))
}
