//! Secret redaction for run diagnostics.
//!
//! Outcome messages and captured command errors can echo connection
//! parameters back (psql prints its command line, ssh prints the target).
//! Everything that ends up in a report passes through a [`Redactor`] first.

pub mod patterns;
pub mod redactor;

pub use redactor::{RedactionResult, RedactionStats, Redactor, RedactorConfig};

/// Default placeholder for redacted values.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

/// Hash-only placeholder (shows hash of original value).
pub const HASH_PLACEHOLDER_PREFIX: &str = "[HASH:";
pub const HASH_PLACEHOLDER_SUFFIX: &str = "]";

/// Create a hash placeholder for a value.
pub fn hash_placeholder(value: &str) -> String {
    format!(
        "{}{}{}",
        HASH_PLACEHOLDER_PREFIX,
        hostspec_common::hash::short_digest(value, 12),
        HASH_PLACEHOLDER_SUFFIX
    )
}

/// Fixed-width mask for a secret shown in a label.
pub fn mask(_value: &str) -> String {
    "****".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_placeholder() {
        let placeholder = hash_placeholder("mysecretpassword");
        assert!(placeholder.starts_with(HASH_PLACEHOLDER_PREFIX));
        assert!(placeholder.ends_with(HASH_PLACEHOLDER_SUFFIX));
        assert_eq!(placeholder.len(), 19); // [HASH: + 12 chars + ]
        assert_eq!(placeholder, hash_placeholder("mysecretpassword"));
    }

    #[test]
    fn test_mask_hides_length() {
        assert_eq!(mask("a"), mask("a much longer secret"));
    }
}
