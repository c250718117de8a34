//! Service name matching.
//!
//! A service name is either `base` or `base:variant`, where both parts are
//! drawn from `[A-Za-z0-9_]`. A dependency or conflict declaration can name
//! either form: a bare `base` matches every variant of that base, while a
//! full `base:variant` matches only that exact service.

use crate::error::{Error, Result};

/// Returns true when the declared `check` name matches the `candidate` name.
///
/// `"smtp"` matches `"smtp"` and `"smtp:postfix"`; `"smtp:postfix"` matches
/// only `"smtp:postfix"`.
pub fn names_match(check: &str, candidate: &str) -> bool {
    let (check_base, check_variant) = split(check);
    let (cand_base, cand_variant) = split(candidate);

    if check_base != cand_base {
        return false;
    }
    match (check_variant, cand_variant) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(a), Some(b)) => a == b,
    }
}

/// Splits a name into its base and optional variant.
pub fn split(name: &str) -> (&str, Option<&str>) {
    match name.split_once(':') {
        Some((base, variant)) => (base, Some(variant)),
        None => (name, None),
    }
}

/// Validates a service name: alphanumerics and underscores, with at most one
/// colon separating base from variant, and neither part empty.
pub fn validate(name: &str) -> Result<()> {
    let (base, variant) = split(name);
    if base.is_empty() || !is_word(base) {
        return Err(Error::BadName(name.to_string()));
    }
    match variant {
        None => Ok(()),
        Some(v) if !v.is_empty() && is_word(v) => Ok(()),
        Some(_) => Err(Error::BadName(name.to_string())),
    }
}

fn is_word(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_base_matches_any_variant() {
        assert!(names_match("smtp", "smtp"));
        assert!(names_match("smtp", "smtp:postfix"));
        assert!(names_match("smtp", "smtp:qmail"));
    }

    #[test]
    fn full_name_matches_only_exact() {
        assert!(names_match("smtp:postfix", "smtp:postfix"));
        assert!(!names_match("smtp:postfix", "smtp"));
        assert!(!names_match("smtp:postfix", "smtp:qmail"));
    }

    #[test]
    fn different_bases_never_match() {
        assert!(!names_match("http", "smtp"));
        assert!(!names_match("http:nginx", "smtp:nginx"));
    }

    #[test]
    fn validate_accepts_word_names() {
        assert!(validate("db").is_ok());
        assert!(validate("db_primary").is_ok());
        assert!(validate("smtp:postfix2").is_ok());
    }

    #[test]
    fn validate_rejects_punctuation_and_empty_parts() {
        assert!(validate("").is_err());
        assert!(validate("a b").is_err());
        assert!(validate("a:").is_err());
        assert!(validate(":b").is_err());
        assert!(validate("a:b:c").is_err());
        assert!(validate("a.b").is_err());
    }
}
