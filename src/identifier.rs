//! SQL Identifier Safety
//!
//! Every identifier accepted from a caller (table names) is checked here before it is
//! spliced into SQL text. Namespace names never come from callers; they are derived
//! from the integer project id, so they are safe by construction.

use std::sync::LazyLock;

use regex::Regex;

/// Prefix shared by every tenant namespace (`project_42`)
pub const NAMESPACE_PREFIX: &str = "project_";

/// Names starting with this prefix are internal and hidden from listings
pub const INTERNAL_PREFIX: &str = "_";

static SAFE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Check whether `name` can be embedded in SQL text as an identifier
///
/// Safe iff it starts with a letter or underscore and contains only ASCII letters,
/// digits and underscores. Empty strings are unsafe.
#[must_use]
pub fn is_safe_identifier(name: &str) -> bool {
    SAFE_IDENTIFIER.is_match(name)
}

/// Namespace name for a project
#[must_use]
pub fn namespace_name(project_id: u64) -> String {
    format!("{NAMESPACE_PREFIX}{project_id}")
}

/// Double-quote an identifier, doubling any embedded quotes
///
/// Used for catalog-sourced names and derived namespace names. Caller-supplied
/// names must pass [`is_safe_identifier`] first.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether a catalog name is reserved for internal use
#[must_use]
pub fn is_internal(name: &str) -> bool {
    name.starts_with(INTERNAL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_identifiers() {
        for name in ["widgets", "_hidden", "Users2", "a", "_", "snake_case_name", "T_1_2"] {
            assert!(is_safe_identifier(name), "{name} should be safe");
        }
    }

    #[test]
    fn test_unsafe_identifiers() {
        for name in [
            "",
            "1table",
            "widgets; DROP TABLE x",
            "two words",
            "tab\tname",
            "new\nline",
            "quo\"te",
            "single'quote",
            "semi;colon",
            "dash-name",
            "comment--",
            "block/*c*/",
            "dotted.name",
            "ünïcode",
        ] {
            assert!(!is_safe_identifier(name), "{name:?} should be unsafe");
        }
    }

    #[test]
    fn test_namespace_name() {
        assert_eq!(namespace_name(42), "project_42");
        assert_eq!(namespace_name(0), "project_0");
        assert!(is_safe_identifier(&namespace_name(u64::MAX)));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("widgets"), "\"widgets\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_internal_prefix() {
        assert!(is_internal("_migrations"));
        assert!(!is_internal("migrations"));
    }
}
