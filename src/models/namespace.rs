//! Namespace conventions and classification.
//!
//! Namespaces are opaque strings following the `type:identifier` convention
//! (`user:alice`, `project:atlas`) plus the literal `all`. They are created
//! implicitly on first store and discovered by distinct-value scans.
//!
//! Namespaces under the `system:` prefix are reserved for internal records
//! (learned query expansions, preference signals, scoring factors) and are
//! rejected for user-facing operations so user names can never collide
//! with them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The literal cross-cutting namespace used for tag lookups.
pub const NS_ALL: &str = "all";

/// Prefix for reserved internal namespaces.
pub const SYSTEM_PREFIX: &str = "system:";

/// Stored query-expansion records live here.
pub const NS_QUERY_EXPANSION: &str = "system:query-expansion";

/// Preference signals consulted by the relevance scorer.
pub const NS_PREFERENCES: &str = "system:preferences";

/// Learned scoring factors written by the retrieval pipeline.
pub const NS_SCORING_FACTORS: &str = "system:scoring-factors";

/// Namespaces classified into display buckets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceListing {
    pub users: Vec<String>,
    pub projects: Vec<String>,
    pub all: bool,
}

/// Classify raw namespace strings into user/project buckets.
///
/// Splits on the `type:id` convention. Strings that don't match a known
/// type (or carry an empty identifier) are dropped from the buckets.
pub fn classify_namespaces(raw: &[String]) -> NamespaceListing {
    let mut listing = NamespaceListing::default();

    for ns in raw {
        if ns == NS_ALL {
            listing.all = true;
            continue;
        }

        match ns.split_once(':') {
            Some(("user", id)) if !id.is_empty() => listing.users.push(id.to_string()),
            Some(("project", id)) if !id.is_empty() => listing.projects.push(id.to_string()),
            _ => {}
        }
    }

    listing
}

/// Validate a caller-supplied namespace.
///
/// Rejects empty strings and anything under the reserved `system:` prefix.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.trim().is_empty() {
        return Err(Error::Validation("namespace must not be empty".into()));
    }

    if namespace.starts_with(SYSTEM_PREFIX) {
        return Err(Error::Validation(format!(
            "namespace '{}' is reserved",
            namespace
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_buckets() {
        let raw = strings(&["user:alice", "project:atlas", "user:bob", "all"]);
        let listing = classify_namespaces(&raw);

        assert_eq!(listing.users, vec!["alice", "bob"]);
        assert_eq!(listing.projects, vec!["atlas"]);
        assert!(listing.all);
    }

    #[test]
    fn test_classify_drops_malformed() {
        let raw = strings(&["nocolon", "user:", "team:x", "system:preferences"]);
        let listing = classify_namespaces(&raw);

        assert!(listing.users.is_empty());
        assert!(listing.projects.is_empty());
        assert!(!listing.all);
    }

    #[test]
    fn test_validate_rejects_reserved() {
        assert!(validate_namespace("user:alice").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("  ").is_err());
        assert!(validate_namespace("system:preferences").is_err());
    }
}
