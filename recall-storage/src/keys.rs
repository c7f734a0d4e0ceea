//! Physical key layout shared by the prefix-scoped backends.

use recall_core::hash_key;

/// Separator between namespace and hashed key.
pub const NAMESPACE_SEPARATOR: char = ':';

/// `"{namespace}:{hash}"` for a logical key.
pub fn scoped_key(namespace: &str, key: &str) -> String {
    format!("{namespace}{NAMESPACE_SEPARATOR}{}", hash_key(key))
}

/// Prefix shared by every physical key of a namespace.
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{namespace}{NAMESPACE_SEPARATOR}")
}
