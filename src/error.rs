//! Error types shared by the persistent and atomic map layers.
//!
//! Structural errors are never retried or recovered internally; they
//! propagate synchronously to the immediate caller of the failing
//! operation. CAS contention inside [`crate::atom::AtomHashMap`] is not an
//! error: it is absorbed by retrying and never becomes visible here.

use std::fmt;

/// Error raised by map operations with existence preconditions.
///
/// # Examples
///
/// ```rust
/// use atomap::error::MapError;
/// use atomap::persistent::TrieMap;
///
/// let map = TrieMap::new().insert("key".to_string(), 1);
///
/// assert_eq!(
///     map.add("key".to_string(), 2).unwrap_err(),
///     MapError::KeyAlreadyExists,
/// );
/// assert_eq!(
///     map.set("missing".to_string(), 2).unwrap_err(),
///     MapError::KeyNotFound,
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// An operation that requires an existing key was given an absent one.
    KeyNotFound,
    /// An operation that requires an absent key was given an existing one.
    KeyAlreadyExists,
}

impl fmt::Display for MapError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound => write!(formatter, "key not found in map"),
            Self::KeyAlreadyExists => write!(formatter, "key already exists in map"),
        }
    }
}

impl std::error::Error for MapError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_not_found_display() {
        assert_eq!(format!("{}", MapError::KeyNotFound), "key not found in map");
    }

    #[test]
    fn test_key_already_exists_display() {
        assert_eq!(
            format!("{}", MapError::KeyAlreadyExists),
            "key already exists in map"
        );
    }

    #[test]
    fn test_error_trait_object() {
        let error: Box<dyn std::error::Error> = Box::new(MapError::KeyNotFound);
        assert!(error.source().is_none());
    }
}
