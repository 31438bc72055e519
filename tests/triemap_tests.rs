//! Integration tests for the persistent trie map.
//!
//! These tests exercise the public API end to end: persistence across
//! versions, existence-checked operations, set algebra and views.

use atomap::error::MapError;
use atomap::persistent::TrieMap;

#[test]
fn test_update_pipeline_scenario() {
    // empty → add x → add y → set x (+10) → remove y leaves exactly {x: 11}
    let map: TrieMap<String, i32> = TrieMap::new();
    let map = map.add("x".to_string(), 1).unwrap();
    let map = map.add("y".to_string(), 2).unwrap();
    let map = map.set_with("x", |value| value + 10).unwrap();
    let map = map.remove("y");

    assert_eq!(map.len(), 1);
    assert_eq!(map.get("x"), Some(&11));
    assert_eq!(map.get("y"), None);
}

#[test]
fn test_versions_are_independent() {
    let base: TrieMap<i32, String> = (0..100).map(|key| (key, key.to_string())).collect();

    let with_extra = base.insert(1000, "extra".to_string());
    let without_some = base.remove_range(&(0..50).collect::<Vec<_>>());
    let rewritten = base.map_values(|value| format!("{value}!"));

    // The base map observed none of it
    assert_eq!(base.len(), 100);
    assert_eq!(base.get(&0), Some(&"0".to_string()));
    assert_eq!(base.get(&1000), None);

    assert_eq!(with_extra.len(), 101);
    assert_eq!(without_some.len(), 50);
    assert_eq!(rewritten.get(&3), Some(&"3!".to_string()));
}

#[test]
fn test_add_remove_round_trip() {
    let mut map: TrieMap<i32, i32> = TrieMap::new();
    for key in 0..1000 {
        map = map.insert(key, key * 3);
    }
    for key in 0..1000 {
        assert_eq!(map.get(&key), Some(&(key * 3)));
    }
    for key in 0..1000 {
        map = map.remove(&key);
        assert_eq!(map.get(&key), None);
    }
    assert!(map.is_empty());
    assert_eq!(map, TrieMap::new());
}

#[test]
fn test_existence_errors_propagate_unchanged() {
    let map: TrieMap<String, i32> = TrieMap::singleton("present".to_string(), 1);

    assert_eq!(
        map.add("present".to_string(), 2).unwrap_err(),
        MapError::KeyAlreadyExists
    );
    assert_eq!(
        map.set("absent".to_string(), 2).unwrap_err(),
        MapError::KeyNotFound
    );
    assert_eq!(
        map.set_with("absent", |value| value + 1).unwrap_err(),
        MapError::KeyNotFound
    );

    // Failed operations never produce a new version with partial state
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("present"), Some(&1));
}

#[test]
fn test_custom_key_semantics_via_newtype() {
    use std::hash::{Hash, Hasher};

    /// Case-insensitive string key.
    #[derive(Clone, Debug)]
    struct CaseInsensitive(String);

    impl PartialEq for CaseInsensitive {
        fn eq(&self, other: &Self) -> bool {
            self.0.eq_ignore_ascii_case(&other.0)
        }
    }

    impl Eq for CaseInsensitive {}

    impl Hash for CaseInsensitive {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.0.to_ascii_lowercase().hash(state);
        }
    }

    let map = TrieMap::new()
        .insert(CaseInsensitive("Alpha".to_string()), 1)
        .insert(CaseInsensitive("ALPHA".to_string()), 2);

    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&CaseInsensitive("alpha".to_string())), Some(&2));
}

#[test]
fn test_view_tracks_one_version() {
    let map: TrieMap<String, i32> = TrieMap::new()
        .insert("a".to_string(), 1)
        .insert("b".to_string(), 2);
    let view = map.as_view();

    let grown = map.insert("c".to_string(), 3);

    assert_eq!(view.len(), 2);
    assert!(!view.contains_key("c"));
    assert_eq!(grown.len(), 3);

    let total: i32 = view.iter().map(|(_, value)| value).sum();
    assert_eq!(total, 3);
}

#[test]
fn test_get_or_insert_agrees_with_returned_map() {
    let map: TrieMap<String, i32> = TrieMap::new();

    let (map, inserted) = map.get_or_insert_with("k".to_string(), || 41);
    assert_eq!(map.get("k").copied(), Some(inserted));

    let (map, found) = map.get_or_insert("k".to_string(), 99);
    assert_eq!(found, 41);
    assert_eq!(map.get("k").copied(), Some(found));
    assert_eq!(map.len(), 1);
}
