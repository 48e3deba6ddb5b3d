//! Property tests for the cache front.

use proptest::prelude::*;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{Cache, MemoryCacheProvider};

fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,24}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_set_then_get_round_trips(key in key_strategy(), value in json_strategy()) {
        let cache = Cache::for_owner(Arc::new(MemoryCacheProvider::new()), "Prop").unwrap();
        cache.set(&key, &value, None).unwrap();
        prop_assert_eq!(cache.get::<Value>(&key).unwrap(), Some(value));
    }

    #[test]
    fn prop_pop_removes(key in key_strategy(), value in json_strategy()) {
        let cache = Cache::for_owner(Arc::new(MemoryCacheProvider::new()), "Prop").unwrap();
        cache.set(&key, &value, None).unwrap();
        prop_assert_eq!(cache.pop::<Value>(&key).unwrap(), Some(value));
        prop_assert_eq!(cache.get_or(&key, Value::from("fallback")).unwrap(), Value::from("fallback"));
    }

    #[test]
    fn prop_clear_is_total(keys in prop::collection::vec(key_strategy(), 0..20)) {
        let provider = MemoryCacheProvider::new();
        let cache = Cache::for_owner(Arc::new(provider.clone()), "Prop").unwrap();
        for (i, key) in keys.iter().enumerate() {
            cache.set(key, &i, None).unwrap();
        }
        cache.clear().unwrap();
        for key in &keys {
            prop_assert_eq!(cache.get::<usize>(key).unwrap(), None);
        }
        prop_assert!(provider.physical_keys().is_empty());
    }
}
