//! Cache key derivation and option merging.
//!
//! A derived key is the request URL, followed by the canonical JSON of the
//! request payload when there is one. Object keys in the payload are sorted
//! at every depth before rendering, so two payloads that differ only in
//! field order produce the same key. The sort is done here rather than left
//! to `serde_json::Map`, whose iteration order follows insertion when the
//! `preserve_order` feature is enabled anywhere in the build.
//!
//! Payloads that cannot be represented as JSON (a map with non-string keys,
//! a `Serialize` impl that errors) degrade to the URL alone. Distinct
//! payloads to the same URL then share one cache entry.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::options::{CacheOptions, DefaultCacheOptions, ResolvedCacheOptions};

/// Derive the logical cache key for a request.
pub fn derive_cache_key<D>(url: &str, data: Option<&D>) -> String
where
    D: Serialize + ?Sized,
{
    let Some(data) = data else {
        return url.to_string();
    };

    match serde_json::to_value(data) {
        Ok(Value::Null) => url.to_string(),
        Ok(value) => format!("{url}{}", canonicalize(value)),
        Err(err) => {
            tracing::debug!(url, error = %err, "payload not serializable, using url as cache key");
            url.to_string()
        }
    }
}

/// Rebuild `value` with every object's entries inserted in key order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Merge per-call cache options with the process-wide defaults.
///
/// A non-empty explicit key wins over derivation. `use_cache` and
/// `stale_time` take the per-call value when present.
pub fn resolve_cache_options<D>(
    defaults: &DefaultCacheOptions,
    url: &str,
    data: Option<&D>,
    options: Option<&CacheOptions>,
) -> ResolvedCacheOptions
where
    D: Serialize + ?Sized,
{
    let explicit_key = options
        .and_then(|o| o.key.as_deref())
        .filter(|key| !key.is_empty());

    let key = match explicit_key {
        Some(key) => key.to_string(),
        None => derive_cache_key(url, data),
    };

    ResolvedCacheOptions {
        key: (!key.is_empty()).then_some(key),
        use_cache: options
            .and_then(|o| o.use_cache)
            .unwrap_or(defaults.use_cache),
        stale_time: options
            .and_then(|o| o.stale_time)
            .unwrap_or(defaults.stale_time),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StaleTime;
    use serde::ser::Error as _;
    use serde_json::json;
    use std::collections::HashMap;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refusing to serialize"))
        }
    }

    #[test]
    fn test_no_payload_uses_url() {
        assert_eq!(derive_cache_key::<Value>("/todos/1", None), "/todos/1");
    }

    #[test]
    fn test_null_payload_uses_url() {
        assert_eq!(derive_cache_key("/todos/1", Some(&Value::Null)), "/todos/1");
    }

    #[test]
    fn test_payload_is_appended_as_compact_json() {
        let key = derive_cache_key("/posts", Some(&json!({"title": "foo", "userId": 1})));
        assert_eq!(key, r#"/posts{"title":"foo","userId":1}"#);
    }

    #[test]
    fn test_top_level_order_does_not_matter() {
        #[derive(Serialize)]
        struct A {
            title: &'static str,
            body: &'static str,
        }
        #[derive(Serialize)]
        struct B {
            body: &'static str,
            title: &'static str,
        }

        let a = derive_cache_key("/posts", Some(&A { title: "t", body: "b" }));
        let b = derive_cache_key("/posts", Some(&B { body: "b", title: "t" }));
        assert_eq!(a, b);
    }

    #[test]
    fn test_struct_fields_render_in_key_order() {
        #[derive(Serialize)]
        struct Post {
            title: &'static str,
            body: &'static str,
            meta: Meta,
        }
        #[derive(Serialize)]
        struct Meta {
            z: u8,
            a: u8,
        }

        let key = derive_cache_key(
            "/posts",
            Some(&Post {
                title: "t",
                body: "b",
                meta: Meta { z: 1, a: 2 },
            }),
        );
        assert_eq!(key, r#"/posts{"body":"b","meta":{"a":2,"z":1},"title":"t"}"#);
    }

    #[test]
    fn test_canonicalize_sorts_objects_inside_arrays() {
        let mut inner = Map::new();
        inner.insert("y".to_string(), json!(2));
        inner.insert("x".to_string(), json!(1));
        let value = Value::Array(vec![Value::Object(inner), json!("s")]);

        assert_eq!(canonicalize(value).to_string(), r#"[{"x":1,"y":2},"s"]"#);
    }

    #[test]
    fn test_nested_order_does_not_matter() {
        let a = json!({"outer": {"x": 1, "y": 2}});
        let b: Value = serde_json::from_str(r#"{"outer": {"y": 2, "x": 1}}"#).unwrap();
        assert_eq!(
            derive_cache_key("/nested", Some(&a)),
            derive_cache_key("/nested", Some(&b))
        );
    }

    #[test]
    fn test_different_payloads_produce_different_keys() {
        let a = derive_cache_key("/posts", Some(&json!({"id": 1})));
        let b = derive_cache_key("/posts", Some(&json!({"id": 2})));
        assert_ne!(a, b);
    }

    #[test]
    fn test_unserializable_payload_falls_back_to_url() {
        assert_eq!(derive_cache_key("/posts", Some(&Unserializable)), "/posts");

        let mut tuple_keys = HashMap::new();
        tuple_keys.insert((1, 2), "value");
        assert_eq!(derive_cache_key("/posts", Some(&tuple_keys)), "/posts");
    }

    #[test]
    fn test_explicit_key_wins() {
        let options = CacheOptions::new().with_key("custom-post-key");
        let resolved = resolve_cache_options(
            &DefaultCacheOptions::default(),
            "/posts",
            Some(&json!({"title": "foo"})),
            Some(&options),
        );
        assert_eq!(resolved.key.as_deref(), Some("custom-post-key"));
    }

    #[test]
    fn test_empty_explicit_key_is_ignored() {
        let options = CacheOptions::new().with_key("");
        let resolved = resolve_cache_options::<Value>(
            &DefaultCacheOptions::default(),
            "/todos/1",
            None,
            Some(&options),
        );
        assert_eq!(resolved.key.as_deref(), Some("/todos/1"));
    }

    #[test]
    fn test_empty_url_without_payload_has_no_key() {
        let resolved =
            resolve_cache_options::<Value>(&DefaultCacheOptions::default(), "", None, None);
        assert_eq!(resolved.key, None);
        assert_eq!(resolved.active_key(), None);
    }

    #[test]
    fn test_per_call_values_win_over_defaults() {
        let defaults = DefaultCacheOptions::new()
            .with_use_cache(false)
            .with_stale_time(StaleTime::from_secs(60));
        let options = CacheOptions::cached().with_stale_time(StaleTime::Never);

        let resolved = resolve_cache_options::<Value>(&defaults, "/a", None, Some(&options));
        assert!(resolved.use_cache);
        assert_eq!(resolved.stale_time, StaleTime::Never);
    }

    #[test]
    fn test_defaults_apply_when_options_missing() {
        let defaults = DefaultCacheOptions::new()
            .with_use_cache(false)
            .with_stale_time(StaleTime::from_secs(60));

        let resolved = resolve_cache_options::<Value>(&defaults, "/a", None, None);
        assert!(!resolved.use_cache);
        assert_eq!(resolved.stale_time, StaleTime::from_secs(60));

        let partial = CacheOptions::new().with_key("k");
        let resolved = resolve_cache_options::<Value>(&defaults, "/a", None, Some(&partial));
        assert!(!resolved.use_cache);
        assert_eq!(resolved.stale_time, StaleTime::from_secs(60));
    }
}
