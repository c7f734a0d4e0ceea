//! Fixed-width physical key hashing.
//!
//! Derived cache keys can be arbitrarily long (URL plus serialized payload).
//! Backends store them under an 8-character hex digest instead.
//!
//! The digest is 32-bit FNV-1a over the UTF-16 code units of the key. It is
//! not collision resistant: two distinct logical keys can share a physical
//! key, and an adversary can construct such pairs on purpose.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Hash a logical cache key into an 8-character lowercase hex string.
pub fn hash_key(input: &str) -> String {
    format!("{:08x}", fnv1a_32(input))
}

/// 32-bit FNV-1a over UTF-16 code units.
pub fn fnv1a_32(input: &str) -> u32 {
    input.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(hash_key(""), "811c9dc5");
        assert_eq!(hash_key("a"), "e40c292c");
        assert_eq!(hash_key("foobar"), "bf9cf968");
    }

    #[test]
    fn test_hash_is_stable_and_fixed_width() {
        let first = hash_key("https://jsonplaceholder.typicode.com/todos/1");
        let second = hash_key("https://jsonplaceholder.typicode.com/todos/1");
        assert_eq!(first, second);
        assert_eq!(first.len(), 8);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        assert_ne!(hash_key("ab"), hash_key("ba"));
    }

    #[test]
    fn test_small_digests_are_zero_padded() {
        for input in ["x", "/todos/1", "é", "日本語", "\u{1F600}"] {
            assert_eq!(hash_key(input).len(), 8, "input {input:?}");
        }
    }
}
