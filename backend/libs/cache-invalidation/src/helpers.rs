//! Cache key helpers
//!
//! Keys have the form `<entity>:<id>`, for example `post:p1` or
//! `feed:recent`. The id may itself contain colons.

use crate::{EntityType, InvalidationError, Result};

/// ```
/// use cache_invalidation::{build_cache_key, EntityType};
///
/// assert_eq!(build_cache_key(&EntityType::Feed, "saved"), "feed:saved");
/// ```
pub fn build_cache_key(entity_type: &EntityType, entity_id: &str) -> String {
    format!("{}:{}", entity_type, entity_id)
}

/// Split a key at its first colon
pub fn parse_cache_key(key: &str) -> Result<(EntityType, String)> {
    let (entity, id) = key
        .split_once(':')
        .filter(|(entity, id)| !entity.is_empty() && !id.is_empty())
        .ok_or_else(|| InvalidationError::InvalidKey(key.to_string()))?;

    Ok((EntityType::from(entity), id.to_string()))
}

/// Glob match where `*` stands for any run of characters, including none
///
/// ```
/// use cache_invalidation::key_matches_pattern;
///
/// assert!(key_matches_pattern("feed:*", "feed:liked"));
/// assert!(!key_matches_pattern("feed:*", "post:p1"));
/// ```
pub fn key_matches_pattern(pattern: &str, key: &str) -> bool {
    let (pattern, key) = (pattern.as_bytes(), key.as_bytes());
    let (mut p, mut k) = (0, 0);
    // last `*` and the key position it currently extends to
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, k));
                p += 1;
            }
            Some(&c) if c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match star {
                Some((star_p, star_k)) => {
                    star = Some((star_p, star_k + 1));
                    p = star_p + 1;
                    k = star_k + 1;
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
