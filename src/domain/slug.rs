//! Slug normalization for public item URLs.
//!
//! Slugs authored upstream can be arbitrarily long. Once percent-encoded they
//! end up in file names and cache keys, so they are capped by their encoded
//! length. A truncated slug gets a short ID suffix so two long slugs sharing
//! the same prefix still resolve to different items.

/// Limit on the percent-encoded length of a slug.
pub const MAX_ENCODED_SLUG_LEN: usize = 200;
/// Truncated slugs shorter than this fall back to the item ID.
pub const MIN_TRUNCATED_SLUG_CHARS: usize = 10;
const ID_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlugPolicy {
    pub max_encoded_len: usize,
    pub min_chars: usize,
}

impl Default for SlugPolicy {
    fn default() -> Self {
        Self {
            max_encoded_len: MAX_ENCODED_SLUG_LEN,
            min_chars: MIN_TRUNCATED_SLUG_CHARS,
        }
    }
}

impl SlugPolicy {
    /// Normalize `slug` for the item `item_id`.
    ///
    /// - empty slugs become the raw item ID;
    /// - slugs within the encoded limit are returned unchanged;
    /// - longer slugs are cut character by character, then suffixed with
    ///   `-` and the first eight characters of the dash-stripped ID, unless
    ///   the cut leaves fewer than `min_chars` characters, in which case the
    ///   raw item ID is used instead.
    pub fn normalize(&self, slug: &str, item_id: &str) -> String {
        if slug.is_empty() {
            return item_id.to_string();
        }
        if encoded_len(slug) <= self.max_encoded_len {
            return slug.to_string();
        }

        let mut budget = 0usize;
        let mut chars = 0usize;
        let mut cut = 0usize;
        for (offset, ch) in slug.char_indices() {
            let width = encoded_char_len(ch);
            if budget + width > self.max_encoded_len {
                break;
            }
            budget += width;
            chars += ch.len_utf16();
            cut = offset + ch.len_utf8();
        }

        if chars < self.min_chars {
            return item_id.to_string();
        }

        let short_id: String = item_id
            .chars()
            .filter(|ch| *ch != '-')
            .take(ID_SUFFIX_LEN)
            .collect();
        format!("{}-{short_id}", &slug[..cut])
    }
}

/// Convenience wrapper using [`SlugPolicy::default`].
pub fn normalize_slug(slug: &str, item_id: &str) -> String {
    SlugPolicy::default().normalize(slug, item_id)
}

/// Length of `value` once percent-encoded with URI-component rules.
pub fn encoded_len(value: &str) -> usize {
    value.chars().map(encoded_char_len).sum()
}

fn encoded_char_len(ch: char) -> usize {
    if ch.is_ascii_alphanumeric() || "-_.!~*'()".contains(ch) {
        1
    } else {
        3 * ch.len_utf8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM_ID: &str = "1a2b3c4d-5e6f-7081-92a3-b4c5d6e7f809";

    #[test]
    fn short_slug_is_kept() {
        assert_eq!(normalize_slug("hello-world", ITEM_ID), "hello-world");
    }

    #[test]
    fn empty_slug_uses_item_id() {
        assert_eq!(normalize_slug("", ITEM_ID), ITEM_ID);
    }

    #[test]
    fn encoded_len_follows_uri_component_rules() {
        assert_eq!(encoded_len("abc-_.!~*'()"), 12);
        assert_eq!(encoded_len("a b"), 5);
        assert_eq!(encoded_len("基"), 9);
        assert_eq!(encoded_len("😀"), 12);
    }

    #[test]
    fn long_ascii_slug_is_truncated_and_suffixed() {
        let slug = "a".repeat(250);
        let normalized = normalize_slug(&slug, ITEM_ID);

        assert_eq!(normalized, format!("{}-1a2b3c4d", "a".repeat(200)));
    }

    #[test]
    fn multibyte_slug_never_splits_characters() {
        // 32 CJK characters encode to 288 bytes.
        let slug = "基线对齐".repeat(8);
        let normalized = normalize_slug(&slug, ITEM_ID);

        let (head, suffix) = normalized.rsplit_once('-').expect("suffix");
        assert_eq!(suffix, "1a2b3c4d");
        assert!(encoded_len(head) <= MAX_ENCODED_SLUG_LEN);
        assert_eq!(head.chars().count(), 22);
        assert!(slug.starts_with(head));
    }

    #[test]
    fn too_short_after_truncation_falls_back_to_id() {
        let policy = SlugPolicy {
            max_encoded_len: 20,
            min_chars: MIN_TRUNCATED_SLUG_CHARS,
        };
        // Two CJK characters fit into 20 encoded bytes.
        assert_eq!(policy.normalize("基线对齐基线对齐", ITEM_ID), ITEM_ID);
    }
}
