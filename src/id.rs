//! Stable ID derivation.
//!
//! Every catalog ID is `hexlower(sha256(utf8(context ":" key)))`. IDs are
//! pure functions of a semantic key, so two scans over an unchanged tree
//! produce identical IDs without needing a persisted ID table.

use sha2::{Digest, Sha256};

fn derive(context: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(context.as_bytes());
    hasher.update(b":");
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// `relative_path` and `last_write_time_iso8601` identify a song version;
/// changing either (a rename or a re-save) mints a new ID.
pub fn song_id(relative_path: &str, last_write_time_iso8601: &str) -> String {
    derive("song", &format!("{relative_path}:{last_write_time_iso8601}"))
}

/// `source_key` is the relative path of an external `.lrc`/sidecar cover, or
/// the relative audio path when the source is embedded in the audio file.
pub fn lyrics_id(source_key: &str) -> String {
    derive("lyrics", source_key)
}

pub fn cover_id(source_key: &str) -> String {
    derive("cover", source_key)
}

/// `name` must already be trimmed/normalized by the caller (§3 invariant:
/// grouping is case-insensitive on the trimmed key, so callers normalize
/// case before deriving the ID).
pub fn artist_id(name: &str) -> String {
    derive("artist", name)
}

/// Key is `"<artist>|<album>"`, trimmed but not lowercased.
pub fn album_id(artist_name: &str, album_name: &str) -> String {
    derive("album", &format!("{artist_name}|{album_name}"))
}

pub fn playlist_id(relative_path: &str) -> String {
    derive("playlist", relative_path)
}

pub fn dir_id(absolute_path: &str) -> String {
    derive("dir", absolute_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let a = song_id("foo/bar.mp3", "2024-01-01T00:00:00Z");
        let b = song_id("foo/bar.mp3", "2024-01-01T00:00:00Z");
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_differ() {
        let a = song_id("foo/bar.mp3", "2024-01-01T00:00:00Z");
        let b = song_id("foo/bar.mp3", "2024-01-02T00:00:00Z");
        assert_ne!(a, b);
    }

    #[test]
    fn is_lowercase_hex_sha256_length() {
        let id = artist_id("Mozart");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn whitespace_normalization_is_caller_responsibility() {
        // The function itself does no trimming; callers normalize first.
        assert_ne!(artist_id("Mozart"), artist_id("Mozart "));
        assert_eq!(artist_id("Mozart"), artist_id("Mozart"));
    }

    #[test]
    fn album_key_is_not_lowercased() {
        let a = album_id("Mozart", "Symphonies Vol 1");
        let b = album_id("mozart", "symphonies vol 1");
        assert_ne!(a, b, "album id derivation itself is case sensitive; callers normalize");
    }

    #[test]
    fn contexts_are_namespaced() {
        // Same raw key text under different contexts must not collide.
        assert_ne!(song_id("x", "y"), playlist_id("x:y"));
    }
}
