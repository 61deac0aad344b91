//! Video URL normalization.
//!
//! Turns the URL shapes users paste into the platform's video identifier,
//! which is the natural key of a [`Video`](crate::models::Video).
//!
//! Accepted shapes (scheme optional, `http` or `https`):
//!
//! | Shape | Example |
//! |-------|---------|
//! | Watch page | `https://www.youtube.com/watch?v=abc123&t=42` |
//! | Mobile watch page | `https://m.youtube.com/watch?v=abc123` |
//! | Short link | `https://youtu.be/abc123?si=xyz` |
//!
//! Anything else yields `None`.

use url::Url;

const WATCH_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com"];
const SHORT_HOSTS: &[&str] = &["youtu.be", "www.youtu.be"];
const MAX_ID_LEN: usize = 64;

/// Extracts the platform video identifier from a URL.
///
/// ```rust
/// use ytchat_core::platform::extract_video_id;
///
/// assert_eq!(extract_video_id("https://youtube.com/watch?v=abc123").as_deref(), Some("abc123"));
/// assert_eq!(extract_video_id("youtu.be/abc123?t=5").as_deref(), Some("abc123"));
/// assert_eq!(extract_video_id("https://vimeo.com/123"), None);
/// ```
pub fn extract_video_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let url = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?
    } else {
        Url::parse(&format!("https://{}", trimmed)).ok()?
    };

    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();

    let candidate = if WATCH_HOSTS.contains(&host.as_str()) {
        if url.path().trim_end_matches('/') != "/watch" {
            return None;
        }
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())?
    } else if SHORT_HOSTS.contains(&host.as_str()) {
        url.path_segments()?.next()?.to_string()
    } else {
        return None;
    };

    is_valid_id(&candidate).then_some(candidate)
}

/// Builds the canonical watch-page URL for an identifier.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_page_forms() {
        for url in [
            "https://youtube.com/watch?v=abc123",
            "https://www.youtube.com/watch?v=abc123",
            "http://m.youtube.com/watch?v=abc123",
            "https://www.youtube.com/watch?v=abc123&t=42s",
            "https://www.youtube.com/watch?feature=share&v=abc123",
            "www.youtube.com/watch?v=abc123",
            "  https://YouTube.com/watch?v=abc123  ",
        ] {
            assert_eq!(extract_video_id(url).as_deref(), Some("abc123"), "{url}");
        }
    }

    #[test]
    fn test_short_link_forms() {
        for url in [
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "youtu.be/dQw4w9WgXcQ",
            "http://www.youtu.be/dQw4w9WgXcQ/",
        ] {
            assert_eq!(
                extract_video_id(url).as_deref(),
                Some("dQw4w9WgXcQ"),
                "{url}"
            );
        }
    }

    #[test]
    fn test_rejects_other_shapes() {
        for url in [
            "",
            "   ",
            "not a url",
            "https://vimeo.com/12345",
            "https://youtube.com/",
            "https://youtube.com/watch",
            "https://youtube.com/watch?v=",
            "https://youtube.com/playlist?list=PL123",
            "https://youtu.be/",
            "ftp://youtube.com/watch?v=abc123",
            "https://youtube.com/watch?v=abc%20123",
            "https://evil-youtube.com/watch?v=abc123",
        ] {
            assert_eq!(extract_video_id(url), None, "{url}");
        }
    }

    #[test]
    fn test_extraction_is_idempotent_through_canonical_url() {
        for url in [
            "https://youtu.be/a-b_C9?t=1",
            "https://m.youtube.com/watch?v=Zz_09-x&list=x",
        ] {
            let id = extract_video_id(url).unwrap();
            assert_eq!(extract_video_id(&watch_url(&id)), Some(id.clone()));
            assert_eq!(extract_video_id(url), Some(id));
        }
    }

    #[test]
    fn test_rejects_overlong_id() {
        let id = "a".repeat(MAX_ID_LEN + 1);
        assert_eq!(extract_video_id(&watch_url(&id)), None);
    }
}
