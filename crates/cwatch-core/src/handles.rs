//! Handle normalization shared by targeting and URL building.

use std::sync::LazyLock;

use regex::Regex;

static PROFILE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:instagram\.com|tiktok\.com)/@?([^/?#\s]+)").expect("valid profile url regex")
});

/// Reduces whatever a user typed into the bare account handle.
///
/// Leading `@` and surrounding whitespace are stripped, and full Instagram or
/// TikTok profile URLs are reduced to their handle segment. Returns `None`
/// when nothing is left. Applying it twice gives the same result as once.
#[must_use]
pub fn normalize_handle(raw: &str) -> Option<String> {
    let text = raw.trim().trim_start_matches('@').trim();

    let extracted = PROFILE_URL
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str());

    let handle = strip_decoration(extracted);
    if handle.is_empty() {
        None
    } else {
        Some(handle.to_owned())
    }
}

/// Peels whitespace, leading `@` and trailing `/` until none are left, so
/// mixed tails such as `"x/ /"` reduce fully in one pass.
fn strip_decoration(mut text: &str) -> &str {
    loop {
        let next = text.trim().trim_start_matches('@').trim_end_matches('/');
        if next == text {
            return text;
        }
        text = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_at_sign_and_whitespace() {
        assert_eq!(normalize_handle("@john").as_deref(), Some("john"));
        assert_eq!(normalize_handle("  john \n").as_deref(), Some("john"));
        assert_eq!(normalize_handle("@@john").as_deref(), Some("john"));
    }

    #[test]
    fn extracts_instagram_profile_url() {
        assert_eq!(
            normalize_handle("https://instagram.com/john/").as_deref(),
            Some("john")
        );
        assert_eq!(
            normalize_handle("https://www.Instagram.com/john.doe?hl=en").as_deref(),
            Some("john.doe")
        );
    }

    #[test]
    fn extracts_tiktok_profile_url() {
        assert_eq!(
            normalize_handle("https://www.tiktok.com/@john_tt?lang=id").as_deref(),
            Some("john_tt")
        );
        assert_eq!(
            normalize_handle("tiktok.com/john_tt/").as_deref(),
            Some("john_tt")
        );
    }

    #[test]
    fn blank_input_is_none() {
        assert_eq!(normalize_handle(""), None);
        assert_eq!(normalize_handle("   "), None);
        assert_eq!(normalize_handle("@"), None);
    }

    #[test]
    fn mixed_trailing_slashes_and_spaces_are_removed() {
        assert_eq!(normalize_handle("x/ /").as_deref(), Some("x"));
        assert_eq!(normalize_handle("@ jane / ").as_deref(), Some("jane"));
        assert_eq!(normalize_handle(" / / "), None);
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "@john",
            "john",
            "https://instagram.com/john/",
            "https://www.tiktok.com/@@john?x=1",
            "https://instagram.com/",
            " @ spaced ",
            "tiktok.com/@/",
            "x/ /",
            "@ x / / ",
            "https://instagram.com/john/ /",
        ];
        for input in inputs {
            let once = normalize_handle(input);
            let twice = once.as_deref().and_then(normalize_handle);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }
}
