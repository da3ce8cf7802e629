//! Handle existence checks against the counter sites.
//!
//! The Instagram counter shows the account name in a heading once it has
//! resolved the handle, and falls back to its own site name when it cannot.
//! The TikTok counter renders an explicit "user not found" message.

use std::time::Duration;

use cwatch_core::{Platform, ValidationStatus};

use crate::probe::{wait_for_text, DomProbe, Locator, Probe};

pub const INSTAGRAM_TITLE_XPATH: &str = "/html/body/div[2]/div/div/div[1]/div[2]/div[2]/h2";
pub const TIKTOK_MESSAGE_XPATH: &str = "/html/body/div/div/div[3]/div[1]/div/p[2]";
/// Shown by the TikTok counter (Indonesian locale) for unknown accounts.
pub const TIKTOK_NOT_FOUND: &str = "Kami tidak dapat menemukan pengguna dengan ID ini";
const SITE_TITLE: &str = "livecounts.nl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyTiming {
    pub title_polls: u32,
    pub title_wait: Duration,
    pub title_interval: Duration,
    pub message_wait: Duration,
    pub poll: Duration,
}

impl Default for VerifyTiming {
    fn default() -> Self {
        Self {
            title_polls: 10,
            title_wait: Duration::from_secs(1),
            title_interval: Duration::from_millis(500),
            message_wait: Duration::from_secs(7),
            poll: Duration::from_millis(100),
        }
    }
}

/// Lowercase ASCII alphanumerics only.
#[must_use]
pub fn canonicalize(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Running tally of heading samples for one Instagram handle.
#[derive(Debug, Clone)]
pub struct TitleTally {
    expected: String,
    site: String,
    site_titles: u32,
    other_titles: u32,
}

impl TitleTally {
    #[must_use]
    pub fn new(handle: &str) -> Self {
        Self {
            expected: canonicalize(handle),
            site: canonicalize(SITE_TITLE),
            site_titles: 0,
            other_titles: 0,
        }
    }

    /// Records one heading. Returns `true` when it names the handle, which
    /// settles the check immediately.
    pub fn observe(&mut self, title: &str) -> bool {
        let canon = canonicalize(title);
        if canon.is_empty() {
            return false;
        }
        if !self.expected.is_empty() && canon.contains(&self.expected) {
            return true;
        }
        if canon == self.site {
            self.site_titles += 1;
        } else {
            self.other_titles += 1;
        }
        false
    }

    /// Majority decision when no heading named the handle.
    #[must_use]
    pub fn decide(&self) -> ValidationStatus {
        if self.other_titles > self.site_titles {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        }
    }
}

pub async fn verify_instagram<P>(page: &P, handle: &str, timing: &VerifyTiming) -> ValidationStatus
where
    P: DomProbe + ?Sized,
{
    let probe = Probe::text(Locator::xpath(INSTAGRAM_TITLE_XPATH));
    let mut tally = TitleTally::new(handle);

    for _ in 0..timing.title_polls {
        if let Some(title) = wait_for_text(page, &probe, timing.title_wait, timing.poll).await {
            tracing::debug!(handle, title = %title, "instagram heading");
            if tally.observe(&title) {
                return ValidationStatus::Valid;
            }
        }
        tokio::time::sleep(timing.title_interval).await;
    }

    let status = tally.decide();
    tracing::info!(
        handle,
        other_titles = tally.other_titles,
        site_titles = tally.site_titles,
        status = %status,
        "instagram handle decided by majority"
    );
    status
}

/// Invalid only when the not-found message is present.
#[must_use]
pub fn tiktok_status_from_message(message: Option<&str>) -> ValidationStatus {
    let not_found = TIKTOK_NOT_FOUND.to_lowercase();
    match message {
        Some(text) if text.to_lowercase().contains(&not_found) => ValidationStatus::Invalid,
        _ => ValidationStatus::Valid,
    }
}

pub async fn verify_tiktok<P>(page: &P, timing: &VerifyTiming) -> ValidationStatus
where
    P: DomProbe + ?Sized,
{
    let probe = Probe::text(Locator::xpath(TIKTOK_MESSAGE_XPATH));
    let message = wait_for_text(page, &probe, timing.message_wait, timing.poll).await;
    if let Some(text) = &message {
        tracing::debug!(message = %text, "tiktok counter message");
    }
    tiktok_status_from_message(message.as_deref())
}

pub async fn verify_handle<P>(
    page: &P,
    platform: Platform,
    handle: &str,
    timing: &VerifyTiming,
) -> ValidationStatus
where
    P: DomProbe + ?Sized,
{
    match platform {
        Platform::Instagram => verify_instagram(page, handle, timing).await,
        Platform::Tiktok => verify_tiktok(page, timing).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTab;

    fn title_probe() -> Probe {
        Probe::text(Locator::xpath(INSTAGRAM_TITLE_XPATH))
    }

    #[test]
    fn canonicalize_strips_punctuation_and_case() {
        assert_eq!(canonicalize("John.Doe_99"), "johndoe99");
        assert_eq!(canonicalize("livecounts.nl"), "livecountsnl");
    }

    #[test]
    fn tally_matches_contained_handle() {
        let mut tally = TitleTally::new("john.doe");
        assert!(tally.observe("@JohnDoe Live Follower Count"));
    }

    #[test]
    fn tally_majority_decides() {
        let mut tally = TitleTally::new("ghost");
        tally.observe("livecounts.nl");
        tally.observe("Someone Else");
        tally.observe("Someone Else");
        assert_eq!(tally.decide(), ValidationStatus::Valid);

        let mut tally = TitleTally::new("ghost");
        tally.observe("livecounts.nl");
        tally.observe("Someone Else");
        assert_eq!(tally.decide(), ValidationStatus::Invalid);
    }

    #[test]
    fn tiktok_message_detection_ignores_case() {
        assert_eq!(
            tiktok_status_from_message(Some("KAMI TIDAK DAPAT MENEMUKAN PENGGUNA DENGAN ID INI.")),
            ValidationStatus::Invalid
        );
        assert_eq!(tiktok_status_from_message(Some("Halo")), ValidationStatus::Valid);
        assert_eq!(tiktok_status_from_message(None), ValidationStatus::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn instagram_heading_with_handle_is_valid() {
        let tab = ScriptedTab::new().with_sequence(
            &title_probe(),
            &[None, Some("livecounts.nl"), Some("john")],
        );
        let status = verify_instagram(&tab, "john", &VerifyTiming::default()).await;
        assert_eq!(status, ValidationStatus::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn instagram_site_title_only_is_invalid() {
        let tab = ScriptedTab::new().with_text(&title_probe(), "livecounts.nl");
        let status = verify_instagram(&tab, "ghost", &VerifyTiming::default()).await;
        assert_eq!(status, ValidationStatus::Invalid);
    }

    #[tokio::test(start_paused = true)]
    async fn tiktok_not_found_message_is_invalid() {
        let probe = Probe::text(Locator::xpath(TIKTOK_MESSAGE_XPATH));
        let tab = ScriptedTab::new().with_text(&probe, TIKTOK_NOT_FOUND);
        let status = verify_tiktok(&tab, &VerifyTiming::default()).await;
        assert_eq!(status, ValidationStatus::Invalid);
    }

    #[tokio::test(start_paused = true)]
    async fn tiktok_without_message_is_valid() {
        let status = verify_tiktok(&ScriptedTab::new(), &VerifyTiming::default()).await;
        assert_eq!(status, ValidationStatus::Valid);
    }
}
