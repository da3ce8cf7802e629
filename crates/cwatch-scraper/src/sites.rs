//! Counter-site profiles: URL templates and probe chains per platform.
//!
//! Markup on these sites changes without notice. Every list below is tried in
//! order, so a new variant is one more entry rather than new code.

use std::time::Duration;

use cwatch_core::Platform;

use crate::probe::{DomProbe, Locator, Probe};
use crate::reader::CounterReader;

const INSTAGRAM_URL: &str = "https://livecounts.nl/instagram-realtime/?u=";
const TIKTOK_URL: &str = "https://tokcounter.com/id?user=";

/// Cookie banner shown by the TikTok counter site.
pub const TIKTOK_COOKIE_BUTTON: &str = "div > div > div:nth-child(1) > button";

const INSTAGRAM_POSTS_BY_LABEL: &str = r"(() => {
  const digitsFrom = (c) => {
    if (!c) return '';
    const vs = c.querySelectorAll('.odometer-value');
    return Array.from(vs).map(e => (e.textContent || '').trim()).join('');
  };
  const label = Array.from(document.querySelectorAll('.stat-label'))
    .find(e => (e.textContent || '').trim().toLowerCase() === 'posts');
  if (!label) return null;
  let prev = label.previousElementSibling;
  while (prev && !String(prev.className || '').includes('odometer')) {
    prev = prev.previousElementSibling;
  }
  return digitsFrom(prev) || digitsFrom(label.parentElement && label.parentElement.querySelector('.posts-odometer')) || null;
})()";

/// Steps run on a freshly loaded page before reading counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preparation {
    Nothing,
    DismissBanner { settle: Duration, selector: &'static str },
}

#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub platform: Platform,
    url_prefix: &'static str,
    settle_marker: &'static str,
    pub followers: CounterReader,
    pub posts: CounterReader,
    pub preparation: Preparation,
}

impl SiteProfile {
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Instagram => Self::instagram(),
            Platform::Tiktok => Self::tiktok(),
        }
    }

    fn instagram() -> Self {
        Self {
            platform: Platform::Instagram,
            url_prefix: INSTAGRAM_URL,
            settle_marker: "instagram",
            followers: CounterReader::new(
                "instagram.followers",
                vec![Probe::all_text(
                    "div[aria-label='Follower Count'] span.odometer-value, \
                     div[aria-label='Follower Count'] span.odometer-formatting-mark",
                )],
            ),
            posts: CounterReader::new(
                "instagram.posts",
                vec![
                    Probe::script(INSTAGRAM_POSTS_BY_LABEL),
                    Probe::within(Locator::css(".posts-odometer"), ".odometer-value"),
                    Probe::within(
                        Locator::css(r#"div[aria-label="Post Count"], div[aria-label="Posts Count"]"#),
                        ".odometer-value",
                    ),
                ],
            ),
            preparation: Preparation::Nothing,
        }
    }

    fn tiktok() -> Self {
        Self {
            platform: Platform::Tiktok,
            url_prefix: TIKTOK_URL,
            settle_marker: "tokcounter",
            followers: CounterReader::new(
                "tiktok.followers",
                vec![Probe::within(Locator::css(".odometer-inside"), ".odometer-value")],
            ),
            posts: CounterReader::new(
                "tiktok.posts",
                vec![
                    Probe::within(
                        Locator::css(
                            "div[aria-label='Post Count'], div[aria-label='Posts Count'], .post-count",
                        ),
                        ".odometer-value",
                    ),
                    Probe::within(
                        Locator::xpath("//html/body/div/div/div[3]/div[4]/div[3]/div/div/div"),
                        ".odometer-value",
                    ),
                ],
            ),
            preparation: Preparation::DismissBanner {
                settle: Duration::from_secs(1),
                selector: TIKTOK_COOKIE_BUTTON,
            },
        }
    }

    /// Bounds every DOM query made by both counter readers.
    #[must_use]
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.followers = self.followers.with_query_timeout(query_timeout);
        self.posts = self.posts.with_query_timeout(query_timeout);
        self
    }

    /// Counter page for `handle`. The handle is expected to be normalized.
    #[must_use]
    pub fn url(&self, handle: &str) -> String {
        format!("{}{handle}", self.url_prefix)
    }

    #[must_use]
    pub fn settle_marker(&self) -> &'static str {
        self.settle_marker
    }

    /// Runs the site's preparation. Best-effort: failures are logged only.
    pub async fn prepare<P>(&self, page: &P)
    where
        P: DomProbe + ?Sized,
    {
        if let Preparation::DismissBanner { settle, selector } = &self.preparation {
            tokio::time::sleep(*settle).await;
            match page.click(selector).await {
                Ok(true) => tracing::debug!(platform = %self.platform, "dismissed cookie banner"),
                Ok(false) => {}
                Err(e) => tracing::debug!(platform = %self.platform, error = %e, "cookie banner click failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{Reading, ValueReader};
    use crate::testing::ScriptedTab;

    #[test]
    fn urls_embed_handle() {
        assert_eq!(
            SiteProfile::for_platform(Platform::Instagram).url("john"),
            "https://livecounts.nl/instagram-realtime/?u=john"
        );
        assert_eq!(
            SiteProfile::for_platform(Platform::Tiktok).url("john_tt"),
            "https://tokcounter.com/id?user=john_tt"
        );
    }

    #[tokio::test]
    async fn instagram_followers_join_digit_spans_and_marks() {
        let profile = SiteProfile::for_platform(Platform::Instagram);
        let probe = profile.followers.strategies()[0].clone();
        let tab = ScriptedTab::new().with_text(&probe, "1,234,567");
        assert_eq!(
            profile.followers.read(&tab).await,
            Reading::Found("1234567".to_owned())
        );
    }

    #[tokio::test]
    async fn tiktok_posts_fall_back_to_xpath_container() {
        let profile = SiteProfile::for_platform(Platform::Tiktok);
        let xpath = profile.posts.strategies()[1].clone();
        let tab = ScriptedTab::new().with_text(&xpath, "88");
        assert_eq!(profile.posts.read(&tab).await, Reading::Found("88".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn tiktok_preparation_clicks_cookie_banner() {
        let profile = SiteProfile::for_platform(Platform::Tiktok);
        let tab = ScriptedTab::new().with_clickable(TIKTOK_COOKIE_BUTTON);
        profile.prepare(&tab).await;
        assert_eq!(tab.clicks(), vec![TIKTOK_COOKIE_BUTTON.to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_banner_is_not_an_error() {
        let profile = SiteProfile::for_platform(Platform::Tiktok);
        let tab = ScriptedTab::new();
        profile.prepare(&tab).await;
        assert!(tab.clicks().is_empty());
    }
}
