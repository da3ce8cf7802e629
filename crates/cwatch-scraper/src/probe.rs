//! DOM probe descriptors and the page capability that answers them.
//!
//! A [`Probe`] is plain data describing where a counter lives in the page.
//! Site markup variants are expressed as ordered lists of probes, so adding
//! a fallback never touches sampling code.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::ScraperError;

/// How a single node is located.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    #[must_use]
    pub fn xpath(path: impl Into<String>) -> Self {
        Locator::XPath(path.into())
    }

    fn to_js(&self) -> String {
        match self {
            Locator::Css(selector) => format!("document.querySelector({})", js_string(selector)),
            Locator::XPath(path) => format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_string(path)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Probe {
    /// `textContent` of every match, concatenated in document order.
    AllText { selector: String },
    /// `textContent` of every `values` match inside the first container.
    Within { container: Locator, values: String },
    /// `textContent` of the first located node.
    Text { locator: Locator },
    /// Raw expression evaluating to a string or `null`.
    Script { source: String },
}

impl Probe {
    #[must_use]
    pub fn all_text(selector: impl Into<String>) -> Self {
        Probe::AllText {
            selector: selector.into(),
        }
    }

    #[must_use]
    pub fn within(container: Locator, values: impl Into<String>) -> Self {
        Probe::Within {
            container,
            values: values.into(),
        }
    }

    #[must_use]
    pub fn text(locator: Locator) -> Self {
        Probe::Text { locator }
    }

    #[must_use]
    pub fn script(source: impl Into<String>) -> Self {
        Probe::Script {
            source: source.into(),
        }
    }

    /// JavaScript expression producing the probe's text, or `null` when the
    /// markup is absent.
    #[must_use]
    pub fn to_script(&self) -> String {
        match self {
            Probe::AllText { selector } => format!(
                "(() => {{ const els = document.querySelectorAll({}); \
                 if (!els.length) return null; \
                 return Array.from(els).map(e => e.textContent || '').join(''); }})()",
                js_string(selector)
            ),
            Probe::Within { container, values } => format!(
                "(() => {{ const c = {}; if (!c) return null; \
                 const vs = c.querySelectorAll({}); if (!vs.length) return null; \
                 return Array.from(vs).map(e => e.textContent || '').join(''); }})()",
                container.to_js(),
                js_string(values)
            ),
            Probe::Text { locator } => format!(
                "(() => {{ const n = {}; return n ? n.textContent : null; }})()",
                locator.to_js()
            ),
            Probe::Script { source } => source.clone(),
        }
    }
}

/// Quotes `raw` as a JavaScript string literal.
fn js_string(raw: &str) -> String {
    serde_json::Value::String(raw.to_owned()).to_string()
}

/// Read-only access to the DOM of a loaded page.
#[async_trait]
pub trait DomProbe: Send + Sync {
    /// Evaluates `probe`; `Ok(None)` when the markup is not there.
    async fn query_text(&self, probe: &Probe) -> Result<Option<String>, ScraperError>;

    /// Clicks the first element matching `selector`. Returns whether one existed.
    async fn click(&self, selector: &str) -> Result<bool, ScraperError>;

    async fn current_url(&self) -> Result<Option<String>, ScraperError>;
}

/// Polls `probe` until it yields non-blank text or `timeout` passes.
///
/// Errors are treated like absence; a page that never renders the node
/// simply yields `None`. A query that hangs is cut off at the deadline.
pub async fn wait_for_text<P>(page: &P, probe: &Probe, timeout: Duration, poll: Duration) -> Option<String>
where
    P: DomProbe + ?Sized,
{
    let start = Instant::now();
    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        match tokio::time::timeout(remaining, page.query_text(probe)).await {
            Ok(Ok(Some(text))) if !text.trim().is_empty() => return Some(text.trim().to_owned()),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "probe failed while waiting for text"),
            Err(_) => return None,
        }
        if start.elapsed() + poll > timeout {
            return None;
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_selector_is_quoted() {
        let script = Probe::all_text("div[aria-label='Follower Count'] span.odometer-value").to_script();
        assert!(script.contains(r#"document.querySelectorAll("div[aria-label='Follower Count'] span.odometer-value")"#));
    }

    #[test]
    fn embedded_quotes_are_escaped() {
        let script = Probe::text(Locator::css(r#"div[aria-label="Post Count"]"#)).to_script();
        assert!(script.contains(r#"document.querySelector("div[aria-label=\"Post Count\"]")"#));
    }

    #[test]
    fn xpath_uses_first_ordered_node() {
        let script = Probe::within(
            Locator::xpath("//html/body/div/div/div[3]"),
            ".odometer-value",
        )
        .to_script();
        assert!(script.contains("document.evaluate(\"//html/body/div/div/div[3]\""));
        assert!(script.contains("FIRST_ORDERED_NODE_TYPE"));
        assert!(script.contains("c.querySelectorAll(\".odometer-value\")"));
    }

    #[test]
    fn script_probe_is_passed_through() {
        assert_eq!(Probe::script("document.title").to_script(), "document.title");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_query_is_cut_off_at_the_wait_deadline() {
        let title = Probe::text(Locator::xpath("//title"));
        let page = crate::testing::ScriptedTab::new().with_stall(&title);

        let started = Instant::now();
        let found = wait_for_text(&page, &title, Duration::from_secs(3), Duration::from_millis(500)).await;

        assert_eq!(found, None);
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
