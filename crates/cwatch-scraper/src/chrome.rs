//! Chromium backend over the DevTools protocol.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use cwatch_core::AppConfig;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::ScraperError;
use crate::probe::{DomProbe, Probe};
use crate::session::BrowserDriver;

const COMMON_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--mute-audio",
    "--disable-infobars",
    "--disable-notifications",
    "--disable-extensions",
    "--disable-plugins",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-features=TranslateUI",
    "--disable-ipc-flooding-protection",
    "--memory-pressure-off",
];

/// Silence on the network for this long counts as idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

/// How the browser process is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchProfile {
    pub show_browser: bool,
    pub executable: Option<PathBuf>,
    pub user_agent: String,
}

impl LaunchProfile {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            show_browser: config.show_browser,
            executable: config.chrome_executable.clone(),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Command-line switches. Headless runs skip image decoding.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = COMMON_ARGS.iter().map(|a| (*a).to_owned()).collect();
        if self.show_browser {
            args.push("--start-maximized".to_owned());
        } else {
            args.push("--blink-settings=imagesEnabled=false".to_owned());
        }
        args
    }

    #[must_use]
    pub fn window_size(&self) -> (u32, u32) {
        if self.show_browser {
            (1920, 1080)
        } else {
            (100, 100)
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, ScraperError> {
        let (width, height) = self.window_size();
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .viewport(Viewport {
                width,
                height,
                ..Viewport::default()
            })
            .args(self.args());
        if self.show_browser {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(ScraperError::Launch)
    }
}

/// A tab in a [`ChromeDriver`] context.
#[derive(Debug, Clone)]
pub struct ChromeTab {
    page: Page,
}

impl ChromeTab {
    async fn evaluate(&self, script: String) -> Result<Option<Value>, ScraperError> {
        let result = self.page.evaluate(script).await.map_err(evaluation_error)?;
        Ok(result.value().cloned())
    }
}

/// Script failures become [`ScraperError::Evaluation`]; protocol timeouts
/// stay [`ScraperError::Browser`] so they still count as timeouts.
fn evaluation_error(err: CdpError) -> ScraperError {
    match err {
        CdpError::Timeout => ScraperError::Browser(CdpError::Timeout),
        other => ScraperError::Evaluation {
            reason: other.to_string(),
        },
    }
}

/// Resolves once `activity` has been silent for `quiet`, or has ended.
async fn wait_for_quiet<S>(activity: S, quiet: Duration)
where
    S: Stream<Item = ()>,
{
    tokio::pin!(activity);
    while let Ok(Some(())) = tokio::time::timeout(quiet, activity.next()).await {}
}

fn click_script(selector: &str) -> String {
    format!(
        "(() => {{ const e = document.querySelector({}); if (!e) return false; e.click(); return true; }})()",
        Value::String(selector.to_owned())
    )
}

#[async_trait]
impl DomProbe for ChromeTab {
    async fn query_text(&self, probe: &Probe) -> Result<Option<String>, ScraperError> {
        match self.evaluate(probe.to_script()).await? {
            Some(Value::String(text)) => Ok(Some(text)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            _ => Ok(None),
        }
    }

    async fn click(&self, selector: &str) -> Result<bool, ScraperError> {
        Ok(matches!(
            self.evaluate(click_script(selector)).await?,
            Some(Value::Bool(true))
        ))
    }

    async fn current_url(&self) -> Result<Option<String>, ScraperError> {
        Ok(self.page.url().await?)
    }
}

/// Drives a local Chromium through `chromiumoxide`.
pub struct ChromeDriver {
    browser: Browser,
    handler: JoinHandle<()>,
    user_agent: String,
    context: Option<BrowserContextId>,
    pages: Vec<Page>,
}

impl ChromeDriver {
    /// Starts the browser process and its event loop.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Launch`] for an invalid configuration and the
    /// protocol error when the process cannot be started.
    pub async fn launch(profile: &LaunchProfile) -> Result<Self, ScraperError> {
        let config = profile.browser_config()?;
        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser event loop error");
                }
            }
        });
        tracing::info!(headless = !profile.show_browser, "browser launched");
        Ok(Self {
            browser,
            handler,
            user_agent: profile.user_agent.clone(),
            context: None,
            pages: Vec::new(),
        })
    }

    async fn close_pages(&mut self) -> usize {
        let stray = std::mem::take(&mut self.pages);
        let count = stray.len();
        for page in stray {
            if let Err(e) = page.close().await {
                tracing::debug!(error = %e, "failed to close stray tab");
            }
        }
        count
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    type Tab = ChromeTab;

    async fn open_context(&mut self) -> Result<(), ScraperError> {
        let id = self
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await?;
        tracing::debug!(context = ?id, "browser context opened");
        self.context = Some(id);
        Ok(())
    }

    async fn close_context(&mut self) -> Result<(), ScraperError> {
        self.close_pages().await;
        if let Some(id) = self.context.take() {
            self.browser.dispose_browser_context(id).await?;
        }
        Ok(())
    }

    async fn open_tab(&mut self) -> Result<ChromeTab, ScraperError> {
        let context = self.context.clone().ok_or(ScraperError::NoContext)?;
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context)
            .build()
            .map_err(|reason| ScraperError::Navigation {
                url: "about:blank".to_owned(),
                reason,
            })?;
        let page = self.browser.new_page(params).await?;
        page.set_user_agent(self.user_agent.as_str()).await?;
        self.pages.push(page.clone());
        Ok(ChromeTab { page })
    }

    async fn navigate(&self, tab: &ChromeTab, url: &str) -> Result<(), ScraperError> {
        tab.page.goto(url).await?;
        Ok(())
    }

    /// Waits for the load event, then for request traffic to go quiet.
    async fn wait_network_idle(&self, tab: &ChromeTab) -> Result<(), ScraperError> {
        let sent = tab.page.event_listener::<EventRequestWillBeSent>().await?;
        let finished = tab.page.event_listener::<EventLoadingFinished>().await?;
        let failed = tab.page.event_listener::<EventLoadingFailed>().await?;
        tab.page.wait_for_navigation().await?;

        let activity = futures::stream::select_all([
            sent.map(|_| ()).boxed(),
            finished.map(|_| ()).boxed(),
            failed.map(|_| ()).boxed(),
        ]);
        wait_for_quiet(activity, NETWORK_QUIET).await;
        Ok(())
    }

    async fn close_tab(&mut self, tab: ChromeTab) -> Result<(), ScraperError> {
        let target = tab.page.target_id().clone();
        tab.page.close().await?;
        self.pages.retain(|p| *p.target_id() != target);
        Ok(())
    }

    async fn reclaim(&mut self) -> Result<usize, ScraperError> {
        Ok(self.close_pages().await)
    }

    async fn shutdown(&mut self) -> Result<(), ScraperError> {
        if let Err(e) = self.close_context().await {
            tracing::debug!(error = %e, "context close failed during shutdown");
        }
        self.browser.close().await?;
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "browser process did not exit cleanly");
        }
        self.handler.abort();
        tracing::info!("browser shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(show_browser: bool) -> LaunchProfile {
        LaunchProfile {
            show_browser,
            executable: None,
            user_agent: "test-agent".to_owned(),
        }
    }

    #[test]
    fn headless_blocks_images_and_shrinks_window() {
        let headless = profile(false);
        assert!(headless
            .args()
            .contains(&"--blink-settings=imagesEnabled=false".to_owned()));
        assert!(!headless.args().contains(&"--start-maximized".to_owned()));
        assert_eq!(headless.window_size(), (100, 100));
    }

    #[test]
    fn visible_browser_is_maximized() {
        let visible = profile(true);
        assert!(visible.args().contains(&"--start-maximized".to_owned()));
        assert_eq!(visible.window_size(), (1920, 1080));
    }

    #[test]
    fn click_script_quotes_selector() {
        let script = click_script("div > div > div:nth-child(1) > button");
        assert!(script.contains(r#"document.querySelector("div > div > div:nth-child(1) > button")"#));
    }

    #[test]
    fn script_failures_are_evaluation_errors() {
        let err = evaluation_error(CdpError::ChromeMessage(
            "Cannot find context with specified id".to_owned(),
        ));
        assert!(
            matches!(&err, ScraperError::Evaluation { reason } if reason.contains("Cannot find context"))
        );
        assert!(!err.is_navigation_timeout());

        let timeout = evaluation_error(CdpError::Timeout);
        assert!(matches!(timeout, ScraperError::Browser(CdpError::Timeout)));
        assert!(timeout.is_navigation_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn network_is_idle_after_a_quiet_window() {
        let requests = futures::stream::unfold(0u32, |n| async move {
            if n == 3 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            Some(((), n + 1))
        })
        .chain(futures::stream::pending());

        let started = tokio::time::Instant::now();
        wait_for_quiet(requests, NETWORK_QUIET).await;

        // Last request at 600 ms, then 500 ms of silence.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1100) && waited < Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn finished_activity_stream_is_idle() {
        let started = tokio::time::Instant::now();
        wait_for_quiet(futures::stream::iter([(), ()]), NETWORK_QUIET).await;
        assert!(started.elapsed() < NETWORK_QUIET);
    }
}
