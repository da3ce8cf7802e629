//! Scripted browser doubles for tests.
//!
//! [`ScriptedTab`] answers probes from canned responses; [`ScriptedDriver`]
//! plays back navigation outcomes and records every driver call.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::ScraperError;
use crate::probe::{DomProbe, Probe};
use crate::session::BrowserDriver;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Response {
    Text(String),
    Missing,
    Error(String),
    /// The query never answers.
    Stall,
}

#[derive(Debug, Clone, Default)]
struct TabState {
    /// The last queued response for a probe repeats forever.
    responses: HashMap<Probe, VecDeque<Response>>,
    queries: HashMap<Probe, usize>,
    url: Option<String>,
    clickable: Vec<String>,
    clicks: Vec<String>,
}

/// A page whose DOM answers are scripted per probe.
#[derive(Debug, Default)]
pub struct ScriptedTab {
    state: Mutex<TabState>,
}

impl Clone for ScriptedTab {
    fn clone(&self) -> Self {
        Self {
            state: Mutex::new(lock(&self.state).clone()),
        }
    }
}

impl ScriptedTab {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, probe: &Probe, response: Response) -> Self {
        lock(&self.state)
            .responses
            .entry(probe.clone())
            .or_default()
            .push_back(response);
        self
    }

    #[must_use]
    pub fn with_text(self, probe: &Probe, text: &str) -> Self {
        self.push(probe, Response::Text(text.to_owned()))
    }

    /// Queues one response per entry; `None` means the markup is absent.
    #[must_use]
    pub fn with_sequence(mut self, probe: &Probe, texts: &[Option<&str>]) -> Self {
        for text in texts {
            let response = text.map_or(Response::Missing, |t| Response::Text(t.to_owned()));
            self = self.push(probe, response);
        }
        self
    }

    #[must_use]
    pub fn with_error(self, probe: &Probe, reason: &str) -> Self {
        self.push(probe, Response::Error(reason.to_owned()))
    }

    /// Queries for `probe` hang, as a wedged page evaluation would.
    #[must_use]
    pub fn with_stall(self, probe: &Probe) -> Self {
        self.push(probe, Response::Stall)
    }

    #[must_use]
    pub fn with_url(self, url: &str) -> Self {
        lock(&self.state).url = Some(url.to_owned());
        self
    }

    #[must_use]
    pub fn with_clickable(self, selector: &str) -> Self {
        lock(&self.state).clickable.push(selector.to_owned());
        self
    }

    #[must_use]
    pub fn clicks(&self) -> Vec<String> {
        lock(&self.state).clicks.clone()
    }

    #[must_use]
    pub fn query_count(&self, probe: &Probe) -> usize {
        lock(&self.state).queries.get(probe).copied().unwrap_or(0)
    }

    /// Swaps in the scripted content of another page, as a navigation would.
    fn load(&self, page: &ScriptedTab) {
        let next = lock(&page.state).clone();
        *lock(&self.state) = next;
    }
}

#[async_trait]
impl DomProbe for ScriptedTab {
    async fn query_text(&self, probe: &Probe) -> Result<Option<String>, ScraperError> {
        let response = {
            let mut state = lock(&self.state);
            *state.queries.entry(probe.clone()).or_default() += 1;
            match state.responses.get_mut(probe) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match response {
            Some(Response::Text(text)) => Ok(Some(text)),
            Some(Response::Missing) | None => Ok(None),
            Some(Response::Error(reason)) => Err(ScraperError::Evaluation { reason }),
            Some(Response::Stall) => std::future::pending().await,
        }
    }

    async fn click(&self, selector: &str) -> Result<bool, ScraperError> {
        let mut state = lock(&self.state);
        if state.clickable.iter().any(|s| s == selector) {
            state.clicks.push(selector.to_owned());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn current_url(&self) -> Result<Option<String>, ScraperError> {
        Ok(lock(&self.state).url.clone())
    }
}

/// How a scripted navigation ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    Load,
    /// Reports a navigation timeout immediately.
    TimeOut,
    /// Never resolves, so the session's own timeout fires.
    Hang,
    Fail(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    OpenContext,
    CloseContext,
    RestartContext,
    OpenTab(u32),
    Navigate(String),
    CloseTab(u32),
    Reclaim(usize),
    Shutdown,
}

#[derive(Debug, Default)]
struct DriverState {
    context_open: bool,
    next_tab: u32,
    open_tabs: Vec<u32>,
    planned: VecDeque<NavOutcome>,
    failing_urls: HashMap<String, NavOutcome>,
    events: Vec<DriverEvent>,
}

/// In-memory [`BrowserDriver`] with scripted pages and navigation outcomes.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    pages: HashMap<String, ScriptedTab>,
    state: Mutex<DriverState>,
    leak_tabs: bool,
    stalled_network: bool,
    failing_reclaim: bool,
}

/// Tab handed out by [`ScriptedDriver`].
#[derive(Debug)]
pub struct DriverTab {
    id: u32,
    page: ScriptedTab,
}

impl DriverTab {
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn page(&self) -> &ScriptedTab {
        &self.page
    }
}

#[async_trait]
impl DomProbe for DriverTab {
    async fn query_text(&self, probe: &Probe) -> Result<Option<String>, ScraperError> {
        self.page.query_text(probe).await
    }

    async fn click(&self, selector: &str) -> Result<bool, ScraperError> {
        self.page.click(selector).await
    }

    async fn current_url(&self) -> Result<Option<String>, ScraperError> {
        self.page.current_url().await
    }
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Content served when `url` is loaded. Unknown URLs load a blank page.
    #[must_use]
    pub fn with_page(mut self, url: &str, page: ScriptedTab) -> Self {
        self.pages.insert(url.to_owned(), page.with_url(url));
        self
    }

    /// Queues outcomes for the next navigations, in order, to any URL.
    #[must_use]
    pub fn with_navigation_plan(self, outcomes: impl IntoIterator<Item = NavOutcome>) -> Self {
        lock(&self.state).planned.extend(outcomes);
        self
    }

    /// Every navigation to `url` ends with `outcome`.
    #[must_use]
    pub fn with_failing_url(self, url: &str, outcome: NavOutcome) -> Self {
        lock(&self.state)
            .failing_urls
            .insert(url.to_owned(), outcome);
        self
    }

    /// Makes `close_tab` fail and leave the tab open.
    #[must_use]
    pub fn leaking_tabs(mut self) -> Self {
        self.leak_tabs = true;
        self
    }

    /// The network never goes quiet after a load.
    #[must_use]
    pub fn stalled_network(mut self) -> Self {
        self.stalled_network = true;
        self
    }

    /// Makes `reclaim` fail after recording the attempt.
    #[must_use]
    pub fn failing_reclaim(mut self) -> Self {
        self.failing_reclaim = true;
        self
    }

    #[must_use]
    pub fn events(&self) -> Vec<DriverEvent> {
        lock(&self.state).events.clone()
    }

    #[must_use]
    pub fn count(&self, predicate: impl Fn(&DriverEvent) -> bool) -> usize {
        lock(&self.state).events.iter().filter(|e| predicate(e)).count()
    }

    #[must_use]
    pub fn open_tabs(&self) -> usize {
        lock(&self.state).open_tabs.len()
    }

    #[must_use]
    pub fn context_open(&self) -> bool {
        lock(&self.state).context_open
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    type Tab = DriverTab;

    async fn open_context(&mut self) -> Result<(), ScraperError> {
        let mut state = lock(&self.state);
        state.context_open = true;
        state.events.push(DriverEvent::OpenContext);
        Ok(())
    }

    async fn close_context(&mut self) -> Result<(), ScraperError> {
        let mut state = lock(&self.state);
        state.context_open = false;
        state.events.push(DriverEvent::CloseContext);
        Ok(())
    }

    async fn restart_context(&mut self) -> Result<(), ScraperError> {
        let mut state = lock(&self.state);
        state.context_open = true;
        state.events.push(DriverEvent::RestartContext);
        Ok(())
    }

    async fn open_tab(&mut self) -> Result<Self::Tab, ScraperError> {
        let mut state = lock(&self.state);
        if !state.context_open {
            return Err(ScraperError::NoContext);
        }
        state.next_tab += 1;
        let id = state.next_tab;
        state.open_tabs.push(id);
        state.events.push(DriverEvent::OpenTab(id));
        Ok(DriverTab {
            id,
            page: ScriptedTab::new(),
        })
    }

    async fn navigate(&self, tab: &Self::Tab, url: &str) -> Result<(), ScraperError> {
        let outcome = {
            let mut state = lock(&self.state);
            state.events.push(DriverEvent::Navigate(url.to_owned()));
            match state.failing_urls.get(url) {
                Some(outcome) => outcome.clone(),
                None => state.planned.pop_front().unwrap_or(NavOutcome::Load),
            }
        };
        match outcome {
            NavOutcome::Load => {
                match self.pages.get(url) {
                    Some(page) => tab.page.load(page),
                    None => tab.page.load(&ScriptedTab::new().with_url(url)),
                }
                Ok(())
            }
            NavOutcome::TimeOut => Err(ScraperError::NavigationTimeout {
                url: url.to_owned(),
                timeout_ms: 0,
            }),
            NavOutcome::Hang => std::future::pending().await,
            NavOutcome::Fail(reason) => Err(ScraperError::Navigation {
                url: url.to_owned(),
                reason,
            }),
        }
    }

    async fn wait_network_idle(&self, _tab: &Self::Tab) -> Result<(), ScraperError> {
        if self.stalled_network {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn close_tab(&mut self, tab: Self::Tab) -> Result<(), ScraperError> {
        let mut state = lock(&self.state);
        if self.leak_tabs {
            return Err(ScraperError::Evaluation {
                reason: format!("tab {} refused to close", tab.id),
            });
        }
        state.open_tabs.retain(|id| *id != tab.id);
        state.events.push(DriverEvent::CloseTab(tab.id));
        Ok(())
    }

    async fn reclaim(&mut self) -> Result<usize, ScraperError> {
        let mut state = lock(&self.state);
        let stray = state.open_tabs.len();
        state.events.push(DriverEvent::Reclaim(stray));
        if self.failing_reclaim {
            return Err(ScraperError::Launch("browser connection lost".to_owned()));
        }
        state.open_tabs.clear();
        Ok(stray)
    }

    async fn shutdown(&mut self) -> Result<(), ScraperError> {
        let mut state = lock(&self.state);
        state.open_tabs.clear();
        state.context_open = false;
        state.events.push(DriverEvent::Shutdown);
        Ok(())
    }
}
