//! Integration tests for `PageSession::visit`.
//!
//! Every test drives a `ScriptedDriver`, so no browser is started. Tokio's
//! clock is paused: backoff sleeps and navigation timeouts resolve instantly
//! while keeping their recorded durations.

use std::time::Duration;

use async_trait::async_trait;

use cwatch_scraper::testing::{DriverEvent, DriverTab, NavOutcome, ScriptedDriver, ScriptedTab};
use cwatch_scraper::{
    DomProbe, Locator, PageSession, Probe, ScraperError, SessionPolicy, TabTask,
};

const URL: &str = "https://livecounts.nl/instagram-realtime/?u=john";

/// Returns the URL the tab landed on.
struct LandedUrl;

#[async_trait]
impl TabTask<DriverTab> for LandedUrl {
    type Output = Option<String>;

    async fn run(&mut self, tab: &DriverTab) -> Result<Option<String>, ScraperError> {
        tab.current_url().await
    }
}

/// Fails the first `failures` runs, then reads a heading.
struct FlakyRead {
    failures: u32,
    runs: u32,
}

#[async_trait]
impl TabTask<DriverTab> for FlakyRead {
    type Output = Option<String>;

    async fn run(&mut self, tab: &DriverTab) -> Result<Option<String>, ScraperError> {
        self.runs += 1;
        if self.runs <= self.failures {
            return Err(ScraperError::Evaluation {
                reason: "execution context was destroyed".to_owned(),
            });
        }
        tab.query_text(&heading()).await
    }
}

fn heading() -> Probe {
    Probe::text(Locator::css("h2"))
}

fn bounded(max_attempts: u32) -> SessionPolicy {
    SessionPolicy {
        max_attempts: Some(max_attempts),
        ..SessionPolicy::default()
    }
}

async fn started(driver: ScriptedDriver, policy: SessionPolicy) -> PageSession<ScriptedDriver> {
    let mut session = PageSession::new(driver, policy);
    session.begin_cycle().await.expect("context opens");
    session
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn visit_loads_page_and_runs_task_once() {
    let page = ScriptedTab::new().with_text(&heading(), "john");
    let driver = ScriptedDriver::new().with_page(URL, page);
    let mut session = started(driver, SessionPolicy::default()).await;

    let visit = session
        .visit(URL, Some("instagram"), &mut FlakyRead { failures: 0, runs: 0 })
        .await
        .expect("visit succeeds");

    assert_eq!(visit.output.as_deref(), Some("john"));
    assert_eq!(visit.attempts, 1);
    assert_eq!(visit.context_restarts, 0);
    assert!(visit.backoff_delays.is_empty());
}

#[tokio::test(start_paused = true)]
async fn busy_network_delays_the_task_but_does_not_fail_the_visit() {
    let page = ScriptedTab::new().with_text(&heading(), "john");
    let driver = ScriptedDriver::new().with_page(URL, page).stalled_network();
    let policy = SessionPolicy::default();
    let idle_budget = policy.network_idle_timeout;
    let mut session = started(driver, policy).await;

    let begun = tokio::time::Instant::now();
    let visit = session
        .visit(URL, Some("instagram"), &mut FlakyRead { failures: 0, runs: 0 })
        .await
        .expect("visit succeeds");

    assert_eq!(visit.output.as_deref(), Some("john"));
    assert_eq!(visit.attempts, 1);
    let waited = begun.elapsed();
    assert!(waited >= idle_budget && waited < idle_budget + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn cycle_opens_and_closes_one_context() {
    let driver = ScriptedDriver::new();
    let mut session = started(driver, SessionPolicy::default()).await;

    session.visit(URL, None, &mut LandedUrl).await.expect("visit succeeds");
    let reclaimed = session.end_cycle().await.expect("cycle ends");

    assert_eq!(reclaimed, 0);
    assert_eq!(
        session.driver().events(),
        vec![
            DriverEvent::OpenContext,
            DriverEvent::OpenTab(1),
            DriverEvent::Navigate(URL.to_owned()),
            DriverEvent::CloseTab(1),
            DriverEvent::CloseContext,
            DriverEvent::Reclaim(0),
        ]
    );
    assert!(!session.driver().context_open());
}

// ---------------------------------------------------------------------------
// Timeouts, backoff and context restarts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn three_timeouts_restart_context_once_and_back_off_exponentially() {
    let driver = ScriptedDriver::new().with_navigation_plan([
        NavOutcome::TimeOut,
        NavOutcome::TimeOut,
        NavOutcome::TimeOut,
    ]);
    let mut session = started(driver, SessionPolicy::default()).await;

    let visit = session.visit(URL, None, &mut LandedUrl).await.expect("fourth attempt loads");

    assert_eq!(visit.attempts, 4);
    assert_eq!(visit.context_restarts, 1);
    assert_eq!(
        visit.backoff_delays,
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ]
    );

    let events = session.driver().events();
    let restart_at = events
        .iter()
        .position(|e| *e == DriverEvent::RestartContext)
        .expect("context restarted");
    assert_eq!(events[restart_at - 1], DriverEvent::CloseTab(3));
    assert_eq!(events[restart_at + 1], DriverEvent::OpenTab(4));
    assert_eq!(session.driver().count(|e| *e == DriverEvent::RestartContext), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_navigation_is_cut_off_by_attempt_timeout() {
    let driver = ScriptedDriver::new().with_failing_url(URL, NavOutcome::Hang);
    let mut session = started(driver, bounded(2)).await;

    let start = tokio::time::Instant::now();
    let err = session
        .visit(URL, None, &mut LandedUrl)
        .await
        .expect_err("navigation never completes");

    match err {
        ScraperError::AttemptsExhausted {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert!(last_error.contains("timed out after 5000 ms"), "{last_error}");
        }
        other => panic!("expected AttemptsExhausted, got {other:?}"),
    }
    // 3 s timeout, 2 s backoff, 5 s timeout.
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn other_failures_restart_on_fifth_failure_only() {
    let driver = ScriptedDriver::new()
        .with_navigation_plan((0..5).map(|_| NavOutcome::Fail("net::ERR_CONNECTION_RESET".to_owned())));
    let mut session = started(driver, SessionPolicy::default()).await;

    let visit = session.visit(URL, None, &mut LandedUrl).await.expect("sixth attempt loads");

    assert_eq!(visit.attempts, 6);
    assert_eq!(visit.context_restarts, 1);
    assert_eq!(visit.backoff_delays[4], Duration::from_secs(32));
    let events = session.driver().events();
    let restart_at = events
        .iter()
        .position(|e| *e == DriverEvent::RestartContext)
        .expect("context restarted");
    assert_eq!(events[restart_at - 1], DriverEvent::CloseTab(5));
}

#[tokio::test(start_paused = true)]
async fn backoff_is_capped() {
    let policy = SessionPolicy {
        max_backoff: Duration::from_secs(5),
        max_attempts: Some(5),
        ..SessionPolicy::default()
    };
    let driver = ScriptedDriver::new().with_failing_url(URL, NavOutcome::TimeOut);
    let mut session = started(driver, policy).await;

    let start = tokio::time::Instant::now();
    session.visit(URL, None, &mut LandedUrl).await.expect_err("always times out");

    // Four delays before giving up: 2, 4, 5, 5.
    assert_eq!(start.elapsed(), Duration::from_secs(16));
}

// ---------------------------------------------------------------------------
// Task failures and attempt limits
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn task_errors_are_retried_on_a_fresh_tab() {
    let page = ScriptedTab::new().with_text(&heading(), "john");
    let driver = ScriptedDriver::new().with_page(URL, page);
    let mut session = started(driver, SessionPolicy::default()).await;
    let mut task = FlakyRead { failures: 2, runs: 0 };

    let visit = session.visit(URL, None, &mut task).await.expect("third run succeeds");

    assert_eq!(visit.output.as_deref(), Some("john"));
    assert_eq!(visit.attempts, 3);
    assert_eq!(task.runs, 3);
    assert_eq!(session.driver().count(|e| matches!(e, DriverEvent::OpenTab(_))), 3);
    assert_eq!(session.driver().open_tabs(), 0);
}

#[tokio::test(start_paused = true)]
async fn single_attempt_policy_does_not_back_off() {
    let driver = ScriptedDriver::new().with_failing_url(URL, NavOutcome::Fail("boom".to_owned()));
    let mut session = started(driver, bounded(1)).await;

    let start = tokio::time::Instant::now();
    let err = session.visit(URL, None, &mut LandedUrl).await.expect_err("fails");

    assert!(matches!(err, ScraperError::AttemptsExhausted { attempts: 1, .. }));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn visit_without_context_fails_until_limit() {
    let mut session = PageSession::new(ScriptedDriver::new(), bounded(2));

    let err = session.visit(URL, None, &mut LandedUrl).await.expect_err("no context");

    match err {
        ScraperError::AttemptsExhausted { last_error, .. } => {
            assert_eq!(last_error, ScraperError::NoContext.to_string());
        }
        other => panic!("expected AttemptsExhausted, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Resource cleanup
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn end_cycle_reclaims_tabs_that_failed_to_close() {
    let driver = ScriptedDriver::new().leaking_tabs();
    let mut session = started(driver, SessionPolicy::default()).await;

    session.visit(URL, None, &mut LandedUrl).await.expect("visit succeeds");
    session.visit(URL, None, &mut LandedUrl).await.expect("visit succeeds");
    assert_eq!(session.driver().open_tabs(), 2);

    let reclaimed = session.end_cycle().await.expect("cycle ends");
    assert_eq!(reclaimed, 2);
    assert_eq!(session.driver().open_tabs(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_everything() {
    let mut session = started(ScriptedDriver::new(), SessionPolicy::default()).await;

    session.shutdown().await.expect("shutdown succeeds");

    assert!(!session.driver().context_open());
    assert_eq!(session.driver().events().last(), Some(&DriverEvent::Shutdown));
}
