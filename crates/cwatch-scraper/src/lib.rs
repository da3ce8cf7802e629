pub mod backoff;
pub mod chrome;
pub mod error;
pub mod probe;
pub mod reader;
pub mod sampler;
pub mod session;
pub mod sites;
pub mod tasks;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod verify;

pub use backoff::{RestartReason, SessionPolicy};
pub use chrome::{ChromeDriver, ChromeTab, LaunchProfile};
pub use error::ScraperError;
pub use probe::{wait_for_text, DomProbe, Locator, Probe};
pub use reader::{CounterReader, Reading, ValueReader, DEFAULT_QUERY_TIMEOUT, UNAVAILABLE};
pub use sampler::{
    evaluate_burst, sample_fast, sample_fast_then_stable, sample_stable, sample_until_positive,
    BurstVerdict, FastSampling, RetryPolicy, SampleStatus, SamplingResult, StableSampling,
};
pub use session::{BrowserDriver, PageSession, TabTask, Visit};
pub use sites::{Preparation, SiteProfile};
pub use tasks::{CheckHandle, CounterSnapshot, HandleCheck, SamplingPlan, ScrapeCounters};
pub use verify::{canonicalize, verify_handle, TitleTally, VerifyTiming};
