//! Value readers: one DOM probe pass producing a digit string or the sentinel.

use std::time::Duration;

use async_trait::async_trait;

use crate::probe::{DomProbe, Probe};

/// Marker reported for a probe that produced no usable digits.
pub const UNAVAILABLE: &str = "N/A";

/// Upper bound on a single DOM query before the next strategy is tried.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a single read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reading {
    /// Non-empty ASCII digit string.
    Found(String),
    Unavailable,
}

impl Reading {
    /// Keeps only ASCII digits from `raw`, so `"1,234"` and `"1 234"` both read
    /// as `1234`. Text without digits is [`Reading::Unavailable`].
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            Reading::Unavailable
        } else {
            Reading::Found(digits)
        }
    }

    /// The digit string, or [`UNAVAILABLE`].
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Reading::Found(value) => value,
            Reading::Unavailable => UNAVAILABLE,
        }
    }

    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Reading::Found(_))
    }

    /// Parsed count; `None` for the sentinel or a value too large for `i64`.
    #[must_use]
    pub fn count(&self) -> Option<i64> {
        match self {
            Reading::Found(value) => value.parse().ok(),
            Reading::Unavailable => None,
        }
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One probe pass against a page. Never fails: DOM errors map to
/// [`Reading::Unavailable`].
#[async_trait]
pub trait ValueReader<P: ?Sized + Sync>: Send + Sync {
    async fn read(&self, page: &P) -> Reading;
}

/// Tries an ordered list of probes; the first one yielding digits wins.
///
/// Each query is bounded by `query_timeout`. A query that does not answer in
/// time counts as absent, so a wedged page degrades to
/// [`Reading::Unavailable`] instead of stalling the sampler.
#[derive(Debug, Clone)]
pub struct CounterReader {
    label: &'static str,
    strategies: Vec<Probe>,
    query_timeout: Duration,
}

impl CounterReader {
    #[must_use]
    pub fn new(label: &'static str, strategies: Vec<Probe>) -> Self {
        Self {
            label,
            strategies,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[must_use]
    pub fn strategies(&self) -> &[Probe] {
        &self.strategies
    }
}

#[async_trait]
impl<P> ValueReader<P> for CounterReader
where
    P: DomProbe + ?Sized,
{
    async fn read(&self, page: &P) -> Reading {
        for (index, probe) in self.strategies.iter().enumerate() {
            match tokio::time::timeout(self.query_timeout, page.query_text(probe)).await {
                Ok(Ok(Some(text))) => {
                    let reading = Reading::from_raw(&text);
                    if reading.is_found() {
                        return reading;
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::debug!(reader = self.label, strategy = index, error = %e, "probe failed");
                }
                Err(_) => {
                    tracing::debug!(
                        reader = self.label,
                        strategy = index,
                        timeout_ms = u64::try_from(self.query_timeout.as_millis()).unwrap_or(u64::MAX),
                        "dom query timed out"
                    );
                }
            }
        }
        Reading::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::testing::ScriptedTab;

    #[test]
    fn from_raw_keeps_digits_only() {
        assert_eq!(Reading::from_raw("1,234"), Reading::Found("1234".to_owned()));
        assert_eq!(Reading::from_raw(" 12 345 "), Reading::Found("12345".to_owned()));
        assert_eq!(Reading::from_raw("N/A"), Reading::Unavailable);
        assert_eq!(Reading::from_raw(""), Reading::Unavailable);
    }

    #[test]
    fn count_parses_and_rejects_overflow() {
        assert_eq!(Reading::Found("42".to_owned()).count(), Some(42));
        assert_eq!(Reading::Unavailable.count(), None);
        assert_eq!(Reading::Found("99999999999999999999999".to_owned()).count(), None);
    }

    #[tokio::test]
    async fn falls_through_to_later_strategies() {
        let first = Probe::all_text(".missing");
        let second = Probe::all_text(".broken");
        let third = Probe::all_text(".present");
        let tab = ScriptedTab::new()
            .with_error(&second, "detached node")
            .with_text(&third, "1.2K 345");

        let reader = CounterReader::new("test", vec![first, second, third]);
        assert_eq!(reader.read(&tab).await, Reading::Found("12345".to_owned()));
    }

    #[tokio::test]
    async fn all_strategies_missing_is_unavailable() {
        let tab = ScriptedTab::new().with_text(&Probe::all_text(".label"), "Followers");
        let reader = CounterReader::new(
            "test",
            vec![Probe::all_text(".label"), Probe::all_text(".nothing")],
        );
        assert_eq!(reader.read(&tab).await, Reading::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_query_falls_through_to_the_next_strategy() {
        let wedged = Probe::all_text(".wedged");
        let present = Probe::all_text(".present");
        let tab = ScriptedTab::new()
            .with_stall(&wedged)
            .with_text(&present, "812");
        let reader = CounterReader::new("test", vec![wedged, present])
            .with_query_timeout(Duration::from_millis(250));

        let started = Instant::now();
        assert_eq!(reader.read(&tab).await, Reading::Found("812".to_owned()));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(250) && waited < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn fully_stalled_page_reads_unavailable() {
        let only = Probe::all_text(".odometer-value");
        let tab = ScriptedTab::new().with_stall(&only);
        let reader = CounterReader::new("test", vec![only]);

        let started = Instant::now();
        assert_eq!(reader.read(&tab).await, Reading::Unavailable);
        let waited = started.elapsed();
        assert!(waited >= DEFAULT_QUERY_TIMEOUT && waited < DEFAULT_QUERY_TIMEOUT * 2);
    }
}
