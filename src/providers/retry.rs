use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

const MAX_ATTEMPTS: usize = 5;
const BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Transport-level throttling, as opposed to a semantic failure of the call.
pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("resource_exhausted")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("overloaded")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

/// Exponential backoff state for one request.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    attempt: usize,
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self {
            attempt: 0,
            delay: BASE_DELAY,
        }
    }

    pub(crate) fn start_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Wait before the next attempt, or `None` when attempts are used up.
    pub(crate) fn next_wait(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        if self.attempt >= MAX_ATTEMPTS {
            return None;
        }
        let wait = retry_after.map_or(self.delay, |hint| hint.max(self.delay));
        self.delay = (self.delay * 2).min(MAX_DELAY);
        Some(wait)
    }

    pub(crate) async fn wait(&self, label: &str, wait: Duration) {
        warn!(
            "{} rate limited; retrying in {:.1}s (attempt {}/{})",
            label,
            wait.as_secs_f32(),
            self.attempt,
            MAX_ATTEMPTS
        );
        sleep(wait).await;
    }
}
