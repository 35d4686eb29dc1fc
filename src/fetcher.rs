//! HTTP fetching with retry, exponential backoff and adaptive pacing.
//!
//! Each [`HttpFetcher`] owns its own connection pool and its own
//! [`AdaptiveDelay`], so one struggling host slowing down never throttles
//! requests made through another fetcher.

use crate::config::FetchConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Something that can return the HTML of a page.
///
/// The orchestrator and the pagination discoverer only depend on this,
/// which lets tests substitute canned pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches a page body, retrying transient failures up to `max_retries` attempts.
    async fn fetch_page(
        &self,
        url: &str,
        max_retries: u32,
        silent: bool,
    ) -> Result<String, FetchError>;
}

/// Inter-request delay that grows under sustained transient failure.
///
/// Every transient failure extends the error streak. Once the streak
/// reaches the threshold, each further failure raises the delay by one
/// increment up to the maximum. A success clears the streak and relaxes
/// the delay one step back towards the base.
#[derive(Debug, Clone)]
pub struct AdaptiveDelay {
    base: Duration,
    max: Duration,
    increment: Duration,
    relax_step: Duration,
    threshold: u32,
    current: Duration,
    peak: Duration,
    streak: u32,
}

impl AdaptiveDelay {
    /// Creates a delay starting at the configured base.
    pub fn new(config: &FetchConfig) -> Self {
        let base = Duration::from_millis(config.base_delay_ms);
        Self {
            base,
            max: Duration::from_millis(config.max_delay_ms).max(base),
            increment: Duration::from_millis(config.delay_increment_ms),
            relax_step: Duration::from_millis(config.relax_step_ms),
            threshold: config.error_threshold.max(1),
            current: base,
            peak: base,
            streak: 0,
        }
    }

    /// Delay applied before the next request.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Highest delay reached so far.
    pub fn peak(&self) -> Duration {
        self.peak
    }

    /// Consecutive transient failures.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Records a transient failure.
    pub fn record_failure(&mut self) {
        self.streak += 1;
        if self.streak >= self.threshold {
            self.current = (self.current + self.increment).min(self.max);
            self.peak = self.peak.max(self.current);
        }
    }

    /// Records a success.
    pub fn record_success(&mut self) {
        self.streak = 0;
        self.current = self.current.saturating_sub(self.relax_step).max(self.base);
    }
}

/// How a single attempt ended.
enum Attempt {
    Body(String),
    Transient(String),
    Permanent(FetchError),
}

/// HTTP client with retry and adaptive delay.
pub struct HttpFetcher {
    client: reqwest::Client,
    /// Same headers, brotli disabled. Used when a body comes back suspiciously short.
    narrow_client: reqwest::Client,
    config: FetchConfig,
    delay: Mutex<AdaptiveDelay>,
}

impl HttpFetcher {
    /// Creates a fetcher with its own connection pool.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::with_base_delay(config, Duration::from_millis(config.base_delay_ms))
    }

    /// Creates a fetcher whose pacing starts from a different base delay.
    ///
    /// Used for short-lived probe fetchers.
    pub fn with_base_delay(config: &FetchConfig, base: Duration) -> Result<Self, FetchError> {
        let mut config = config.clone();
        config.base_delay_ms = base.as_millis() as u64;
        config.max_delay_ms = config.max_delay_ms.max(config.base_delay_ms);

        let client = build_client(&config, false)?;
        let narrow_client = build_client(&config, true)?;

        Ok(Self {
            client,
            narrow_client,
            delay: Mutex::new(AdaptiveDelay::new(&config)),
            config,
        })
    }

    /// Fetches a page with the configured retry budget.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with(url, self.config.max_retries, false).await
    }

    /// Fetches a page, retrying transient failures up to `max_retries` attempts.
    ///
    /// `silent` lowers retry diagnostics to debug level; probe fetches use it.
    pub async fn fetch_with(
        &self,
        url: &str,
        max_retries: u32,
        silent: bool,
    ) -> Result<String, FetchError> {
        let attempts = max_retries.max(1);
        let mut last = String::new();

        for attempt in 0..attempts {
            tokio::time::sleep(self.current_delay()).await;

            match self.attempt(&self.client, url).await {
                Attempt::Body(body) => {
                    self.with_delay(AdaptiveDelay::record_success);
                    let body = self.recheck_short_body(url, body).await;
                    return Ok(body);
                }
                Attempt::Permanent(err) => {
                    debug!("Permanent failure for {}: {}", url, err);
                    return Err(err);
                }
                Attempt::Transient(reason) => {
                    self.with_delay(AdaptiveDelay::record_failure);
                    last = reason;

                    if attempt + 1 < attempts {
                        let wait = self.backoff(attempt);
                        if silent {
                            debug!(
                                "{} for {}, retrying in {:?} (attempt {}/{})",
                                last,
                                url,
                                wait,
                                attempt + 1,
                                attempts
                            );
                        } else {
                            warn!(
                                "{} for {}, retrying in {:?} (attempt {}/{})",
                                last,
                                url,
                                wait,
                                attempt + 1,
                                attempts
                            );
                        }
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last,
        })
    }

    /// Delay applied before the next request.
    pub fn current_delay(&self) -> Duration {
        self.read_delay(|d| d.current())
    }

    /// Highest delay this fetcher has reached.
    pub fn peak_delay(&self) -> Duration {
        self.read_delay(|d| d.peak())
    }

    /// Consecutive transient failures seen by this fetcher.
    pub fn error_streak(&self) -> u32 {
        self.read_delay(|d| d.streak())
    }

    /// Releases the connection pools.
    pub fn close(self) {
        debug!(
            "Closing fetcher (final delay {:?}, peak {:?})",
            self.current_delay(),
            self.peak_delay()
        );
    }

    async fn attempt(&self, client: &reqwest::Client, url: &str) -> Attempt {
        debug!("GET {}", url);

        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Attempt::Permanent(FetchError::Client(e)),
            Err(e) => return Attempt::Transient(describe_transport_error(&e)),
        };

        let status = response.status();
        if status.is_success() {
            return match response.text().await {
                Ok(body) => Attempt::Body(body),
                Err(e) => Attempt::Transient(describe_transport_error(&e)),
            };
        }

        if status == StatusCode::NOT_FOUND {
            return Attempt::Permanent(FetchError::NotFound {
                url: url.to_string(),
            });
        }

        if is_transient_status(status) {
            return Attempt::Transient(format!("HTTP {}", status.as_u16()));
        }

        Attempt::Permanent(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }

    /// Re-requests a short body once without brotli; keeps whichever body is longer.
    async fn recheck_short_body(&self, url: &str, body: String) -> String {
        if body.len() >= self.config.min_body_bytes {
            return body;
        }

        debug!(
            "Short body ({} bytes) from {}, re-requesting with narrowed Accept-Encoding",
            body.len(),
            url
        );

        match self.attempt(&self.narrow_client, url).await {
            Attempt::Body(retry) if retry.len() > body.len() => retry,
            _ => body,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let wait = self.config.retry_base_ms.saturating_mul(factor);
        Duration::from_millis(wait.min(self.config.retry_max_ms))
    }

    fn with_delay(&self, update: impl FnOnce(&mut AdaptiveDelay)) {
        let mut delay = match self.delay.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = delay.current();
        update(&mut delay);
        if delay.current() > before {
            warn!(
                "Server struggling ({} consecutive errors), slowing down to {:?}",
                delay.streak(),
                delay.current()
            );
        }
    }

    fn read_delay<T>(&self, read: impl FnOnce(&AdaptiveDelay) -> T) -> T {
        match self.delay.lock() {
            Ok(guard) => read(&guard),
            Err(poisoned) => read(&poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch_page(
        &self,
        url: &str,
        max_retries: u32,
        silent: bool,
    ) -> Result<String, FetchError> {
        self.fetch_with(url, max_retries, silent).await
    }
}

fn build_client(config: &FetchConfig, narrow: bool) -> Result<reqwest::Client, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    if let Ok(language) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, language);
    }

    let builder = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .cookie_store(true)
        .timeout(config.timeout());

    let builder = if narrow { builder.no_brotli() } else { builder };

    Ok(builder.build()?)
}

/// 5xx plus request timeout and rate limiting.
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timed out".to_string()
    } else if e.is_connect() {
        "Connection failed".to_string()
    } else {
        format!("Transport error: {}", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FetchConfig {
        FetchConfig {
            base_delay_ms: 1000,
            max_delay_ms: 2200,
            delay_increment_ms: 500,
            relax_step_ms: 100,
            error_threshold: 3,
            ..FetchConfig::default()
        }
    }

    #[test]
    fn test_delay_unchanged_below_threshold() {
        let mut delay = AdaptiveDelay::new(&config());
        delay.record_failure();
        delay.record_failure();
        assert_eq!(delay.current(), Duration::from_millis(1000));
        assert_eq!(delay.streak(), 2);
    }

    #[test]
    fn test_delay_grows_past_threshold_and_caps() {
        let mut delay = AdaptiveDelay::new(&config());
        let mut previous = delay.current();

        for n in 1..=10 {
            delay.record_failure();
            if n >= 3 && previous < Duration::from_millis(2200) {
                assert!(delay.current() > previous, "failure {} did not raise delay", n);
            }
            assert!(delay.current() <= Duration::from_millis(2200));
            previous = delay.current();
        }

        assert_eq!(delay.current(), Duration::from_millis(2200));
        assert_eq!(delay.peak(), Duration::from_millis(2200));
    }

    #[test]
    fn test_delay_relaxes_towards_base() {
        let mut delay = AdaptiveDelay::new(&config());
        for _ in 0..3 {
            delay.record_failure();
        }
        assert_eq!(delay.current(), Duration::from_millis(1500));

        delay.record_success();
        assert_eq!(delay.streak(), 0);
        assert_eq!(delay.current(), Duration::from_millis(1400));

        for _ in 0..20 {
            delay.record_success();
        }
        assert_eq!(delay.current(), Duration::from_millis(1000));
        assert_eq!(delay.peak(), Duration::from_millis(1500));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = FetchConfig {
            retry_base_ms: 2000,
            retry_max_ms: 30_000,
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        assert_eq!(fetcher.backoff(0), Duration::from_secs(2));
        assert_eq!(fetcher.backoff(2), Duration::from_secs(8));
        assert_eq!(fetcher.backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }
}
