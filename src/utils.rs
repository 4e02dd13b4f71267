use crate::config::ScraperConfig;
use crate::error::{Result, VaultError};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Bounded retry with a fixed pause between attempts. Applied to the
/// transport call only; parse failures are never routed through here.
pub async fn with_retry<T, E, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                warn!("Attempt {} of {} failed: {}", attempt, max_attempts, e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("Attempt {} of {} failed: {}", attempt, max_attempts, e);
                return Err(e);
            }
        }
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    /// GET a page body, retrying transport failures (timeouts, connection
    /// errors, non-2xx statuses) up to the configured attempt budget.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let attempts = self.retry_attempts;
        with_retry(attempts, self.retry_delay, || self.get_once(url))
            .await
            .map_err(|e| {
                warn!("Giving up on {} after {} attempts: {}", url, attempts, e);
                VaultError::Unreachable {
                    url: url.to_string(),
                    attempts,
                }
            })
    }

    async fn get_once(&self, url: &str) -> std::result::Result<String, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let response = response.error_for_status()?;
        let text = response.text().await?;
        debug!("Fetched {} ({} bytes)", url, text.len());
        Ok(text)
    }
}

/// Stable external identifier from a detail-page URL. Store URLs look
/// like `https://store.steampowered.com/app/<id>/<slug>/`; the id is the
/// second path segment.
pub fn app_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    segments.next()?;
    let id = segments.next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<u32, String> =
            with_retry(3, Duration::ZERO, || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("transient {n}"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_at_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: std::result::Result<u32, String> =
            with_retry(3, Duration::ZERO, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            })
            .await;
        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn app_id_from_store_url() {
        assert_eq!(
            app_id_from_url("https://store.steampowered.com/app/1091500/Cyberpunk_2077/"),
            Some("1091500".to_string())
        );
        assert_eq!(
            app_id_from_url("http://127.0.0.1:8080/app/42/Fixture/"),
            Some("42".to_string())
        );
        assert_eq!(app_id_from_url("not a url"), None);
    }
}
