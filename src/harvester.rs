use crate::config::HarvesterConfig;
use crate::error::Result;
use crate::utils::{app_id_from_url, HttpClient};
use scraper::{Html, Selector};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A catalog index page that loads more entries on demand, the way the
/// storefront's infinitely-scrolling search does. Abstracted so the
/// discovery loop can run against a simulated index in tests.
#[async_trait::async_trait]
pub trait IndexSource: Send {
    /// Trigger additional content to load.
    async fn load_more(&mut self) -> Result<()>;

    /// Every item link currently visible, duplicates included.
    fn visible_links(&self) -> Vec<String>;

    /// Declared total catalog size, when the index page exposes one.
    fn total_hint(&self) -> Option<usize>;
}

/// Pages through the storefront search results over plain HTTP,
/// accumulating result rows as a scrolled page would.
pub struct HttpIndexSource {
    http: HttpClient,
    base_url: String,
    next_page: u32,
    max_pages: u32,
    links: Vec<String>,
    total_hint: Option<usize>,
}

impl HttpIndexSource {
    pub fn new(http: HttpClient, base_url: impl Into<String>, max_pages: u32) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            next_page: 1,
            max_pages,
            links: Vec::new(),
            total_hint: None,
        }
    }

    fn page_url(&self) -> String {
        if self.next_page == 1 {
            self.base_url.clone()
        } else if self.base_url.contains('?') {
            format!("{}&page={}", self.base_url, self.next_page)
        } else {
            format!("{}?page={}", self.base_url, self.next_page)
        }
    }
}

#[async_trait::async_trait]
impl IndexSource for HttpIndexSource {
    async fn load_more(&mut self) -> Result<()> {
        if self.next_page > self.max_pages {
            // Page budget exhausted; the stagnation counter winds down.
            return Ok(());
        }

        let url = self.page_url();
        let body = self.http.fetch_page(&url).await?;
        self.next_page += 1;

        let document = Html::parse_document(&body);
        let row_selector = Selector::parse("a.search_result_row").unwrap();
        for row in document.select(&row_selector) {
            if let Some(href) = row.value().attr("href") {
                self.links.push(href.to_string());
            }
        }

        let count_selector = Selector::parse(".search_results_count").unwrap();
        if let Some(element) = document.select(&count_selector).next() {
            let digits: String = element
                .text()
                .collect::<String>()
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect();
            if let Ok(total) = digits.parse::<usize>() {
                self.total_hint = Some(total);
            }
        }

        Ok(())
    }

    fn visible_links(&self) -> Vec<String> {
        self.links.clone()
    }

    fn total_hint(&self) -> Option<usize> {
        self.total_hint
    }
}

/// Drives the scrolling discovery loop until it converges: five
/// consecutive iterations without a new link, the declared catalog total
/// being covered, or cancellation.
pub struct LinkHarvester {
    max_stalled: u32,
}

impl LinkHarvester {
    pub fn new(config: &HarvesterConfig) -> Self {
        Self {
            max_stalled: config.max_stalled_iterations,
        }
    }

    /// Collect detail-page links whose app id is not already stored.
    /// Errors end the loop with whatever was discovered so far; partial
    /// progress is preserved. The returned order is first-seen order and
    /// deterministic for a given source.
    pub async fn harvest(
        &self,
        source: &mut dyn IndexSource,
        existing: &HashSet<String>,
        cancel: &CancellationToken,
    ) -> Vec<String> {
        let mut discovered: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut last_count = 0usize;
        let mut stalled = 0u32;

        info!("Found {} existing games in database", existing.len());

        loop {
            if cancel.is_cancelled() {
                info!("Harvest cancelled, keeping {} links", discovered.len());
                break;
            }

            if let Err(e) = source.load_more().await {
                warn!("Error while loading catalog index: {}", e);
                break;
            }

            for link in source.visible_links() {
                if let Some(app_id) = app_id_from_url(&link) {
                    if !existing.contains(&app_id) && seen.insert(app_id) {
                        discovered.push(link);
                    }
                }
            }

            let total_known = discovered.len() + existing.len();
            info!(
                "Found {} new games (Total with existing: {})",
                discovered.len(),
                total_known
            );

            if discovered.len() == last_count {
                stalled += 1;
                if stalled >= self.max_stalled {
                    info!("No new games found after multiple attempts, stopping...");
                    break;
                }
            } else {
                stalled = 0;
            }
            last_count = discovered.len();

            if let Some(total) = source.total_hint() {
                if total_known >= total {
                    info!("Reached total number of available games ({})", total);
                    break;
                }
            }
        }

        info!("Final collection: {} new games to scrape", discovered.len());
        discovered
    }
}
