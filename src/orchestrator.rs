use crate::config::Config;
use crate::database::Database;
use crate::error::{Result, VaultError};
use crate::extractor::DetailExtractor;
use crate::harvester::{HttpIndexSource, LinkHarvester};
use crate::models::{ProgressState, RunSummary};
use crate::utils::HttpClient;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Composes harvesting and extraction into one end-to-end run and owns
/// the state the outside world observes: a watch channel of
/// `ProgressState` snapshots and a cancellation token checked between
/// items. One run at a time; a second start while active is rejected.
pub struct Orchestrator {
    config: Config,
    progress: watch::Sender<ProgressState>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let initial = ProgressState {
            status_message: "Ready".to_string(),
            ..ProgressState::default()
        };
        let (progress, _) = watch::channel(initial);
        Self {
            config,
            progress,
            cancel: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.progress.subscribe()
    }

    /// Cooperative stop: the in-flight item completes, then the run winds
    /// down.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn publish<F: FnOnce(&mut ProgressState)>(&self, update: F) {
        self.progress.send_modify(update);
    }

    pub async fn run(&self, index_url: &str, database: &str) -> Result<RunSummary> {
        if index_url.trim().is_empty() {
            return Err(VaultError::configuration("index URL must not be empty"));
        }
        if database.trim().is_empty() {
            return Err(VaultError::configuration("database name must not be empty"));
        }
        if self.progress.borrow().active {
            return Err(VaultError::configuration(
                "a scrape run is already in progress",
            ));
        }

        let path = self.database_path(database);
        self.publish(|s| {
            s.active = true;
            s.progress_percent = 0;
            s.scraped_count = 0;
            s.status_message = "Initializing scraper...".to_string();
        });

        match self.run_inner(index_url, path).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                self.publish(|s| {
                    s.active = false;
                    s.status_message = format!("Error: {e}");
                });
                Err(e)
            }
        }
    }

    async fn run_inner(&self, index_url: &str, path: PathBuf) -> Result<RunSummary> {
        let db = Database::new(&path).await?;
        db.init().await?;

        let existing = db.existing_app_ids().await?;
        self.publish(|s| {
            s.existing_count = existing.len();
            s.status_message = "Collecting game links...".to_string();
        });

        let http = HttpClient::new(&self.config.scraper);
        let mut source = HttpIndexSource::new(
            http.clone(),
            index_url,
            self.config.harvester.max_pages,
        );
        let harvester = LinkHarvester::new(&self.config.harvester);
        let links = harvester.harvest(&mut source, &existing, &self.cancel).await;

        let total_with_existing = links.len() + existing.len();
        self.publish(|s| {
            s.total_count = total_with_existing;
        });

        let mut summary = RunSummary {
            discovered: links.len(),
            ..RunSummary::default()
        };

        if links.is_empty() {
            // Distinct terminal state, not an error.
            self.publish(|s| {
                s.active = false;
                s.progress_percent = 100;
                s.status_message = "No new games found to scrape.".to_string();
            });
            info!("No new games found to scrape");
            return Ok(summary);
        }

        let extractor = DetailExtractor::new(http);
        let item_delay = Duration::from_secs(self.config.scraper.item_delay_secs);
        let mut stopped = false;

        for (i, link) in links.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Scraping stopped by user");
                stopped = true;
                break;
            }

            let label = format!("Game {} of {}", i + 1, links.len());
            self.publish(|s| {
                s.current_item = label.clone();
                s.progress_percent = (i * 100 / links.len()) as u8;
                s.status_message = format!("Scraping: {label}");
            });

            match extractor.extract(link, &db).await {
                Ok(record) => {
                    summary.scraped += 1;
                    info!("Successfully scraped: {}", record.name);
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("Failed to scrape {}: {}", link, e);
                }
            }

            self.publish(|s| {
                s.scraped_count = summary.scraped;
                s.progress_percent = ((i + 1) * 100 / links.len()) as u8;
            });

            tokio::time::sleep(item_delay).await;
        }

        let message = if stopped {
            format!(
                "Stopped. Scraped {} of {} new games.",
                summary.scraped, summary.discovered
            )
        } else {
            format!(
                "Completed! Scraped {} of {} new games.",
                summary.scraped, summary.discovered
            )
        };
        self.publish(|s| {
            s.active = false;
            s.progress_percent = 100;
            s.status_message = message.clone();
        });
        info!("{}", message);

        Ok(summary)
    }

    fn database_path(&self, name: &str) -> PathBuf {
        let file = if name.ends_with(".db") {
            name.to_string()
        } else {
            format!("{name}.db")
        };
        PathBuf::from(&self.config.database.dir).join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.database.dir = dir.path().to_string_lossy().to_string();
        config.scraper.retry_attempts = 2;
        config.scraper.retry_delay_secs = 0;
        config.scraper.item_delay_secs = 0;
        config
    }

    #[tokio::test]
    async fn empty_inputs_never_start_a_run() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(test_config(&dir));

        assert!(matches!(
            orchestrator.run("", "games").await,
            Err(VaultError::Configuration(_))
        ));
        assert!(matches!(
            orchestrator.run("https://example.com", "   ").await,
            Err(VaultError::Configuration(_))
        ));
        assert!(!orchestrator.subscribe().borrow().active);
    }

    #[tokio::test]
    async fn full_run_scrapes_discovered_items() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;

        let index_body = format!(
            r#"<div class="search_results_count">2 results</div>
               <a class="search_result_row" href="{base}/app/1/One/"></a>
               <a class="search_result_row" href="{base}/app/2/Two/"></a>"#,
            base = server.url()
        );
        server
            .mock("GET", "/search")
            .with_status(200)
            .with_body(index_body)
            .create_async()
            .await;
        server
            .mock("GET", "/app/1/One/")
            .with_status(200)
            .with_body(r#"<div class="apphub_AppName">One</div>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/app/2/Two/")
            .with_status(200)
            .with_body(r#"<div class="apphub_AppName">Two</div>"#)
            .create_async()
            .await;

        let orchestrator = Orchestrator::new(test_config(&dir));
        let index_url = format!("{}/search", server.url());
        let summary = orchestrator.run(&index_url, "run_test").await.unwrap();

        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.scraped, 2);
        assert_eq!(summary.failed, 0);

        let state = orchestrator.subscribe().borrow().clone();
        assert!(!state.active);
        assert_eq!(state.progress_percent, 100);
        assert!(state.status_message.starts_with("Completed!"));

        let db = Database::open_existing(dir.path().join("run_test.db"))
            .await
            .unwrap();
        assert_eq!(db.count_games().await.unwrap(), 2);
        assert_eq!(db.get_game("1").await.unwrap().unwrap().name, "One");
    }

    #[tokio::test]
    async fn per_item_failures_do_not_abort_the_run() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;

        let index_body = format!(
            r#"<div class="search_results_count">2 results</div>
               <a class="search_result_row" href="{base}/app/1/One/"></a>
               <a class="search_result_row" href="{base}/app/2/Two/"></a>"#,
            base = server.url()
        );
        server
            .mock("GET", "/search")
            .with_status(200)
            .with_body(index_body)
            .create_async()
            .await;
        server
            .mock("GET", "/app/1/One/")
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;
        server
            .mock("GET", "/app/2/Two/")
            .with_status(200)
            .with_body(r#"<div class="apphub_AppName">Two</div>"#)
            .create_async()
            .await;

        let orchestrator = Orchestrator::new(test_config(&dir));
        let index_url = format!("{}/search", server.url());
        let summary = orchestrator.run(&index_url, "skip_test").await.unwrap();

        assert_eq!(summary.scraped, 1);
        assert_eq!(summary.failed, 1);

        let db = Database::open_existing(dir.path().join("skip_test.db"))
            .await
            .unwrap();
        assert_eq!(db.count_games().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_run_reports_no_new_games() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(test_config(&dir));
        orchestrator.stop();

        // Harvest observes cancellation before the first fetch, so the
        // unreachable index URL is never contacted.
        let summary = orchestrator
            .run("http://127.0.0.1:1/search", "cancel_test")
            .await
            .unwrap();

        assert_eq!(summary.discovered, 0);
        let state = orchestrator.subscribe().borrow().clone();
        assert!(!state.active);
        assert_eq!(state.status_message, "No new games found to scrape.");
    }
}
