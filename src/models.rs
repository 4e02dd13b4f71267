use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One catalog entry as stored in the `games` table. The app id is the
/// sole identity; re-scraping the same id overwrites the row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GameRecord {
    pub app_id: String,
    pub name: String,
    pub developer: String,
    pub publisher: String,
    pub release_date: String,
    pub full_description: String,
    pub short_description: String,
    pub price: f64,
    pub system_requirements: String,
    pub supported_languages: String,
    pub user_rating: Option<f64>,
    pub review_count: i64,
    pub source_url: String,
    pub header_image: String,
    pub screenshot1: String,
    pub screenshot2: String,
    pub screenshot3: String,
    pub screenshot4: String,
    pub screenshot5: String,
    pub last_updated: DateTime<Utc>,
}

impl GameRecord {
    /// A record pre-filled with the safe defaults every field falls back
    /// to when its selector is missing from the page.
    pub fn with_defaults(app_id: String, source_url: String) -> Self {
        Self {
            app_id,
            name: "Unknown".to_string(),
            developer: "Unknown".to_string(),
            publisher: "Unknown".to_string(),
            release_date: "Unknown".to_string(),
            full_description: String::new(),
            short_description: String::new(),
            price: 0.0,
            system_requirements: String::new(),
            supported_languages: String::new(),
            user_rating: None,
            review_count: 0,
            source_url,
            header_image: String::new(),
            screenshot1: String::new(),
            screenshot2: String::new(),
            screenshot3: String::new(),
            screenshot4: String::new(),
            screenshot5: String::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn set_screenshots(&mut self, urls: &[String]) {
        let slots = [
            &mut self.screenshot1,
            &mut self.screenshot2,
            &mut self.screenshot3,
            &mut self.screenshot4,
            &mut self.screenshot5,
        ];
        for (slot, url) in slots.into_iter().zip(urls.iter()) {
            *slot = url.clone();
        }
    }

    /// Value-level equality across every field except `last_updated`,
    /// used for update detection on upsert.
    pub fn content_eq(&self, other: &Self) -> bool {
        self.app_id == other.app_id
            && self.name == other.name
            && self.developer == other.developer
            && self.publisher == other.publisher
            && self.release_date == other.release_date
            && self.full_description == other.full_description
            && self.short_description == other.short_description
            && self.price == other.price
            && self.system_requirements == other.system_requirements
            && self.supported_languages == other.supported_languages
            && self.user_rating == other.user_rating
            && self.review_count == other.review_count
            && self.source_url == other.source_url
            && self.header_image == other.header_image
            && self.screenshot1 == other.screenshot1
            && self.screenshot2 == other.screenshot2
            && self.screenshot3 == other.screenshot3
            && self.screenshot4 == other.screenshot4
            && self.screenshot5 == other.screenshot5
    }
}

/// The reduced row shape returned by the date-range search.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GameSummary {
    pub app_id: String,
    pub name: String,
    pub developer: String,
    pub publisher: String,
    pub release_date: String,
    pub price: f64,
}

/// One store file discovered by database enumeration.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub game_count: i64,
    pub size_bytes: u64,
}

/// Snapshot published on the orchestrator's progress channel after every
/// state change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressState {
    pub active: bool,
    pub current_item: String,
    pub progress_percent: u8,
    pub total_count: usize,
    pub existing_count: usize,
    pub scraped_count: usize,
    pub status_message: String,
}

/// Outcome of a completed scrape run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub discovered: usize,
    pub scraped: usize,
    pub failed: usize,
}
