use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub harvester: HarvesterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory where store files (*.db) live and are enumerated from.
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    /// Total attempts per detail-page fetch, transport failures only.
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    /// Pause between successive detail fetches.
    pub item_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvesterConfig {
    /// Consecutive no-growth iterations before the harvest loop stops.
    pub max_stalled_iterations: u32,
    /// Upper bound on index pages fetched in one run.
    pub max_pages: u32,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig {
                dir: ".".to_string(),
            },
            scraper: ScraperConfig {
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
                retry_attempts: 3,
                retry_delay_secs: 5,
                item_delay_secs: 1,
            },
            harvester: HarvesterConfig {
                max_stalled_iterations: 5,
                max_pages: 200,
            },
        }
    }
}
