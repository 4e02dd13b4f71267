use crate::dates;
use crate::error::Result;
use crate::models::{DatabaseInfo, GameRecord, GameSummary};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info};

pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening database: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Open an existing store, failing instead of creating one.
    pub async fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(crate::error::VaultError::database_not_found(
                path.display().to_string(),
            ));
        }
        let options = SqliteConnectOptions::new().filename(path);
        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                app_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                developer TEXT NOT NULL,
                publisher TEXT NOT NULL,
                release_date TEXT NOT NULL,
                full_description TEXT NOT NULL DEFAULT '',
                short_description TEXT NOT NULL DEFAULT '',
                price REAL NOT NULL DEFAULT 0,
                system_requirements TEXT NOT NULL DEFAULT '',
                supported_languages TEXT NOT NULL DEFAULT '',
                user_rating REAL,
                review_count INTEGER NOT NULL DEFAULT 0,
                source_url TEXT NOT NULL,
                header_image TEXT NOT NULL DEFAULT '',
                screenshot1 TEXT NOT NULL DEFAULT '',
                screenshot2 TEXT NOT NULL DEFAULT '',
                screenshot3 TEXT NOT NULL DEFAULT '',
                screenshot4 TEXT NOT NULL DEFAULT '',
                screenshot5 TEXT NOT NULL DEFAULT '',
                last_updated DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL,
                tag TEXT NOT NULL,
                FOREIGN KEY (app_id) REFERENCES games (app_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_app_id ON tags (app_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert-or-replace keyed on app id. The row write and the tag
    /// rewrite commit as one transaction; any failure rolls back both.
    /// `last_updated` is refreshed on every write, changed or not.
    pub async fn upsert_game(&self, record: &GameRecord, tags: &[String]) -> Result<()> {
        if let Some(old) = self.get_game(&record.app_id).await? {
            if !old.content_eq(record) {
                info!(
                    "Game {} ({}) has been updated",
                    record.app_id, record.name
                );
                if old.release_date != record.release_date {
                    info!(
                        "Release date changed from '{}' to '{}'",
                        old.release_date, record.release_date
                    );
                }
            }
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO games (
                app_id, name, developer, publisher, release_date,
                full_description, short_description, price,
                system_requirements, supported_languages,
                user_rating, review_count, source_url, header_image,
                screenshot1, screenshot2, screenshot3, screenshot4, screenshot5,
                last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.app_id)
        .bind(&record.name)
        .bind(&record.developer)
        .bind(&record.publisher)
        .bind(&record.release_date)
        .bind(&record.full_description)
        .bind(&record.short_description)
        .bind(record.price)
        .bind(&record.system_requirements)
        .bind(&record.supported_languages)
        .bind(record.user_rating)
        .bind(record.review_count)
        .bind(&record.source_url)
        .bind(&record.header_image)
        .bind(&record.screenshot1)
        .bind(&record.screenshot2)
        .bind(&record.screenshot3)
        .bind(&record.screenshot4)
        .bind(&record.screenshot5)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tags WHERE app_id = ?")
            .bind(&record.app_id)
            .execute(&mut *tx)
            .await?;

        for tag in tags {
            sqlx::query("INSERT INTO tags (app_id, tag) VALUES (?, ?)")
                .bind(&record.app_id)
                .bind(tag)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_game(&self, app_id: &str) -> Result<Option<GameRecord>> {
        let game = sqlx::query_as::<_, GameRecord>("SELECT * FROM games WHERE app_id = ?")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(game)
    }

    /// App ids already committed to the store. The harvester uses this to
    /// skip catalog entries that were scraped on earlier runs.
    pub async fn existing_app_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<(String,)> = sqlx::query_as("SELECT app_id FROM games")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    pub async fn count_games(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM games")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn get_tags(&self, app_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT tag FROM tags WHERE app_id = ? ORDER BY id")
                .bind(app_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(tag,)| tag).collect())
    }

    /// Scan all rows in row order and keep those whose free-text release
    /// date falls inside the inclusive query range.
    pub async fn search_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<GameSummary>> {
        let all: Vec<GameSummary> = sqlx::query_as(
            "SELECT app_id, name, developer, publisher, release_date, price
             FROM games ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(all
            .into_iter()
            .filter(|game| dates::is_in_range(&game.release_date, start, end))
            .collect())
    }

    pub async fn all_games(&self) -> Result<Vec<GameRecord>> {
        let games = sqlx::query_as::<_, GameRecord>("SELECT * FROM games ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(games)
    }

    pub async fn games_by_ids(&self, app_ids: &[String]) -> Result<Vec<GameRecord>> {
        let mut games = Vec::with_capacity(app_ids.len());
        for app_id in app_ids {
            if let Some(game) = self.get_game(app_id).await? {
                games.push(game);
            }
        }
        Ok(games)
    }
}

/// Enumerate the `*.db` store files under `dir` with their entry counts
/// and file sizes. Unreadable files are logged and skipped.
pub async fn list_databases<P: AsRef<Path>>(dir: P) -> Result<Vec<DatabaseInfo>> {
    let mut databases = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir.as_ref())?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "db").unwrap_or(false))
        .collect();
    entries.sort();

    for path in entries {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        match Database::open_existing(&path).await {
            Ok(db) => match db.count_games().await {
                Ok(game_count) => databases.push(DatabaseInfo {
                    name,
                    game_count,
                    size_bytes,
                }),
                Err(e) => error!("Error reading database {}: {}", path.display(), e),
            },
            Err(e) => error!("Error opening database {}: {}", path.display(), e),
        }
    }

    Ok(databases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GameRecord;
    use tempfile::TempDir;

    async fn test_db(dir: &TempDir) -> Database {
        let db = Database::new(dir.path().join("test.db")).await.unwrap();
        db.init().await.unwrap();
        db
    }

    fn sample_record(app_id: &str) -> GameRecord {
        let mut record = GameRecord::with_defaults(
            app_id.to_string(),
            format!("https://store.steampowered.com/app/{app_id}/Sample/"),
        );
        record.name = "Sample Game".to_string();
        record.developer = "Sample Dev".to_string();
        record.publisher = "Sample Pub".to_string();
        record.release_date = "16 Oct, 2025".to_string();
        record.price = 19.99;
        record
    }

    #[tokio::test]
    async fn upsert_is_idempotent_except_timestamp() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir).await;
        let record = sample_record("100");
        let tags = vec!["Indie".to_string(), "RPG".to_string()];

        db.upsert_game(&record, &tags).await.unwrap();
        let first = db.get_game("100").await.unwrap().unwrap();

        db.upsert_game(&record, &tags).await.unwrap();
        let second = db.get_game("100").await.unwrap().unwrap();

        assert!(first.content_eq(&second));
        assert!(second.last_updated >= first.last_updated);
        assert_eq!(db.count_games().await.unwrap(), 1);
        assert_eq!(db.get_tags("100").await.unwrap(), tags);
    }

    #[tokio::test]
    async fn tag_rewrite_replaces_stale_tags() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir).await;
        let record = sample_record("200");

        let full = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        db.upsert_game(&record, &full).await.unwrap();
        assert_eq!(db.get_tags("200").await.unwrap().len(), 3);

        let shrunk = vec!["A".to_string()];
        db.upsert_game(&record, &shrunk).await.unwrap();
        assert_eq!(db.get_tags("200").await.unwrap(), shrunk);
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir).await;

        let mut record = sample_record("300");
        db.upsert_game(&record, &[]).await.unwrap();

        record.release_date = "October 2026".to_string();
        record.price = 29.99;
        db.upsert_game(&record, &[]).await.unwrap();

        assert_eq!(db.count_games().await.unwrap(), 1);
        let stored = db.get_game("300").await.unwrap().unwrap();
        assert_eq!(stored.release_date, "October 2026");
        assert_eq!(stored.price, 29.99);
    }

    #[tokio::test]
    async fn existing_ids_reflect_committed_rows() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir).await;

        db.upsert_game(&sample_record("1"), &[]).await.unwrap();
        db.upsert_game(&sample_record("2"), &[]).await.unwrap();

        let ids = db.existing_app_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1"));
        assert!(ids.contains("2"));
    }

    #[tokio::test]
    async fn date_range_search_filters_vague_dates() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir).await;

        let mut inside = sample_record("10");
        inside.release_date = "15 Oct, 2025".to_string();
        let mut month = sample_record("11");
        month.release_date = "October 2025".to_string();
        let mut outside = sample_record("12");
        outside.release_date = "1 Dec, 2025".to_string();
        let mut vague = sample_record("13");
        vague.release_date = "Q4 2025".to_string();

        for record in [&inside, &month, &outside, &vague] {
            db.upsert_game(record, &[]).await.unwrap();
        }

        let start = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 10, 31).unwrap();
        let hits = db.search_by_date_range(start, end).await.unwrap();

        let ids: Vec<&str> = hits.iter().map(|g| g.app_id.as_str()).collect();
        assert_eq!(ids, vec!["10", "11"]);
    }

    #[tokio::test]
    async fn list_databases_reports_counts_and_sizes() {
        let dir = TempDir::new().unwrap();
        let db = test_db(&dir).await;
        db.upsert_game(&sample_record("1"), &[]).await.unwrap();
        db.pool.close().await;

        let infos = list_databases(dir.path()).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "test.db");
        assert_eq!(infos[0].game_count, 1);
        assert!(infos[0].size_bytes > 0);
    }
}
