use crate::database::Database;
use crate::error::Result;
use crate::models::GameRecord;
use serde::Serialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// One export row: the full record joined with its aggregated tag text.
#[derive(Debug, Serialize)]
struct ExportRow {
    #[serde(flatten)]
    game: GameRecord,
    tags: String,
}

/// Export every stored row.
pub async fn export_all<P: AsRef<Path>>(
    db: &Database,
    output: P,
    format: ExportFormat,
) -> Result<usize> {
    let games = db.all_games().await?;
    export_games(db, games, output, format).await
}

/// Export only the given app ids; unknown ids are silently skipped.
pub async fn export_selection<P: AsRef<Path>>(
    db: &Database,
    app_ids: &[String],
    output: P,
    format: ExportFormat,
) -> Result<usize> {
    let games = db.games_by_ids(app_ids).await?;
    export_games(db, games, output, format).await
}

async fn export_games<P: AsRef<Path>>(
    db: &Database,
    games: Vec<GameRecord>,
    output: P,
    format: ExportFormat,
) -> Result<usize> {
    let mut rows = Vec::with_capacity(games.len());
    for game in games {
        let tags = db.get_tags(&game.app_id).await?.join(",");
        rows.push(ExportRow { game, tags });
    }

    match format {
        ExportFormat::Csv => write_csv(output.as_ref(), &rows)?,
        ExportFormat::Json => write_json(output.as_ref(), &rows)?,
    }

    info!("Exported {} games to {}", rows.len(), output.as_ref().display());
    Ok(rows.len())
}

const CSV_HEADER: [&str; 21] = [
    "app_id",
    "name",
    "developer",
    "publisher",
    "release_date",
    "full_description",
    "short_description",
    "price",
    "system_requirements",
    "supported_languages",
    "user_rating",
    "review_count",
    "source_url",
    "header_image",
    "screenshot1",
    "screenshot2",
    "screenshot3",
    "screenshot4",
    "screenshot5",
    "last_updated",
    "tags",
];

fn write_csv(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        let game = &row.game;
        writer.write_record([
            game.app_id.as_str(),
            game.name.as_str(),
            game.developer.as_str(),
            game.publisher.as_str(),
            game.release_date.as_str(),
            game.full_description.as_str(),
            game.short_description.as_str(),
            &game.price.to_string(),
            game.system_requirements.as_str(),
            game.supported_languages.as_str(),
            &game
                .user_rating
                .map(|r| r.to_string())
                .unwrap_or_default(),
            &game.review_count.to_string(),
            game.source_url.as_str(),
            game.header_image.as_str(),
            game.screenshot1.as_str(),
            game.screenshot2.as_str(),
            game.screenshot3.as_str(),
            game.screenshot4.as_str(),
            game.screenshot5.as_str(),
            &game.last_updated.to_rfc3339(),
            row.tags.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, rows)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seeded_db(dir: &TempDir) -> Database {
        let db = Database::new(dir.path().join("export.db")).await.unwrap();
        db.init().await.unwrap();

        for (id, name) in [("1", "Alpha"), ("2", "Beta")] {
            let mut record = GameRecord::with_defaults(
                id.to_string(),
                format!("https://store.steampowered.com/app/{id}/x/"),
            );
            record.name = name.to_string();
            let tags = vec!["Indie".to_string(), "Co-op".to_string()];
            db.upsert_game(&record, &tags).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn json_export_includes_tags() {
        let dir = TempDir::new().unwrap();
        let db = seeded_db(&dir).await;

        let out = dir.path().join("all.json");
        let count = export_all(&db, &out, ExportFormat::Json).await.unwrap();
        assert_eq!(count, 2);

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["name"], "Alpha");
        assert_eq!(parsed[0]["tags"], "Indie,Co-op");
    }

    #[tokio::test]
    async fn csv_export_writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let db = seeded_db(&dir).await;

        let out = dir.path().join("all.csv");
        export_all(&db, &out, ExportFormat::Csv).await.unwrap();

        let content = std::fs::read_to_string(&out).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("app_id,name,developer"));
        assert_eq!(lines.count(), 2);
    }

    #[tokio::test]
    async fn selection_export_skips_unknown_ids() {
        let dir = TempDir::new().unwrap();
        let db = seeded_db(&dir).await;

        let out = dir.path().join("sel.json");
        let ids = vec!["2".to_string(), "999".to_string()];
        let count = export_selection(&db, &ids, &out, ExportFormat::Json)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
