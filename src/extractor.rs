use crate::database::Database;
use crate::error::{Result, VaultError};
use crate::models::GameRecord;
use crate::utils::{app_id_from_url, HttpClient};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

const CDN_ASSET_BASE: &str =
    "https://shared.cloudflare.steamstatic.com/store_item_assets/steam/apps";

/// Fetches one detail page and derives a structured record from it.
/// Every field falls back to a safe default when its markup is missing;
/// publisher and screenshots go through ordered strategy chains because
/// the storefront renders them in several layouts.
pub struct DetailExtractor {
    http: HttpClient,
}

impl DetailExtractor {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Fetch, parse, and persist one item. Transport failures are retried
    /// by the client; a malformed page aborts without retry. Extraction
    /// is complete only once the record is durably stored.
    pub async fn extract(&self, url: &str, db: &Database) -> Result<GameRecord> {
        let app_id = app_id_from_url(url)
            .ok_or_else(|| VaultError::parse(format!("no app id in URL: {url}")))?;

        let body = self.http.fetch_page(url).await?;
        let (record, tags) = parse_game_page(&body, url, &app_id)?;

        db.upsert_game(&record, &tags).await?;
        info!("Scraped {} ({})", record.name, record.app_id);
        Ok(record)
    }
}

/// Pure page-to-record parsing, separated from transport and persistence
/// so it can be exercised on fixture HTML.
pub(crate) fn parse_game_page(
    html: &str,
    url: &str,
    app_id: &str,
) -> Result<(GameRecord, Vec<String>)> {
    if html.trim().is_empty() {
        return Err(VaultError::parse(format!("empty page body for {url}")));
    }

    let document = Html::parse_document(html);
    let mut record = GameRecord::with_defaults(app_id.to_string(), url.to_string());

    if let Some(name) = text_of(&document, ".apphub_AppName") {
        record.name = name;
    }
    if let Some(developer) = text_of(&document, "#developers_list") {
        record.developer = developer;
    }
    record.publisher = resolve_publisher(&document, &record.developer);

    if let Some(date) = text_of(&document, ".release_date .date") {
        record.release_date = date;
    }
    if let Some(description) = text_of(&document, "#game_area_description") {
        record.full_description = description;
    }
    if let Some(snippet) = text_of(&document, ".game_description_snippet") {
        record.short_description = snippet;
    }

    let screenshots = resolve_screenshots(&document, app_id);
    if screenshots.is_empty() {
        warn!("No screenshots found for {} (App ID: {})", record.name, app_id);
    } else {
        debug!(
            "Found {} screenshots for {} (App ID: {})",
            screenshots.len(),
            record.name,
            app_id
        );
    }
    record.set_screenshots(&screenshots);

    let header = resolve_header_image(&document, app_id);
    if !header.contains("blank.gif") {
        record.header_image = header;
    }

    record.price = extract_price(&document);
    if let Some(sysreq) = text_of(&document, ".sysreq_contents") {
        record.system_requirements = sysreq;
    }
    if let Some(languages) = text_of(&document, "#language_dropdown") {
        record.supported_languages = languages;
    }
    record.user_rating = extract_user_rating(&document);
    record.review_count = extract_review_count(&document);

    let tags = extract_tags(&document);
    Ok((record, tags))
}

fn text_of(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).unwrap();
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn attr_of(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).unwrap();
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

/// Ordered publisher fallback chain; first strategy producing a value
/// wins. When all fail, indie titles usually share developer and
/// publisher, so the resolved developer is the final fallback.
const PUBLISHER_STRATEGIES: [fn(&Html) -> Option<String>; 4] = [
    publisher_from_dev_row,
    publisher_from_details_block,
    publisher_from_link,
    publisher_from_glance_section,
];

fn resolve_publisher(document: &Html, developer: &str) -> String {
    for strategy in PUBLISHER_STRATEGIES {
        if let Some(publisher) = strategy(document) {
            return publisher;
        }
    }
    if developer != "Unknown" {
        developer.to_string()
    } else {
        "Unknown".to_string()
    }
}

/// A labeled "Publisher" row in the primary details block.
fn publisher_from_dev_row(document: &Html) -> Option<String> {
    let row_selector = Selector::parse(".dev_row").unwrap();
    let subtitle_selector = Selector::parse(".subtitle").unwrap();
    let link_selector = Selector::parse("a").unwrap();

    let row = document.select(&row_selector).next()?;
    let subtitle = row.select(&subtitle_selector).next()?;
    if !subtitle
        .text()
        .collect::<String>()
        .to_lowercase()
        .contains("publisher")
    {
        return None;
    }

    if let Some(link) = row.select(&link_selector).next() {
        let name = link.text().collect::<String>().trim().to_string();
        if !name.is_empty() {
            return Some(name);
        }
    }

    let text = row.text().collect::<String>();
    let (_, value) = text.split_once(':')?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// A "Publisher:" label in a secondary details section, with the value
/// on the following text line.
fn publisher_from_details_block(document: &Html) -> Option<String> {
    let block_selector = Selector::parse(".details_block").unwrap();
    for block in document.select(&block_selector) {
        let text = block.text().collect::<String>();
        let lines: Vec<&str> = text.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            if line.contains("Publisher:") && i + 1 < lines.len() {
                let value = lines[i + 1].trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Any link whose target path carries the publisher marker.
fn publisher_from_link(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"a[href*="/publisher/"]"#).unwrap();
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A labeled row inside the alternate summary section.
fn publisher_from_glance_section(document: &Html) -> Option<String> {
    let row_selector = Selector::parse(".glance_ctn .dev_row").unwrap();
    let subtitle_selector = Selector::parse(".subtitle").unwrap();
    let link_selector = Selector::parse("a").unwrap();

    for row in document.select(&row_selector) {
        let Some(subtitle) = row.select(&subtitle_selector).next() else {
            continue;
        };
        if subtitle
            .text()
            .collect::<String>()
            .to_lowercase()
            .contains("publisher")
        {
            if let Some(link) = row.select(&link_selector).next() {
                let name = link.text().collect::<String>().trim().to_string();
                if !name.is_empty() {
                    return Some(name);
                }
            }
        }
    }
    None
}

/// Three independent screenshot strategies, tried in order; the first
/// one yielding at least one URL wins. At most 5 URLs are kept, in
/// discovery order.
fn resolve_screenshots(document: &Html, app_id: &str) -> Vec<String> {
    let strategies: [fn(&Html, &str) -> Vec<String>; 3] = [
        screenshots_from_cdn_images,
        screenshots_from_holder_images,
        screenshots_from_holder_links,
    ];
    for strategy in strategies {
        let found = strategy(document, app_id);
        if !found.is_empty() {
            return found.into_iter().take(5).collect();
        }
    }
    Vec::new()
}

/// Direct image tags matching the CDN URL pattern for this app id.
fn screenshots_from_cdn_images(document: &Html, app_id: &str) -> Vec<String> {
    let pattern = format!("{CDN_ASSET_BASE}/{app_id}/ss_");
    let selector = Selector::parse("img").unwrap();
    document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| src.contains(&pattern) && !src.contains("blank.gif"))
        .map(normalize_screenshot_url)
        .collect()
}

/// Embedded images inside screenshot gallery containers.
fn screenshots_from_holder_images(document: &Html, _app_id: &str) -> Vec<String> {
    let selector = Selector::parse(".screenshot_holder img").unwrap();
    document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| !src.is_empty() && !src.contains("blank.gif"))
        .map(normalize_screenshot_url)
        .collect()
}

/// Gallery containers' link targets (full-size images).
fn screenshots_from_holder_links(document: &Html, _app_id: &str) -> Vec<String> {
    let selector = Selector::parse(".screenshot_holder a").unwrap();
    document
        .select(&selector)
        .filter_map(|link| link.value().attr("href"))
        .filter(|href| !href.is_empty() && !href.contains("blank.gif"))
        .map(|href| href.to_string())
        .collect()
}

/// Thumbnail variants carry a size suffix before the extension; the
/// full-size asset lives at the suffix-free URL.
fn normalize_screenshot_url(url: &str) -> String {
    url.replace(".116x65", "").replace(".600x338", "")
}

fn resolve_header_image(document: &Html, app_id: &str) -> String {
    attr_of(document, ".game_header_image_full", "src")
        .or_else(|| attr_of(document, ".game_header_image", "src"))
        .unwrap_or_else(|| format!("{CDN_ASSET_BASE}/{app_id}/header.jpg"))
}

fn extract_price(document: &Html) -> f64 {
    let Some(text) = text_of(document, ".game_purchase_price") else {
        return 0.0;
    };
    if text.eq_ignore_ascii_case("free") {
        return 0.0;
    }
    text.replace('$', "")
        .replace(',', "")
        .trim()
        .parse()
        .unwrap_or(0.0)
}

fn extract_user_rating(document: &Html) -> Option<f64> {
    text_of(document, ".game_review_summary")
        .and_then(|text| text.replace('%', "").trim().parse().ok())
}

fn extract_review_count(document: &Html) -> i64 {
    let Some(text) = text_of(document, ".review_count") else {
        return 0;
    };
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

fn extract_tags(document: &Html) -> Vec<String> {
    let selector = Selector::parse(".app_tag").unwrap();
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}
