//! Search-result and chapter-list parsing over fetched HTML.

use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::types::{ChapterListItem, ChapterQuery, Ranking, SeriesResult, SortOrder};

static SERIES_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("div#series-list div.col.no-flag"));
static SERIES_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("a.item-title"));
static SERIES_COVER: LazyLock<Selector> = LazyLock::new(|| selector("a.item-cover > img"));
static PAGE_LINK: LazyLock<Selector> = LazyLock::new(|| selector(".page-link"));
static CHAPTER_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a.chapt"));

static SERIES_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/series/(\d+)/[^/]*").expect("static pattern"));
static CHAPTER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/chapter/(\d+)").expect("static pattern"));
static CHAPTER_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ch(?:ap(?:ter)?)?[\s.]*(\d+(?:\.\d+)?)").expect("static pattern"));
static RELATIVE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+(sec|min|hour|day)s?\s+ago").expect("static pattern"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// One parsed page of search results.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    /// Total result pages advertised by the pagination control, at least 1.
    pub total_pages: usize,
    /// Entries in page order, still `Unranked`.
    pub entries: Vec<SeriesResult>,
}

pub fn parse_search_page(html: &str) -> SearchPage {
    let document = Html::parse_document(html);
    // the pagination control also holds the previous/next buttons
    let total_pages = document.select(&PAGE_LINK).count().saturating_sub(2).max(1);
    let entries = document.select(&SERIES_ITEM).filter_map(parse_series_item).collect();
    SearchPage { total_pages, entries }
}

fn parse_series_item(item: ElementRef<'_>) -> Option<SeriesResult> {
    let title = item.select(&SERIES_TITLE).next()?;
    let href = title.value().attr("href")?;
    let Some(caps) = SERIES_ID.captures(href) else {
        tracing::debug!(href, "search entry without series id");
        return None;
    };
    let cover_url = item
        .select(&SERIES_COVER)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);
    Some(SeriesResult {
        name: clean_text(&title.text().collect::<String>()),
        identifier: caps[1].to_string(),
        cover_url,
        ranking: Ranking::Unranked,
    })
}

/// Ranks results by their position in the concatenated listing.
pub fn assign_rankings(results: &mut [SeriesResult]) {
    for (i, r) in results.iter_mut().enumerate() {
        r.ranking = Ranking::Ranked(i);
    }
}

/// Collapses whitespace runs, decodes a stray `&amp;` and trims.
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").replace("&amp;", "&")
}

/// The decimal token following a "ch"/"chap"/"chapter" label.
pub fn chapter_number(title: &str) -> Option<&str> {
    CHAPTER_NUMBER.captures(title).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// `"3 days ago"` relative to `now`.
pub fn parse_relative_time(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE_TIME.captures(text)?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit = match caps[2].to_ascii_lowercase().as_str() {
        "sec" => 1,
        "min" => 60,
        "hour" => 60 * 60,
        _ => 24 * 60 * 60,
    };
    let delta = TimeDelta::try_seconds(amount.checked_mul(unit)?)?;
    now.checked_sub_signed(delta)
}

/// Chapter anchors in document order. Deleted entries and entries without a
/// chapter id or number are dropped.
pub fn parse_chapter_list(html: &str, now: DateTime<Utc>) -> Vec<ChapterListItem> {
    let document = Html::parse_document(html);
    let mut chapters = Vec::new();
    for anchor in document.select(&CHAPTER_LINK) {
        let title = clean_text(&anchor.text().collect::<String>());
        if title.to_lowercase().contains("deleted") {
            tracing::debug!(%title, "skipping deleted chapter");
            continue;
        }
        let Some(id) = anchor.value().attr("href").and_then(|h| CHAPTER_ID.captures(h)).map(|c| c[1].to_string()) else {
            tracing::debug!(%title, "chapter anchor without id");
            continue;
        };
        let Some(number) = chapter_number(&title).map(str::to_string) else {
            tracing::debug!(%title, "chapter anchor without number");
            continue;
        };
        let mut item = ChapterListItem::new(number, title, id);
        item.created = anchor
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|row| parse_relative_time(&row.text().collect::<Vec<_>>().join(" "), now));
        chapters.push(item);
    }
    chapters
}

/// Applies `since`, then `order`, then the offset/limit window.
pub fn apply_chapter_query(chapters: Vec<ChapterListItem>, query: &ChapterQuery) -> Vec<ChapterListItem> {
    let mut kept: Vec<ChapterListItem> = chapters
        .into_iter()
        .filter(|c| match (query.since, c.timestamp()) {
            (Some(since), Some(ts)) => ts >= since,
            _ => true,
        })
        .collect();
    if query.order == SortOrder::Desc {
        kept.reverse();
    }
    kept.into_iter().skip(query.offset).take(query.limit.unwrap_or(usize::MAX)).collect()
}
