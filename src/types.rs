use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Post-fetch transform applied by the consumer to a page image (e.g. descrambling).
pub type PageTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// One renderable page image. Immutable once built.
#[derive(Clone)]
pub struct PageDescriptor {
    high_url: String,
    low_url: Option<String>,
    high_transform: Option<PageTransform>,
    low_transform: Option<PageTransform>,
}

impl PageDescriptor {
    pub fn new(high_url: impl Into<String>) -> Self {
        Self { high_url: high_url.into(), low_url: None, high_transform: None, low_transform: None }
    }

    pub fn with_low(mut self, low_url: impl Into<String>, transform: Option<PageTransform>) -> Self {
        self.low_url = Some(low_url.into());
        self.low_transform = transform;
        self
    }

    pub fn high_url(&self) -> &str { &self.high_url }
    pub fn low_url(&self) -> Option<&str> { self.low_url.as_deref() }
    pub fn high_transform(&self) -> Option<&PageTransform> { self.high_transform.as_ref() }
    pub fn low_transform(&self) -> Option<&PageTransform> { self.low_transform.as_ref() }
}

impl fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("high_url", &self.high_url)
            .field("low_url", &self.low_url)
            .field("high_transform", &self.high_transform.is_some())
            .field("low_transform", &self.low_transform.is_some())
            .finish()
    }
}

impl Serialize for PageDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PageDescriptor", 4)?;
        s.serialize_field("high_url", &self.high_url)?;
        s.serialize_field("low_url", &self.low_url)?;
        s.serialize_field("has_high_transform", &self.high_transform.is_some())?;
        s.serialize_field("has_low_transform", &self.low_transform.is_some())?;
        s.end()
    }
}

/// Resolved pages of a chapter, in reading order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChapterPages {
    pub pages: Vec<PageDescriptor>,
}

impl ChapterPages {
    pub fn len(&self) -> usize { self.pages.len() }
    pub fn is_empty(&self) -> bool { self.pages.is_empty() }
    pub fn high_urls(&self) -> Vec<&str> { self.pages.iter().map(|p| p.high_url()).collect() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterListItem {
    /// Free-form chapter token, e.g. "10", "10.5" or "EX".
    pub number: String,
    pub title: String,
    pub description: String,
    pub identifier: String,
    pub group: Option<String>,
    pub variant: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub published: Option<DateTime<Utc>>,
}

impl ChapterListItem {
    pub fn new(number: impl Into<String>, title: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            title: title.into(),
            description: String::new(),
            identifier: identifier.into(),
            group: None,
            variant: None,
            created: None,
            updated: None,
            published: None,
        }
    }

    /// Best known timestamp for the entry.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created.or(self.updated).or(self.published)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterList {
    pub chapters: Vec<ChapterListItem>,
}

/// Position-based relevance hint. `Ranked` sorts before `Unranked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    Ranked(usize),
    Unranked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResult {
    pub name: String,
    pub identifier: String,
    pub cover_url: Option<String>,
    pub ranking: Ranking,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesSearchResults {
    pub results: Vec<SeriesResult>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Document order.
    #[default]
    Asc,
    /// Reverse document order.
    Desc,
}

/// Window and filters applied to a parsed chapter list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterQuery {
    pub offset: usize,
    pub limit: Option<usize>,
    pub since: Option<DateTime<Utc>>,
    pub order: SortOrder,
}
