pub mod config;
pub mod error;
pub mod fetch;
pub mod listing;
pub mod pages;
pub mod types;

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::config::ConnectorConfig;
    pub use crate::error::{Error, ResolveError, Result};
    pub use crate::fetch::{Fetcher, HttpFetcher};
    pub use crate::types::{
        ChapterList, ChapterListItem, ChapterPages, ChapterQuery, PageDescriptor, PageTransform, Ranking,
        SeriesResult, SeriesSearchResults, SortOrder,
    };
    pub use crate::Connector;
}

use chrono::Utc;
use url::Url;

use crate::config::ConnectorConfig;
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::types::{ChapterList, ChapterPages, ChapterQuery, SeriesSearchResults};

/// Entry point: search, chapter listing and chapter page resolution against
/// one site base URL. Each call fetches fresh text; nothing is cached.
pub struct Connector<F = HttpFetcher> {
    fetcher: F,
    base: Url,
}

impl Connector<HttpFetcher> {
    pub fn new(cfg: &ConnectorConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(cfg)?;
        Ok(Self::with_fetcher(fetcher, &cfg.base_url)?)
    }
}

impl<F: Fetcher> Connector<F> {
    pub fn with_fetcher(fetcher: F, base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        // relative joins replace the last segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { fetcher, base })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetches every result page for `term` in order, ranks the concatenated
    /// entries by position and returns the `offset`/`limit` window of them.
    pub async fn search_series(&self, term: &str, offset: usize, limit: Option<usize>) -> Result<SeriesSearchResults> {
        let first = self.fetch(&self.search_url(term, 1)?).await?;
        let first = listing::parse_search_page(&first);
        let total_pages = first.total_pages;
        tracing::debug!(term, total_pages, "search first page");

        let mut results = first.entries;
        for page in 2..=total_pages {
            let text = self.fetch(&self.search_url(term, page)?).await?;
            let parsed = listing::parse_search_page(&text);
            tracing::debug!(term, page, entries = parsed.entries.len(), "search page");
            results.extend(parsed.entries);
        }
        listing::assign_rankings(&mut results);

        let found = results.len();
        let results: Vec<_> = results.into_iter().skip(offset).take(limit.unwrap_or(usize::MAX)).collect();
        tracing::info!(term, found, returned = results.len(), "search complete");
        Ok(SeriesSearchResults { results })
    }

    pub async fn list_chapters(&self, series_id: &str, query: &ChapterQuery) -> Result<ChapterList> {
        validate_identifier(series_id)?;
        let text = self.fetch(&self.base.join(&format!("series/{}", series_id))?).await?;
        let parsed = listing::parse_chapter_list(&text, Utc::now());
        let found = parsed.len();
        let chapters = listing::apply_chapter_query(parsed, query);
        tracing::info!(series_id, found, returned = chapters.len(), "listed chapters");
        Ok(ChapterList { chapters })
    }

    pub async fn resolve_chapter_pages(&self, chapter_id: &str) -> Result<ChapterPages> {
        validate_identifier(chapter_id)?;
        let text = self.fetch(&self.chapter_url(chapter_id)?).await?;
        let resolved = pages::resolve_pages(&text)
            .inspect_err(|e| tracing::warn!(chapter_id, error = %e, "page resolution failed"))?;
        Ok(resolved)
    }

    /// Resolves `chapter_id` and `low_chapter_id` one after the other and
    /// attaches the second as the low-resolution variant of each page.
    pub async fn resolve_dual_resolution(&self, chapter_id: &str, low_chapter_id: &str) -> Result<ChapterPages> {
        let high = self.resolve_chapter_pages(chapter_id).await?;
        let low = self.resolve_chapter_pages(low_chapter_id).await?;
        Ok(pages::with_low_resolution(high, low, None)?)
    }

    fn search_url(&self, term: &str, page: usize) -> Result<Url> {
        let mut url = self.base.join("search")?;
        url.query_pairs_mut().append_pair("word", term).append_pair("page", &page.to_string());
        Ok(url)
    }

    fn chapter_url(&self, chapter_id: &str) -> Result<Url> {
        Ok(self.base.join(&format!("chapter/{}", chapter_id))?)
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        self.fetcher.fetch_text(url).await.map_err(Error::Fetch)
    }
}

/// Non-empty ASCII alphanumerics, `-` or `_`.
fn validate_identifier(id: &str) -> Result<()> {
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(id.to_string()))
    }
}
