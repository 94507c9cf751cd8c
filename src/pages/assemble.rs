use crate::error::ResolveError;
use crate::types::{ChapterPages, PageDescriptor, PageTransform};

/// Decrypted data that turns raw image entries into fetchable URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    /// One token per image, appended as the query string.
    QueryTokens(Vec<String>),
    /// Server base URL prefixed to every image path.
    ServerPrefix(String),
}

/// Builds the ordered page list. Token lists must line up one-to-one with `raw`;
/// a length disagreement fails instead of assembling a partial list.
pub fn assemble(raw: &[String], source: &PageSource) -> Result<ChapterPages, ResolveError> {
    let pages = match source {
        PageSource::QueryTokens(tokens) => {
            if tokens.len() != raw.len() {
                return Err(ResolveError::DataMismatch { expected: raw.len(), found: tokens.len() });
            }
            raw.iter()
                .zip(tokens)
                .map(|(url, token)| PageDescriptor::new(format!("{}?{}", url, token)))
                .collect()
        }
        PageSource::ServerPrefix(server) => raw
            .iter()
            .map(|path| PageDescriptor::new(format!("{}{}", server, path)))
            .collect(),
    };
    tracing::debug!(pages = raw.len(), mode = source.mode(), "assembled chapter pages");
    Ok(ChapterPages { pages })
}

/// Attaches a separately resolved low-resolution list to `high`, page by page.
/// `transform` overrides the low pages' own transform when given.
pub fn with_low_resolution(
    high: ChapterPages,
    low: ChapterPages,
    transform: Option<PageTransform>,
) -> Result<ChapterPages, ResolveError> {
    if high.len() != low.len() {
        return Err(ResolveError::DataMismatch { expected: high.len(), found: low.len() });
    }
    let pages = high
        .pages
        .into_iter()
        .zip(low.pages)
        .map(|(h, l)| {
            let t = transform.clone().or_else(|| l.high_transform().cloned());
            h.with_low(l.high_url(), t)
        })
        .collect();
    Ok(ChapterPages { pages })
}

impl PageSource {
    fn mode(&self) -> &'static str {
        match self {
            PageSource::QueryTokens(_) => "query",
            PageSource::ServerPrefix(_) => "prefix",
        }
    }
}
