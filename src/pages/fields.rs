//! Locates the script declarations a chapter page carries its key material and
//! image data in. Every field is searched independently; declaration order in
//! the page does not matter.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ResolveError;

/// A named declaration in chapter page script content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// `batoPass = <expr>;` obfuscated passphrase expression.
    PassExpr,
    /// `batoWord = "<base64>";` encrypted per-page token array.
    WordCipher,
    /// `imgHttps = [...];` absolute image URLs.
    ImageUrls,
    /// `batojs = <expr>;` obfuscated passphrase expression (server layout).
    ServerKeyExpr,
    /// `server = "<base64>";` encrypted image server base URL.
    ServerCipher,
    /// `images = [...];` image paths relative to the server.
    ImagePaths,
}

// Leading `[+[]]+` runs are arithmetic padding and are left out of the capture.
static PASS_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:const|let|var)\s+batoPass\s*=\s*(?:\[\+\[\]\]\+)*([^;]*);").expect("static pattern")
});
static WORD_CIPHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:const|let|var)\s+batoWord\s*=\s*["']([^"']*)["']"#).expect("static pattern")
});
static IMAGE_URLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:const|let|var)\s+imgHttps\s*=\s*(\[[^\]]*\])").expect("static pattern")
});
static SERVER_KEY_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:const|let|var)\s+batojs\s*=\s*(?:\[\+\[\]\]\+)*([^;]*);").expect("static pattern")
});
static SERVER_CIPHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:const|let|var)\s+server\s*=\s*["']([^"']*)["']"#).expect("static pattern")
});
static IMAGE_PATHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:const|let|var)\s+images\s*=\s*(\[[^\]]*\])").expect("static pattern")
});

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::PassExpr => "batoPass",
            Field::WordCipher => "batoWord",
            Field::ImageUrls => "imgHttps",
            Field::ServerKeyExpr => "batojs",
            Field::ServerCipher => "server",
            Field::ImagePaths => "images",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Field::PassExpr => &*PASS_EXPR,
            Field::WordCipher => &*WORD_CIPHER,
            Field::ImageUrls => &*IMAGE_URLS,
            Field::ServerKeyExpr => &*SERVER_KEY_EXPR,
            Field::ServerCipher => &*SERVER_CIPHER,
            Field::ImagePaths => &*IMAGE_PATHS,
        }
    }
}

/// Returns the first capture of `field` in `text`.
pub fn extract(text: &str, field: Field) -> Result<&str, ResolveError> {
    extract_with(text, field.label(), field.pattern())
}

/// Returns capture group 1 of the first match of `pattern`. An empty capture is
/// a successful extraction; only a missing match is `FieldNotFound`.
pub fn extract_with<'t>(text: &'t str, label: &'static str, pattern: &Regex) -> Result<&'t str, ResolveError> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or(ResolveError::FieldNotFound(label))
}

/// True when every field in `fields` is declared in `text`.
pub fn all_present(text: &str, fields: &[Field]) -> bool {
    fields.iter().all(|f| f.pattern().is_match(text))
}
