use serde_json::Value as JsonValue;

use crate::error::ResolveError;
use crate::pages::assemble::{assemble, PageSource};
use crate::pages::crypto::decrypt_json;
use crate::pages::expr::{evaluate, parse_string_array};
use crate::pages::fields::{all_present, extract, Field};
use crate::types::ChapterPages;

/// Obfuscation layouts chapter pages have been served with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// `batoPass` + `batoWord` + `imgHttps`: the passphrase decrypts a per-page
    /// token array that is appended to each image URL as its query string.
    TokenQuery,
    /// `batojs` + `server` + `images`: the passphrase decrypts the image server
    /// base URL that prefixes each image path.
    ServerPrefix,
}

impl Generation {
    /// Order in which layouts are probed.
    pub const PROBE_ORDER: [Generation; 2] = [Generation::TokenQuery, Generation::ServerPrefix];

    /// (key expression, ciphertext, image list)
    pub fn required_fields(self) -> &'static [Field; 3] {
        match self {
            Generation::TokenQuery => &[Field::PassExpr, Field::WordCipher, Field::ImageUrls],
            Generation::ServerPrefix => &[Field::ServerKeyExpr, Field::ServerCipher, Field::ImagePaths],
        }
    }

    fn resolve(self, text: &str) -> Result<ChapterPages, ResolveError> {
        let [key_field, cipher_field, images_field] = *self.required_fields();
        let key = evaluate(extract(text, key_field)?)?.to_js_string();
        let cipher = extract(text, cipher_field)?;
        let raw = parse_string_array(extract(text, images_field)?)?;

        let source = match self {
            Generation::TokenQuery => {
                let tokens: Vec<JsonValue> = decrypt_json(cipher, &key)?;
                PageSource::QueryTokens(tokens.into_iter().map(token_string).collect())
            }
            Generation::ServerPrefix => PageSource::ServerPrefix(decrypt_json::<String>(cipher, &key)?),
        };
        assemble(&raw, &source)
    }
}

fn token_string(v: JsonValue) -> String {
    match v {
        JsonValue::String(s) => s,
        other => other.to_string(),
    }
}

/// Picks the first generation whose fields are all declared in `text`.
pub fn detect_generation(text: &str) -> Result<Generation, ResolveError> {
    Generation::PROBE_ORDER
        .into_iter()
        .find(|g| all_present(text, g.required_fields()))
        .ok_or(ResolveError::UnrecognizedPageFormat)
}

/// Runs the whole pipeline over a chapter page's raw text. Once a generation is
/// selected its failures are final; the other layout is not tried.
pub fn resolve_pages(text: &str) -> Result<ChapterPages, ResolveError> {
    let generation = detect_generation(text)?;
    tracing::debug!(?generation, "selected page layout");
    let pages = generation.resolve(text)?;
    tracing::info!(?generation, pages = pages.len(), "resolved chapter pages");
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::crypto::encrypt;

    fn token_page(pass_expr: &str, pass_value: &str, urls: &[&str], tokens: &[&str]) -> String {
        let word = encrypt(&serde_json::to_string(tokens).unwrap(), pass_value, *b"12345678");
        format!(
            "<script>\nconst imgHttps = {};\nconst batoPass = {};\nconst batoWord = \"{}\";\n</script>",
            serde_json::to_string(urls).unwrap(),
            pass_expr,
            word
        )
    }

    fn server_page(key_expr: &str, key_value: &str, server: &str, paths: &[&str]) -> String {
        let cipher = encrypt(&serde_json::to_string(server).unwrap(), key_value, *b"abcdefgh");
        format!(
            "<script>var images = {};\nvar server = \"{}\";\nvar batojs = {};</script>",
            serde_json::to_string(paths).unwrap(),
            cipher,
            key_expr
        )
    }

    #[test]
    fn token_query_generation() {
        // (+!![]+[])+(!![]+!![]+[]) == "12"
        let page = token_page("(+!![]+[])+(!![]+!![]+[])", "12", &["https://x/1.webp", "https://x/2.webp"], &["a", "b"]);
        assert_eq!(detect_generation(&page).unwrap(), Generation::TokenQuery);
        let pages = resolve_pages(&page).unwrap();
        assert_eq!(pages.high_urls(), vec!["https://x/1.webp?a", "https://x/2.webp?b"]);
    }

    #[test]
    fn server_prefix_generation() {
        let page = server_page("[+!![]]+[+[]]", "10", "https://s9.example/", &["a/1.png", "a/2.png", "a/3.png"]);
        assert_eq!(detect_generation(&page).unwrap(), Generation::ServerPrefix);
        let pages = resolve_pages(&page).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages.pages[0].high_url(), "https://s9.example/a/1.png");
    }

    #[test]
    fn token_layout_wins_when_both_are_declared() {
        let page = format!(
            "{}\n{}",
            server_page("3", "3", "https://s1.example/", &["p1.png"]),
            token_page("'k'", "k", &["https://x/1.webp"], &["t"])
        );
        assert_eq!(detect_generation(&page).unwrap(), Generation::TokenQuery);
        assert_eq!(resolve_pages(&page).unwrap().high_urls(), vec!["https://x/1.webp?t"]);
    }

    #[test]
    fn selected_layout_failure_does_not_fall_back() {
        // token layout has the wrong key, server layout alone would resolve
        let page = format!(
            "{}\n{}",
            token_page("2", "1", &["https://x/1.webp"], &["t"]),
            server_page("3", "3", "https://s1.example/", &["p1.png"])
        );
        assert!(matches!(resolve_pages(&page), Err(ResolveError::DecryptionFailed(_))));
    }

    #[test]
    fn empty_image_list_resolves_to_no_pages() {
        let page = token_page("1", "1", &[], &[]);
        assert!(resolve_pages(&page).unwrap().is_empty());
    }

    #[test]
    fn padded_pass_expression() {
        // leading `[+[]]+` is dropped before evaluation
        let page = token_page("[+[]]+[+[]]+(+!![]+[])", "1", &["u"], &["t"]);
        assert_eq!(resolve_pages(&page).unwrap().high_urls(), vec!["u?t"]);
    }

    #[test]
    fn partial_fields_are_unrecognized() {
        let page = r#"const imgHttps = ["u"]; const batoWord = "abc";"#;
        assert_eq!(detect_generation(page).unwrap_err(), ResolveError::UnrecognizedPageFormat);
        assert_eq!(resolve_pages("<html></html>").unwrap_err(), ResolveError::UnrecognizedPageFormat);
    }

    #[test]
    fn token_count_mismatch_fails_whole_chapter() {
        let page = token_page("1", "1", &["u1", "u2", "u3"], &["t1", "t2"]);
        assert_eq!(resolve_pages(&page).unwrap_err(), ResolveError::DataMismatch { expected: 3, found: 2 });
    }

    #[test]
    fn unsupported_key_expression() {
        let page = token_page("eval(atob('x'))", "1", &["u"], &["t"]);
        assert!(matches!(resolve_pages(&page), Err(ResolveError::UnsupportedExpression(_))));
    }

    #[test]
    fn wrong_key_is_decryption_failure() {
        let page = token_page("2", "1", &["u"], &["t"]);
        assert!(matches!(resolve_pages(&page), Err(ResolveError::DecryptionFailed(_))));
    }

    #[test]
    fn numeric_tokens_are_stringified() {
        let word = encrypt("[1, 2.5]", "k", [0; 8]);
        let page = format!(r#"const batoPass = 'k'; const batoWord = "{}"; const imgHttps = ['a','b'];"#, word);
        assert_eq!(resolve_pages(&page).unwrap().high_urls(), vec!["a?1", "b?2.5"]);
    }
}
