use thiserror::Error;

/// Failures of the chapter page resolution pipeline. All of them are terminal
/// for the call that produced them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A required declaration is absent from the page text.
    #[error("field `{0}` not found in page")]
    FieldNotFound(&'static str),
    /// The key-derivation text uses constructs outside the evaluator grammar.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),
    /// The ciphertext did not decrypt to valid structured plaintext.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    /// Decrypted per-page data does not line up with the raw image entries.
    #[error("data mismatch: {expected} image entries but {found} decrypted entries")]
    DataMismatch { expected: usize, found: usize },
    /// No supported generation has all of its fields present.
    #[error("unrecognized page format")]
    UnrecognizedPageFormat,
}

/// Errors surfaced by [`crate::Connector`].
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Network-level failure from the fetch collaborator, passed through as is.
    #[error(transparent)]
    Fetch(#[from] anyhow::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
