//! Chapter page resolution: field extraction, key expression evaluation,
//! payload decryption and page assembly.

pub mod assemble;
pub mod crypto;
pub mod expr;
pub mod fields;
pub mod resolver;

pub use assemble::{assemble, with_low_resolution, PageSource};
pub use resolver::{detect_generation, resolve_pages, Generation};
