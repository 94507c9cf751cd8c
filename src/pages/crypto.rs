//! OpenSSL-compatible passphrase AES, the envelope CryptoJS produces for
//! `AES.encrypt(text, passphrase)`: base64 of `"Salted__" || salt[8] || ciphertext`,
//! key and IV from `EVP_BytesToKey(MD5, passphrase, salt)`, AES-256-CBC, PKCS#7.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use base64::prelude::*;
use md5::{Digest, Md5};
use serde::de::DeserializeOwned;

use crate::error::ResolveError;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

const SALT_HEADER: &[u8] = b"Salted__";
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

fn failed(msg: impl Into<String>) -> ResolveError {
    ResolveError::DecryptionFailed(msg.into())
}

/// Decrypts a base64 envelope with `passphrase` and returns the UTF-8 plaintext.
pub fn decrypt(ciphertext: &str, passphrase: &str) -> Result<String, ResolveError> {
    let compact: String = ciphertext.chars().filter(|c| !c.is_whitespace()).collect();
    let message = BASE64_STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| failed(format!("invalid base64: {}", e)))?;

    let (salt, body) = if message.len() >= 16 && &message[..8] == SALT_HEADER {
        (&message[8..16], &message[16..])
    } else {
        (&[][..], &message[..])
    };
    if body.is_empty() {
        return Err(failed("empty ciphertext"));
    }

    let (key, iv) = derive_key_iv(passphrase.as_bytes(), salt);
    let cipher = Aes256CbcDec::new_from_slices(&key, &iv).map_err(|e| failed(e.to_string()))?;
    let plain = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| failed("bad padding, wrong key or corrupted ciphertext"))?;
    tracing::trace!(cipher_len = body.len(), plain_len = plain.len(), "decrypted payload");

    String::from_utf8(plain).map_err(|_| failed("plaintext is not valid UTF-8"))
}

/// Decrypts and parses the plaintext as JSON.
pub fn decrypt_json<T: DeserializeOwned>(ciphertext: &str, passphrase: &str) -> Result<T, ResolveError> {
    let plain = decrypt(ciphertext, passphrase)?;
    serde_json::from_str(&plain).map_err(|e| failed(format!("plaintext is not the expected JSON: {}", e)))
}

/// Produces the same envelope `decrypt` reads, with a caller-chosen salt.
pub fn encrypt(plaintext: &str, passphrase: &str, salt: [u8; 8]) -> String {
    let (key, iv) = derive_key_iv(passphrase.as_bytes(), &salt);
    let body = Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    let mut message = Vec::with_capacity(16 + body.len());
    message.extend_from_slice(SALT_HEADER);
    message.extend_from_slice(&salt);
    message.extend_from_slice(&body);
    BASE64_STANDARD.encode(message)
}

fn derive_key_iv(pass: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut out = [0u8; KEY_LEN + IV_LEN];
    evp_bytes_to_key(pass, salt, &mut out);
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&out[..KEY_LEN]);
    iv.copy_from_slice(&out[KEY_LEN..]);
    (key, iv)
}

// https://github.com/openssl/openssl/blob/36614faa98c5a947a635d3f44e78c7c36b722534/crypto/evp/evp_key.c#L78
// single iteration, MD5
fn evp_bytes_to_key(pass: &[u8], salt: &[u8], output: &mut [u8]) {
    let mut hasher = Md5::new();
    let mut derived = Vec::with_capacity(output.len() + 16);
    let mut block: Vec<u8> = Vec::new();

    while derived.len() < output.len() {
        if !block.is_empty() {
            hasher.update(&block);
        }
        hasher.update(pass);
        hasher.update(salt);
        block = hasher.finalize_reset().to_vec();
        derived.extend_from_slice(&block);
    }

    output.copy_from_slice(&derived[..output.len()]);
}
