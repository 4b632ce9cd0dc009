//! Password record protocol: reversible `CE4` obfuscation, `CR5` encryption
//! backed by the derived-key AES-CBC pipeline, and the recode/convert policy
//! wrappers the application drives when settings change.
//!
//! Everything here is deliberately fail-soft: the cipher and format layers
//! fail fast with [`CryptoError`](crate::error::CryptoError), and this layer
//! converts each failure into a `(value, false)` result or an unchanged
//! input string so that callers can warn instead of crash. Callers detect a
//! failed recode by comparing against the input.

use std::sync::{Mutex, PoisonError};

use anyhow::{Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use zeroize::Zeroizing;

use crate::crypto::{
    DEFAULT_ITERATIONS, DigestAlg, KEY_LEN, SALT_LEN, decrypt_data, encrypt_data,
    kdf::{DELIMITER, hash_password_tuple, rehash_password},
    secure_random,
};

/// Marker of reversibly encoded (obfuscated, not encrypted) records.
pub const ENCODE_MARKER: &str = "CE4";
/// Marker of encrypted records.
pub const CRYPT_MARKER: &str = "CR5";

/// Number of random padding characters on each side of an encoded password.
const PAD_LEN: usize = 32;

/// Alphabet the obfuscation padding is drawn from. ASCII only, so a padding
/// character is always exactly one byte.
const PAD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789.,;:-_!$?*+#";

fn random_padding() -> Result<[u8; PAD_LEN]> {
    let mut raw = [0u8; PAD_LEN];
    secure_random(&mut raw)?;
    for b in raw.iter_mut() {
        *b = PAD_ALPHABET[*b as usize % PAD_ALPHABET.len()];
    }
    Ok(raw)
}

/// Reversibly encodes a password: `"CE4" + base64(pad32 + password + pad32)`.
///
/// This hides the password from a casual glance at the settings file but is
/// not encryption; [`pw_decode`] recovers it without any secret.
pub fn pw_encode(pw: &str) -> Result<String> {
    let lead = random_padding()?;
    let trail = random_padding()?;

    let mut buf = Vec::with_capacity(2 * PAD_LEN + pw.len());
    buf.extend_from_slice(&lead);
    buf.extend_from_slice(pw.as_bytes());
    buf.extend_from_slice(&trail);

    Ok(format!("{ENCODE_MARKER}{}", B64.encode(&buf)))
}

/// Decodes a [`pw_encode`]d password.
///
/// Input without the `CE4` marker is treated as plaintext and returned
/// unchanged, as is anything that fails to decode.
pub fn pw_decode(epw: &str) -> String {
    let Some(encoded) = epw.strip_prefix(ENCODE_MARKER) else {
        return epw.to_string();
    };
    let Ok(buf) = B64.decode(encoded) else {
        return epw.to_string();
    };
    if buf.len() < 2 * PAD_LEN {
        return epw.to_string();
    }
    match String::from_utf8(buf[PAD_LEN..buf.len() - PAD_LEN].to_vec()) {
        Ok(pw) => pw,
        Err(_) => epw.to_string(),
    }
}

/// Encrypts `pw` under a key derived from the main password.
///
/// Returns `("CR5" + digest$iterations$base64(salt)$base64(IV‖ct), true)`,
/// or `("", false)` when no main password is available or any cipher step
/// fails.
pub fn pw_encrypt(pw: &str, main_pw: Option<&str>) -> (String, bool) {
    match try_pw_encrypt(pw, main_pw) {
        Ok(epw) => (epw, true),
        Err(_) => (String::new(), false),
    }
}

fn try_pw_encrypt(pw: &str, main_pw: Option<&str>) -> Result<String> {
    let Some(main_pw) = main_pw else {
        bail!("no main password available");
    };
    let tuple = hash_password_tuple(main_pw, DigestAlg::default(), DEFAULT_ITERATIONS, SALT_LEN)?;
    let key = &tuple.derived[..KEY_LEN.min(tuple.derived.len())];
    let edata = encrypt_data(key, pw.as_bytes())?;
    Ok(format!(
        "{CRYPT_MARKER}{}{DELIMITER}{}",
        tuple.parameters(),
        B64.encode(&edata)
    ))
}

/// Decrypts a [`pw_encrypt`]ed record.
///
/// Input without the `CR5` marker is passed through as `(input, false)`;
/// a wrong main password or damaged record yields `("", false)`.
pub fn pw_decrypt(epw: &str, main_pw: Option<&str>) -> (String, bool) {
    if !epw.starts_with(CRYPT_MARKER) {
        return (epw.to_string(), false);
    }
    match try_pw_decrypt(epw, main_pw) {
        Ok(pw) => (pw, true),
        Err(_) => (String::new(), false),
    }
}

fn try_pw_decrypt(epw: &str, main_pw: Option<&str>) -> Result<String> {
    let Some(main_pw) = main_pw else {
        bail!("no main password available");
    };
    let record = &epw[CRYPT_MARKER.len()..];
    // only the last delimiter separates the hash parameters from the
    // ciphertext; earlier fields must not be re-split
    let Some((parameters, ciphertext)) = record.rsplit_once(DELIMITER) else {
        bail!("missing ciphertext field");
    };

    let derived = rehash_password(main_pw, parameters)?;
    let key = &derived[..KEY_LEN.min(derived.len())];
    let edata = B64.decode(ciphertext)?;
    let plain = decrypt_data(key, &edata)?;
    Ok(String::from_utf8(plain)?)
}

/// Decrypts with the old main password and re-encrypts with the new one.
pub fn pw_reencrypt(epw: &str, old_password: &str, new_password: &str) -> (String, bool) {
    let (pw, ok) = pw_decrypt(epw, Some(old_password));
    if !ok {
        return (String::new(), false);
    }
    pw_encrypt(&pw, Some(new_password))
}

/// Recodes a stored record when the main password changes.
///
/// An empty `old_password`/`new_password` means "no main password on that
/// side": the record moves between the encoded and encrypted schemes as
/// needed. On any failure the original record is returned unchanged.
pub fn pw_recode(epw: &str, old_password: &str, new_password: &str) -> String {
    if epw.is_empty() {
        return epw.to_string();
    }

    if new_password.is_empty() {
        // target scheme: encoded
        let (pw, ok) = if old_password.is_empty() {
            (pw_decode(epw), true)
        } else {
            pw_decrypt(epw, Some(old_password))
        };
        if !ok && !old_password.is_empty() {
            return epw.to_string();
        }
        pw_encode(&pw).unwrap_or_else(|_| epw.to_string())
    } else if old_password.is_empty() {
        // encoded -> encrypted
        let (npw, ok) = pw_encrypt(&pw_decode(epw), Some(new_password));
        if ok { npw } else { epw.to_string() }
    } else {
        let (npw, ok) = pw_reencrypt(epw, old_password, new_password);
        if ok { npw } else { epw.to_string() }
    }
}

/// Converts between plaintext and the stored representation, choosing the
/// scheme from the "use main password" preference.
///
/// With `encode`, `pw` is plaintext and the result is a `CE4`/`CR5` record;
/// without it, `pw` is a stored record and the result is plaintext. Failures
/// follow the conventions of the underlying operations.
pub fn pw_convert(pw: &str, encode: bool, use_main_password: bool, main_pw: Option<&str>) -> String {
    if encode {
        if use_main_password {
            pw_encrypt(pw, main_pw).0
        } else {
            pw_encode(pw).unwrap_or_default()
        }
    } else if pw.starts_with(CRYPT_MARKER) {
        let (plain, ok) = pw_decrypt(pw, main_pw);
        if ok { plain } else { pw.to_string() }
    } else {
        pw_decode(pw)
    }
}

/// Encrypts an arbitrary byte payload under a key derived directly from
/// `password` (no main-password indirection).
///
/// The output carries the same self-describing `CR5` framing as password
/// records, as raw bytes.
pub fn data_encrypt(
    data: &[u8],
    password: &str,
    key_length: usize,
    hash_iterations: u32,
) -> (Vec<u8>, bool) {
    match try_data_encrypt(data, password, key_length, hash_iterations) {
        Ok(edata) => (edata, true),
        Err(_) => (Vec::new(), false),
    }
}

fn try_data_encrypt(
    data: &[u8],
    password: &str,
    key_length: usize,
    hash_iterations: u32,
) -> Result<Vec<u8>> {
    let tuple = hash_password_tuple(password, DigestAlg::default(), hash_iterations, SALT_LEN)?;
    let key = &tuple.derived[..key_length.min(tuple.derived.len())];
    let ciphertext = encrypt_data(key, data)?;

    let mut out = Vec::new();
    out.extend_from_slice(CRYPT_MARKER.as_bytes());
    out.extend_from_slice(tuple.parameters().as_bytes());
    out.push(DELIMITER as u8);
    out.extend_from_slice(B64.encode(&ciphertext).as_bytes());
    Ok(out)
}

/// Decrypts a [`data_encrypt`]ed payload.
///
/// Input without the `CR5` marker is passed through as `(input, false)`.
pub fn data_decrypt(edata: &[u8], password: &str, key_length: usize) -> (Vec<u8>, bool) {
    if !edata.starts_with(CRYPT_MARKER.as_bytes()) {
        return (edata.to_vec(), false);
    }
    match try_data_decrypt(edata, password, key_length) {
        Ok(data) => (data, true),
        Err(_) => (Vec::new(), false),
    }
}

fn try_data_decrypt(edata: &[u8], password: &str, key_length: usize) -> Result<Vec<u8>> {
    let record = &edata[CRYPT_MARKER.len()..];
    let Some(split) = record.iter().rposition(|&b| b == DELIMITER as u8) else {
        bail!("missing ciphertext field");
    };
    let parameters = std::str::from_utf8(&record[..split])?;

    let derived = rehash_password(password, parameters)?;
    let key = &derived[..key_length.min(derived.len())];
    let ciphertext = B64.decode(&record[split + 1..])?;
    Ok(decrypt_data(key, &ciphertext)?)
}

/// Session cache for the main password.
///
/// Replaces the original module-global: a single shared instance is owned by
/// the application and handed to whatever needs it. The value is kept
/// obfuscated in memory and zeroized when cleared or replaced.
#[derive(Default)]
pub struct MainPassword {
    cached: Mutex<Option<Zeroizing<String>>>,
}

impl MainPassword {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached main password, if one was set this session.
    pub fn get(&self) -> Option<Zeroizing<String>> {
        let guard = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|epw| Zeroizing::new(pw_decode(epw)))
    }

    /// Caches `pw` for the rest of the session.
    pub fn set(&self, pw: &str) -> Result<()> {
        let encoded = Zeroizing::new(pw_encode(pw)?);
        let mut guard = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(encoded);
        Ok(())
    }

    /// Drops the cached value.
    pub fn clear(&self) {
        let mut guard = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    /// Prefers an explicitly supplied password over the cached one.
    pub fn resolve(&self, supplied: Option<&str>) -> Option<Zeroizing<String>> {
        match supplied {
            Some(pw) => Some(Zeroizing::new(pw.to_string())),
            None => self.get(),
        }
    }
}
