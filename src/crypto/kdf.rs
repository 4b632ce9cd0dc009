//! Password-based key derivation and the `$`-delimited hash record formats.
//!
//! The derivation is a simplified single-block PBKDF2: the password is fed
//! through `HMAC(key = salt, msg = previous)` for the configured number of
//! iterations, and the final digest-width output is the derived key
//! material. This is deliberately not the RFC 2898 multi-block construction;
//! records produced by it are only readable by the same chain, so the exact
//! shape is load-bearing and must not be "fixed".

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::CryptoError;

use super::{DEFAULT_ITERATIONS, SALT_LEN, secure_random};

/// Field delimiter of the serialized hash records. Digest names and
/// iteration counts never contain it, so it is never escaped.
pub const DELIMITER: char = '$';

/// Supported HMAC digests, selected by their serialized name.
///
/// MD5 and SHA-1 exist solely so that old records still verify; new
/// derivations use [`DigestAlg::default`] (SHA-512).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlg {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    #[default]
    Sha512,
}

impl DigestAlg {
    /// Canonical name as it appears in serialized records.
    pub fn name(self) -> &'static str {
        match self {
            DigestAlg::Md5 => "md5",
            DigestAlg::Sha1 => "sha1",
            DigestAlg::Sha224 => "sha224",
            DigestAlg::Sha256 => "sha256",
            DigestAlg::Sha384 => "sha384",
            DigestAlg::Sha512 => "sha512",
        }
    }

    /// Looks up a digest by its serialized name.
    ///
    /// # Errors
    ///
    /// [`CryptoError::UnsupportedDigest`] for anything outside the set.
    pub fn from_name(name: &str) -> Result<Self, CryptoError> {
        match name {
            "md5" => Ok(DigestAlg::Md5),
            "sha1" => Ok(DigestAlg::Sha1),
            "sha224" => Ok(DigestAlg::Sha224),
            "sha256" => Ok(DigestAlg::Sha256),
            "sha384" => Ok(DigestAlg::Sha384),
            "sha512" => Ok(DigestAlg::Sha512),
            other => Err(CryptoError::UnsupportedDigest(other.to_string())),
        }
    }

    /// One HMAC application with `key` as the MAC key.
    fn hmac(self, key: &[u8], msg: &[u8]) -> Vec<u8> {
        macro_rules! mac {
            ($digest:ty) => {{
                let mut m =
                    Hmac::<$digest>::new_from_slice(key).expect("HMAC accepts any key length");
                m.update(msg);
                m.finalize().into_bytes().to_vec()
            }};
        }

        match self {
            DigestAlg::Md5 => mac!(Md5),
            DigestAlg::Sha1 => mac!(Sha1),
            DigestAlg::Sha224 => mac!(Sha224),
            DigestAlg::Sha256 => mac!(Sha256),
            DigestAlg::Sha384 => mac!(Sha384),
            DigestAlg::Sha512 => mac!(Sha512),
        }
    }
}

/// Derives key material from `password` and `salt` by iterated HMAC.
///
/// Output width equals the digest width; callers take a prefix when they
/// need a shorter key.
pub fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32, digest: DigestAlg) -> Zeroizing<Vec<u8>> {
    let mut hash = Zeroizing::new(password.to_vec());
    for _ in 0..iterations {
        hash = Zeroizing::new(digest.hmac(salt, &hash));
    }
    hash
}

/// A freshly derived password hash with the parameters needed to
/// reproduce it.
pub struct HashTuple {
    pub digest: DigestAlg,
    pub iterations: u32,
    pub salt: Vec<u8>,
    pub derived: Zeroizing<Vec<u8>>,
}

impl HashTuple {
    /// `digestName$iterations$base64(salt)` — everything needed to
    /// re-derive the key except the derived value itself.
    pub fn parameters(&self) -> String {
        format!(
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.digest.name(),
            self.iterations,
            B64.encode(&self.salt)
        )
    }
}

/// Hashes `password` with a fresh random salt.
pub fn hash_password_tuple(
    password: &str,
    digest: DigestAlg,
    iterations: u32,
    salt_len: usize,
) -> Result<HashTuple> {
    let mut salt = vec![0u8; salt_len];
    secure_random(&mut salt).context("failed to generate salt")?;
    let derived = pbkdf2(password.as_bytes(), &salt, iterations, digest);
    Ok(HashTuple {
        digest,
        iterations,
        salt,
        derived,
    })
}

/// Hashes `password` with the default parameters (SHA-512, 10000
/// iterations, 32-byte salt) and serializes the result as
/// `digestName$iterations$base64(salt)$base64(derived)`.
pub fn hash_password(password: &str) -> Result<String> {
    let tuple = hash_password_tuple(
        password,
        DigestAlg::default(),
        DEFAULT_ITERATIONS,
        SALT_LEN,
    )?;
    Ok(format!(
        "{}{DELIMITER}{}",
        tuple.parameters(),
        B64.encode(&tuple.derived)
    ))
}

/// Checks `password` against a serialized [`hash_password`] record.
///
/// The comparison of the derived values is constant-time.
///
/// # Errors
///
/// [`CryptoError::Format`] unless the record has exactly four fields with
/// valid base64 and a numeric iteration count; [`CryptoError::UnsupportedDigest`]
/// for an unknown digest name.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, CryptoError> {
    let fields: Vec<&str> = hash.split(DELIMITER).collect();
    let &[digest_name, iterations, salt, derived] = &fields[..] else {
        return Err(CryptoError::Format);
    };

    let digest = DigestAlg::from_name(digest_name)?;
    let iterations: u32 = iterations.parse().map_err(|_| CryptoError::Format)?;
    let salt = B64.decode(salt).map_err(|_| CryptoError::Format)?;
    let expected = B64.decode(derived).map_err(|_| CryptoError::Format)?;

    let recomputed = pbkdf2(password.as_bytes(), &salt, iterations, digest);
    Ok(recomputed.as_slice().ct_eq(expected.as_slice()).into())
}

/// Re-derives key material from `password` and a
/// `digestName$iterations$base64(salt)` parameter string.
///
/// Used to reconstruct an encryption key that was never stored.
pub fn rehash_password(
    password: &str,
    hash_parameters: &str,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let fields: Vec<&str> = hash_parameters.split(DELIMITER).collect();
    let &[digest_name, iterations, salt] = &fields[..] else {
        return Err(CryptoError::Format);
    };

    let digest = DigestAlg::from_name(digest_name)?;
    let iterations: u32 = iterations.parse().map_err(|_| CryptoError::Format)?;
    let salt = B64.decode(salt).map_err(|_| CryptoError::Format)?;

    Ok(pbkdf2(password.as_bytes(), &salt, iterations, digest))
}
