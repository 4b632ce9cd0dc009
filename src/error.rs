use std::fmt;

/// Failure taxonomy of the cipher, padding, and record-format layers.
///
/// The protocol layer in [`crate::protect`] catches every variant and
/// downgrades it to a fail-soft `(value, false)` result; everything below
/// that layer fails fast with one of these.
#[derive(Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// Key length is not 16, 24 or 32 bytes.
    KeySize(usize),
    /// PKCS#7 unpadding found an invalid length or a malformed buffer.
    Padding,
    /// IV length is not a multiple of the 16-byte block size.
    IvLength(usize),
    /// A `$`-delimited record did not split into the expected field count.
    Format,
    /// Digest name outside the supported set.
    UnsupportedDigest(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeySize(n) => {
                write!(f, "invalid key size {n}, expected 16, 24 or 32 bytes")
            }
            CryptoError::Padding => write!(f, "invalid PKCS#7 padding"),
            CryptoError::IvLength(n) => {
                write!(f, "IV length {n} is not a multiple of the block size")
            }
            CryptoError::Format => write!(f, "malformed hash parameter string"),
            CryptoError::UnsupportedDigest(name) => write!(f, "unsupported digest '{name}'"),
        }
    }
}

impl std::error::Error for CryptoError {}
