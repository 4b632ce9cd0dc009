//! Cryptographic primitives: the AES core, block chaining modes, and the
//! password-based key derivation used by the record formats.

pub mod aes;
pub mod kdf;
pub mod modes;

pub use aes::Aes;
pub use kdf::{DigestAlg, hash_password, pbkdf2, rehash_password, verify_password};
pub use modes::{Mode, decrypt_data, encrypt_data};

use anyhow::{Result, anyhow};
use getrandom::fill;

/// Cipher block size in bytes (fixed 128-bit Rijndael block).
pub const BLOCK_LEN: usize = 16;
/// Length of the IV prepended to CBC output (one block).
pub const IV_LEN: usize = 16;
/// Default salt length for key derivation (32 bytes).
pub const SALT_LEN: usize = 32;
/// AES key length used for password records (256 bit).
pub const KEY_LEN: usize = 32;
/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 10_000;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| anyhow!("OS random generator unavailable"))
}
