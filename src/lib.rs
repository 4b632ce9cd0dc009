//! Password obfuscation and encryption built on a self-contained AES core.
//!
//! Two record schemes share a store:
//!
//! - `CE4` records reversibly obfuscate a password (base64 with random
//!   padding) so it is not readable at a glance but needs no secret.
//! - `CR5` records encrypt a password with AES-256-CBC under a key derived
//!   from a main password, and carry the derivation parameters so the key
//!   can be rebuilt from the main password alone.
//!
//! The cipher, chaining modes, and key derivation are implemented from
//! scratch in [`crypto`]; the record protocol lives in [`protect`]; the
//! persisted store in [`store`].

pub mod crypto;
mod error;
pub mod protect;
pub mod store;

pub use crate::crypto::{Aes, DigestAlg, Mode};
pub use crate::error::CryptoError;
pub use crate::protect::MainPassword;
pub use crate::store::PasswordStore;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Default location of the password store file.
pub fn default_store_path() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("", "", "pwcrypt").context("could not determine platform directories")?;
    Ok(project_dirs.data_dir().join("passwords.json"))
}
