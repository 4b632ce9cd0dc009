//! Persisted password store.
//!
//! Holds the "use main password" preference and the stored records, each a
//! `CE4`/`CR5` blob produced by [`crate::protect`]. The file itself is plain
//! serde_json; secrecy lives entirely in the per-record encoding, which is
//! what lets records be recoded one by one when the preference or the main
//! password changes.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::crypto::secure_random;
use crate::protect::pw_recode;

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct PasswordStore {
    use_main_password: bool,
    passwords: BTreeMap<String, String>,
}

impl PasswordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the store from `path`, or returns an empty store if the file
    /// does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read(path)
            .with_context(|| format!("failed to read store file {}", path.display()))?;
        serde_json::from_slice(&data).context("failed to parse store file")
    }

    /// Saves the store to `path` with an atomic replace.
    ///
    /// The data is written to a randomly named temporary file in the same
    /// directory, synced, and renamed over the target, so a crash leaves
    /// either the old or the new file, never a partial one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = random_tmp_path(path)?;
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;
        tmp_file.write_all(&data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = atomic_replace(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    pub fn use_main_password(&self) -> bool {
        self.use_main_password
    }

    pub fn set_use_main_password(&mut self, flag: bool) {
        self.use_main_password = flag;
    }

    /// Stores a record blob under `name`, replacing any previous one.
    pub fn set(&mut self, name: &str, record: String) {
        self.passwords.insert(name.to_string(), record);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.passwords.get(name).map(String::as_str)
    }

    /// Removes the record; returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.passwords.remove(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.passwords.keys()
    }

    pub fn len(&self) -> usize {
        self.passwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty()
    }

    /// Recodes every stored record for a main-password change.
    ///
    /// An empty password means the corresponding side does not use a main
    /// password. Records that fail to recode keep their old value; the
    /// names of those records are returned so the caller can warn.
    pub fn recode_all(&mut self, old_password: &str, new_password: &str) -> Vec<String> {
        let mut failed = Vec::new();
        for (name, record) in self.passwords.iter_mut() {
            let recoded = pw_recode(record, old_password, new_password);
            if recoded == *record && !record.is_empty() {
                failed.push(name.clone());
            } else {
                *record = recoded;
            }
        }
        failed
    }
}

fn random_tmp_path(path: &Path) -> Result<PathBuf> {
    let mut buf = [0u8; 8];
    secure_random(&mut buf)?;
    let suffix: String = buf.iter().map(|b| format!("{b:02x}")).collect();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    Ok(path.with_file_name(format!("{file_name}.tmp.{suffix}")))
}

/// Atomically replaces `target` with `tmp_path`.
///
/// Uses `ReplaceFileW` with write-through on Windows; on Unix a same-
/// directory `rename()` is already atomic.
#[cfg(target_os = "windows")]
fn atomic_replace(tmp_path: &Path, target: &Path) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

    if !target.exists() {
        fs::rename(tmp_path, target)?;
        return Ok(());
    }

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let target_w = to_wide(target.as_os_str());
    let tmp_w = to_wide(tmp_path.as_os_str());

    // SAFETY:
    // - Strings are valid UTF-16 and null-terminated
    // - Pointers remain valid during the call
    // - Windows does not retain the pointers after return
    let result = unsafe {
        ReplaceFileW(
            target_w.as_ptr(),
            tmp_w.as_ptr(),
            std::ptr::null(),
            REPLACEFILE_WRITE_THROUGH,
            std::ptr::null(),
            std::ptr::null(),
        )
    };

    if result == 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).context("atomic replace failed");
    }
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn atomic_replace(tmp_path: &Path, target: &Path) -> Result<()> {
    fs::rename(tmp_path, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protect::{pw_decode, pw_decrypt, pw_encode, pw_encrypt};
    use tempfile::tempdir;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passwords.json");

        let mut store = PasswordStore::new();
        store.set("mail", pw_encode("hunter2").unwrap());
        store.set_use_main_password(false);
        store.save(&path).unwrap();

        let loaded = PasswordStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!loaded.use_main_password());
        assert_eq!(pw_decode(loaded.get("mail").unwrap()), "hunter2");
    }

    #[test]
    fn load_of_missing_file_gives_empty_store() {
        let dir = tempdir().unwrap();
        let store = PasswordStore::load(&dir.path().join("missing.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn load_of_damaged_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passwords.json");
        fs::write(&path, b"not json").unwrap();
        assert!(PasswordStore::load(&path).is_err());
    }

    #[test]
    fn save_replaces_existing_file_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passwords.json");

        let mut store = PasswordStore::new();
        store.set("a", pw_encode("1").unwrap());
        store.save(&path).unwrap();
        store.set("b", pw_encode("2").unwrap());
        store.save(&path).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);

        let loaded = PasswordStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("passwords.json");
        PasswordStore::new().save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn remove_reports_existence() {
        let mut store = PasswordStore::new();
        store.set("a", pw_encode("1").unwrap());
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
    }

    #[test]
    fn recode_all_moves_records_to_the_encrypted_scheme() {
        let mut store = PasswordStore::new();
        store.set("mail", pw_encode("hunter2").unwrap());
        store.set("irc", pw_encode("swordfish").unwrap());

        let failed = store.recode_all("", "main");
        assert!(failed.is_empty());
        store.set_use_main_password(true);

        for name in ["mail", "irc"] {
            assert!(store.get(name).unwrap().starts_with("CR5"));
        }
        assert_eq!(
            pw_decrypt(store.get("mail").unwrap(), Some("main")),
            ("hunter2".to_string(), true)
        );
    }

    #[test]
    fn recode_all_reports_failures() {
        let mut store = PasswordStore::new();
        let (epw, _) = pw_encrypt("pw", Some("main"));
        store.set("mail", epw);

        let failed = store.recode_all("wrong", "other");
        assert_eq!(failed, vec!["mail".to_string()]);
        // record kept its old value and still decrypts with the old password
        assert_eq!(
            pw_decrypt(store.get("mail").unwrap(), Some("main")),
            ("pw".to_string(), true)
        );
    }
}
