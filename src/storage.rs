//! # Persisted State
//!
//! Three small JSON documents under `STATE_DIR` survive restarts: the
//! tracked account list, the relayed post ids, and the per-account
//! bootstrap markers. Loads are shape-validated; a document that fails
//! to parse is logged and treated as absent rather than crashing the
//! process. Saves go through a temp file and rename so a crash mid-write
//! never leaves a torn document behind.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

const ACCOUNTS_FILE: &str = "accounts.json";
const SEEN_IDS_FILE: &str = "notified_ids.json";
const BOOTSTRAP_FILE: &str = "bootstrap.json";

enum ReadDoc<T> {
    Missing,
    Invalid,
    Parsed(T),
}

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `None` means no document exists yet (first launch), which is the
    /// caller's cue to fall back to the configured seed list. A document
    /// that exists but does not parse yields an empty list instead, so a
    /// corrupt file never silently re-seeds.
    pub fn load_accounts(&self) -> Option<Vec<String>> {
        match self.read_doc::<Vec<String>>(ACCOUNTS_FILE) {
            ReadDoc::Missing => None,
            ReadDoc::Invalid => Some(Vec::new()),
            ReadDoc::Parsed(v) => Some(v),
        }
    }

    pub fn load_seen_ids(&self) -> Vec<String> {
        match self.read_doc::<Vec<String>>(SEEN_IDS_FILE) {
            ReadDoc::Parsed(v) => v,
            _ => Vec::new(),
        }
    }

    pub fn load_bootstrap(&self) -> HashMap<String, bool> {
        match self.read_doc::<HashMap<String, bool>>(BOOTSTRAP_FILE) {
            ReadDoc::Parsed(v) => v,
            _ => HashMap::new(),
        }
    }

    pub fn save_accounts(&self, accounts: &[String]) -> anyhow::Result<()> {
        self.write_doc(ACCOUNTS_FILE, &accounts)
    }

    pub fn save_seen_ids(&self, ids: &[String]) -> anyhow::Result<()> {
        self.write_doc(SEEN_IDS_FILE, &ids)
    }

    pub fn save_bootstrap(&self, map: &HashMap<String, bool>) -> anyhow::Result<()> {
        self.write_doc(BOOTSTRAP_FILE, &map)
    }

    fn read_doc<T: DeserializeOwned>(&self, file: &str) -> ReadDoc<T> {
        let path = self.dir.join(file);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return ReadDoc::Missing,
        };
        match serde_json::from_str(&raw) {
            Ok(value) => ReadDoc::Parsed(value),
            Err(e) => {
                tracing::warn!(file, error = %e, "persisted document is malformed, starting from empty");
                ReadDoc::Invalid
            }
        }
    }

    fn write_doc<T: Serialize>(&self, file: &str, value: &T) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating state dir {}", self.dir.display()))?;
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        let json = serde_json::to_string_pretty(value).context("serializing state document")?;
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}
