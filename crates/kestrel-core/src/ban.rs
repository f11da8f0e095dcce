//! Blocked-sender gate backed by a reloadable list.
//!
//! The list is line oriented: one account id per line, blank lines and lines
//! starting with `#` are ignored, and a single trailing `;` is tolerated.
//!
//! ```text
//! # spammers
//! 123456789
//! 987654321;
//! ```

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::BanListError;

/// Notice sent to a banned sender whose message matched a handler.
pub const DEFAULT_BAN_NOTICE: &str = "you are banned server";

// ============================================================================
// Sources
// ============================================================================

/// Where the ban list text comes from.
pub trait BanListSource: Send + Sync + 'static {
    /// Reads the complete list text.
    fn read(&self) -> Result<String, BanListError>;

    /// A human-readable description for logs.
    fn describe(&self) -> String;
}

/// A ban list stored in a file, created empty when missing.
#[derive(Debug, Clone)]
pub struct FileBanList {
    path: PathBuf,
}

impl FileBanList {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> BanListError {
        BanListError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl BanListSource for FileBanList {
    fn read(&self) -> Result<String, BanListError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if let Some(parent) = self.path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
                }
                fs::write(&self.path, "").map_err(|e| self.io_error(e))?;
                info!(path = %self.path.display(), "Created empty ban list");
                Ok(String::new())
            }
            Err(err) => Err(self.io_error(err)),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// An in-memory ban list whose contents can be replaced.
#[derive(Debug, Clone, Default)]
pub struct StaticBanList {
    text: Arc<RwLock<String>>,
}

impl StaticBanList {
    /// Creates a source holding `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Arc::new(RwLock::new(text.into())),
        }
    }

    /// Creates a source banning exactly `ids`.
    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let text = ids
            .into_iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(text)
    }

    /// Replaces the list text seen by the next reload.
    pub fn set(&self, text: impl Into<String>) {
        *self.text.write() = text.into();
    }
}

impl BanListSource for StaticBanList {
    fn read(&self) -> Result<String, BanListError> {
        Ok(self.text.read().clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses ban list text into a set of account ids.
///
/// Lines that are not a positive integer are skipped with a warning naming
/// the 1-based line number.
pub fn parse_ban_list(text: &str) -> HashSet<i64> {
    let mut ids = HashSet::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = line.strip_suffix(';').unwrap_or(line).trim();

        match entry.parse::<i64>() {
            Ok(id) if id > 0 => {
                ids.insert(id);
            }
            _ => warn!(line = idx + 1, entry = %entry, "Invalid ban list entry"),
        }
    }

    ids
}

// ============================================================================
// Ban Gate
// ============================================================================

/// Membership check against the current ban set.
///
/// Readers always observe a complete set: [`reload`](Self::reload) builds the
/// replacement before swapping it in.
pub struct BanGate {
    source: Box<dyn BanListSource>,
    banned: RwLock<Arc<HashSet<i64>>>,
    notice: String,
}

impl BanGate {
    /// Loads the initial set from `source`.
    pub fn load(source: impl BanListSource) -> Result<Self, BanListError> {
        let gate = Self::unloaded(source);
        gate.reload()?;
        Ok(gate)
    }

    /// Like [`load`](Self::load), but an unreadable source leaves the gate
    /// empty until a later [`reload`](Self::reload) succeeds.
    pub fn new(source: impl BanListSource) -> Self {
        let gate = Self::unloaded(source);
        if let Err(err) = gate.reload() {
            warn!(error = %err, "Starting with an empty ban list");
        }
        gate
    }

    fn unloaded(source: impl BanListSource) -> Self {
        Self {
            source: Box::new(source),
            banned: RwLock::new(Arc::new(HashSet::new())),
            notice: DEFAULT_BAN_NOTICE.to_string(),
        }
    }

    /// A gate that bans nobody and has nothing to reload.
    pub fn empty() -> Self {
        Self::unloaded(StaticBanList::default())
    }

    /// Overrides the notice sent to banned senders.
    pub fn notice_text(mut self, notice: impl Into<String>) -> Self {
        self.notice = notice.into();
        self
    }

    /// Returns `true` if `sender_id` is banned. Ids `<= 0` never are.
    pub fn is_banned(&self, sender_id: i64) -> bool {
        sender_id > 0 && self.banned.read().contains(&sender_id)
    }

    /// Re-reads the source and swaps in the new set.
    ///
    /// On failure the previous set stays in effect. Returns the new set size.
    pub fn reload(&self) -> Result<usize, BanListError> {
        let text = self.source.read().inspect_err(|err| {
            warn!(source = %self.source.describe(), error = %err, "Ban list reload failed");
        })?;
        let next = Arc::new(parse_ban_list(&text));
        let count = next.len();

        *self.banned.write() = next;
        info!(source = %self.source.describe(), count, "Ban list loaded");
        Ok(count)
    }

    /// The notice sent to banned senders.
    pub fn notice(&self) -> &str {
        &self.notice
    }

    /// The current set. Later reloads do not affect the returned value.
    pub fn snapshot(&self) -> Arc<HashSet<i64>> {
        Arc::clone(&self.banned.read())
    }

    /// Number of banned ids.
    pub fn len(&self) -> usize {
        self.banned.read().len()
    }

    /// Returns `true` if nobody is banned.
    pub fn is_empty(&self) -> bool {
        self.banned.read().is_empty()
    }
}

impl Default for BanGate {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for BanGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BanGate")
            .field("source", &self.source.describe())
            .field("banned", &self.len())
            .field("notice", &self.notice)
            .finish()
    }
}
