//! Spam / deny / allow lists.
//!
//! Each list is a plain UTF-8 file, one entry per line; blank lines and lines
//! starting with `#` are ignored. Readers take a lock-free snapshot; reloads and
//! edits build a new snapshot and swap it in whole.

use std::{
    collections::BTreeSet,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListKind {
    Spam,
    Deny,
    Allow,
}

impl ListKind {
    pub const ALL: [ListKind; 3] = [ListKind::Spam, ListKind::Deny, ListKind::Allow];

    pub fn label(self) -> &'static str {
        match self {
            ListKind::Spam => "spam",
            ListKind::Deny => "deny",
            ListKind::Allow => "allow",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ListPaths {
    pub spam: PathBuf,
    pub deny: PathBuf,
    pub allow: PathBuf,
}

impl ListPaths {
    pub fn get(&self, kind: ListKind) -> &Path {
        match kind {
            ListKind::Spam => &self.spam,
            ListKind::Deny => &self.deny,
            ListKind::Allow => &self.allow,
        }
    }
}

/// One consistent view of all three lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListSnapshot {
    pub spam: BTreeSet<String>,
    pub deny: BTreeSet<String>,
    pub allow: BTreeSet<String>,
}

impl ListSnapshot {
    pub fn get(&self, kind: ListKind) -> &BTreeSet<String> {
        match kind {
            ListKind::Spam => &self.spam,
            ListKind::Deny => &self.deny,
            ListKind::Allow => &self.allow,
        }
    }

    fn get_mut(&mut self, kind: ListKind) -> &mut BTreeSet<String> {
        match kind {
            ListKind::Spam => &mut self.spam,
            ListKind::Deny => &mut self.deny,
            ListKind::Allow => &mut self.allow,
        }
    }
}

/// Parse list file contents: trim lines, skip blanks and `#` comments.
pub fn parse_list(contents: &str) -> BTreeSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Load a list file. A missing or unreadable file yields an empty list.
pub fn load_list(path: &Path) -> BTreeSet<String> {
    match fs::read_to_string(path) {
        Ok(contents) => parse_list(&contents),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "list file not found, using an empty list");
            BTreeSet::new()
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "failed to read list file, using an empty list"
            );
            BTreeSet::new()
        }
    }
}

pub struct ListStore {
    paths: ListPaths,
    current: ArcSwap<ListSnapshot>,
    // Serializes writers (reload/add/remove); readers never take it.
    writer: Mutex<()>,
}

impl ListStore {
    /// Load all three lists from disk.
    pub fn open(paths: ListPaths) -> Self {
        let snapshot = Self::read_all(&paths);
        Self::from_snapshot(paths, snapshot)
    }

    pub fn from_snapshot(paths: ListPaths, snapshot: ListSnapshot) -> Self {
        Self {
            paths,
            current: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<ListSnapshot> {
        self.current.load_full()
    }

    /// Re-read every list file and swap the result in atomically.
    pub fn reload(&self) -> Arc<ListSnapshot> {
        let _guard = self.lock_writer();
        let fresh = Arc::new(Self::read_all(&self.paths));
        self.current.store(fresh.clone());
        info!(
            spam = fresh.spam.len(),
            deny = fresh.deny.len(),
            allow = fresh.allow.len(),
            "lists reloaded"
        );
        fresh
    }

    /// Append `entry` to a list file and publish it.
    ///
    /// Returns `Ok(false)` when the entry is already present.
    pub fn add_entry(&self, kind: ListKind, entry: &str) -> Result<bool> {
        let entry = validate_entry(entry)?;
        let path = self.paths.get(kind);

        let _guard = self.lock_writer();
        let current = self.current.load_full();
        if current.get(kind).contains(entry) {
            return Ok(false);
        }

        append_line(path, entry)?;

        let mut next = ListSnapshot::clone(&current);
        next.get_mut(kind).insert(entry.to_string());
        self.current.store(Arc::new(next));
        info!(list = kind.label(), entry, "list entry added");
        Ok(true)
    }

    /// Drop every line equal to `entry` from a list file, keeping comments.
    ///
    /// Returns `Ok(false)` when the entry was not present.
    pub fn remove_entry(&self, kind: ListKind, entry: &str) -> Result<bool> {
        let entry = validate_entry(entry)?;
        let path = self.paths.get(kind);

        let _guard = self.lock_writer();
        let current = self.current.load_full();
        if !current.get(kind).contains(entry) {
            return Ok(false);
        }

        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let mut kept: Vec<&str> = contents
            .lines()
            .filter(|line| line.trim() != entry)
            .collect();
        kept.push("");
        fs::write(path, kept.join("\n"))?;

        let mut next = ListSnapshot::clone(&current);
        next.get_mut(kind).remove(entry);
        self.current.store(Arc::new(next));
        info!(list = kind.label(), entry, "list entry removed");
        Ok(true)
    }

    /// Poll the list files' mtimes and reload when any of them changes.
    pub fn spawn_watcher(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut last = store.modified_times();
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let now = store.modified_times();
                        if now != last {
                            info!("list files changed on disk, reloading");
                            last = now;
                            store.reload();
                        }
                    }
                }
            }
        })
    }

    fn modified_times(&self) -> [Option<SystemTime>; 3] {
        ListKind::ALL.map(|kind| {
            fs::metadata(self.paths.get(kind))
                .and_then(|md| md.modified())
                .ok()
        })
    }

    fn read_all(paths: &ListPaths) -> ListSnapshot {
        ListSnapshot {
            spam: load_list(&paths.spam),
            deny: load_list(&paths.deny),
            allow: load_list(&paths.allow),
        }
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn validate_entry(entry: &str) -> Result<&str> {
    let entry = entry.trim();
    if entry.is_empty() || entry.starts_with('#') {
        return Err(Error::Config(format!(
            "list entry must be non-empty and must not start with '#': {entry:?}"
        )));
    }
    Ok(entry)
}

fn append_line(path: &Path, entry: &str) -> Result<()> {
    let needs_newline = match fs::read(path) {
        Ok(bytes) => bytes.last().is_some_and(|b| *b != b'\n'),
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::ListFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_newline {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{entry}")?;
    Ok(())
}
