//! Append-only ledger of claimed offer titles.
//!
//! Epistemic foundation:
//! - K_i: A title in the ledger is never claimed or notified again
//! - K_i: The file only grows; entries are never rewritten or removed
//! - B_i: Ledger file may not exist → created empty on open
//! - I^B: Crash mid-append → at worst a truncated final line, dropped on load

use crate::models::{FreebieError, Result};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Durable, ordered set of titles that have already been claimed.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    /// Titles in the order they were recorded
    order: Vec<String>,
    /// Fast membership lookup
    seen: HashSet<String>,
}

impl Ledger {
    /// Open the ledger at `path`, creating an empty file if absent.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| FreebieError::io("creating ledger dir", e))?;
        }

        if !path.exists() {
            File::create(path).map_err(|e| FreebieError::io("creating ledger", e))?;
            info!(path = %path.display(), "Created empty ledger");
        }

        let file = File::open(path).map_err(|e| FreebieError::io("opening ledger", e))?;
        let reader = BufReader::new(file);

        let mut ledger = Self {
            path: path.to_path_buf(),
            order: Vec::new(),
            seen: HashSet::new(),
        };

        for line in reader.lines() {
            let line = line.map_err(|e| FreebieError::io("reading ledger", e))?;
            let title = line.trim_end_matches('\r');
            if title.is_empty() {
                continue;
            }
            if ledger.seen.insert(title.to_string()) {
                ledger.order.push(title.to_string());
            }
        }

        info!(entries = ledger.order.len(), "Loaded ledger");
        Ok(ledger)
    }

    /// Check whether a title was already recorded.
    pub fn contains(&self, title: &str) -> bool {
        self.seen.contains(title) || self.seen.contains(&normalize(title))
    }

    /// Record a title: in-memory insert, then durable append.
    ///
    /// Returns `false` if the title was already present (nothing written).
    pub fn record(&mut self, title: &str) -> Result<bool> {
        let title = normalize(title);
        if title.is_empty() {
            return Err(FreebieError::InvalidInput(
                "cannot record an empty title".to_string(),
            ));
        }
        if self.seen.contains(&title) {
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| FreebieError::io("opening ledger for append", e))?;
        writeln!(file, "{title}").map_err(|e| FreebieError::io("appending to ledger", e))?;
        file.sync_data()
            .map_err(|e| FreebieError::io("syncing ledger", e))?;

        self.seen.insert(title.clone());
        self.order.push(title);
        debug!(entries = self.order.len(), "Ledger entry appended");
        Ok(true)
    }

    /// Titles in recording order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Titles are one line each; embedded line breaks would split an entry.
fn normalize(title: &str) -> String {
    title
        .split(['\n', '\r'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seen.txt");

        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.is_empty());
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_record_appends_one_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seen.txt");
        fs::write(&path, "Old Game\n").unwrap();

        let mut ledger = Ledger::open(&path).unwrap();
        assert!(ledger.contains("Old Game"));
        assert!(ledger.record("Free Sample").unwrap());

        assert_eq!(fs::read_to_string(&path).unwrap(), "Old Game\nFree Sample\n");
        assert!(ledger.contains("Free Sample"));
    }

    #[test]
    fn test_record_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seen.txt");

        let mut ledger = Ledger::open(&path).unwrap();
        assert!(ledger.record("Once").unwrap());
        assert!(!ledger.record("Once").unwrap());

        assert_eq!(fs::read_to_string(&path).unwrap(), "Once\n");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_reload_skips_blank_lines_and_keeps_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seen.txt");
        fs::write(&path, "B\n\nA\r\nB\n").unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.titles().collect::<Vec<_>>(), vec!["B", "A"]);
    }

    #[test]
    fn test_multiline_title_is_flattened() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seen.txt");

        let mut ledger = Ledger::open(&path).unwrap();
        ledger.record("Two\nLines").unwrap();
        assert!(ledger.contains("Two Lines"));

        let reloaded = Ledger::open(&path).unwrap();
        assert_eq!(reloaded.titles().collect::<Vec<_>>(), vec!["Two Lines"]);
    }

    #[test]
    fn test_empty_title_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut ledger = Ledger::open(&temp_dir.path().join("seen.txt")).unwrap();
        assert!(matches!(ledger.record("\n"), Err(FreebieError::InvalidInput(_))));
    }
}
