//! Append-only outcome ledgers.
//!
//! Each category keeps two on-disk forms under `lists/`: a line-oriented
//! text file appended on every outcome (authoritative, crash-safe), and a
//! JSON array rewritten by the periodic flusher for easy consumption.
//! The loaded `successful` set answers both resume subtraction and the
//! in-worker duplicate guard.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Successful,
    Failed,
    Exception,
    Blocked,
    Dropped,
    Curl7,
    Curl35,
    Curl56,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Successful,
        Category::Failed,
        Category::Exception,
        Category::Blocked,
        Category::Dropped,
        Category::Curl7,
        Category::Curl35,
        Category::Curl56,
    ];

    /// The four categories a unit terminates in. `Dropped` and the
    /// transport-code buckets are diagnostic supersets, not terminals.
    pub const TERMINAL: [Category; 4] = [
        Category::Successful,
        Category::Failed,
        Category::Exception,
        Category::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Successful => "successful",
            Category::Failed => "failed",
            Category::Exception => "exception",
            Category::Blocked => "blocked",
            Category::Dropped => "dropped",
            Category::Curl7 => "curl_7",
            Category::Curl35 => "curl_35",
            Category::Curl56 => "curl_56",
        }
    }
}

pub struct LedgerSet {
    dir: PathBuf,
    entries: Mutex<HashMap<Category, Vec<String>>>,
    successful_ids: Mutex<HashSet<String>>,
}

impl LedgerSet {
    /// Open (and create) the ledger directory, loading any text ledgers
    /// a previous run left behind.
    pub fn open(dir: PathBuf) -> Result<Self, HarvestError> {
        std::fs::create_dir_all(&dir)?;

        let mut entries = HashMap::new();
        for category in Category::ALL {
            let path = txt_path(&dir, category);
            let ids = if path.exists() {
                std::fs::read_to_string(&path)?
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            } else {
                Vec::new()
            };
            entries.insert(category, ids);
        }

        let successful_ids = entries
            .get(&Category::Successful)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        Ok(Self {
            dir,
            entries: Mutex::new(entries),
            successful_ids: Mutex::new(successful_ids),
        })
    }

    pub fn append(&self, category: Category, id: &str) -> Result<(), HarvestError> {
        {
            let mut entries = self.entries.lock().expect("ledger lock poisoned");
            entries.entry(category).or_default().push(id.to_string());
        }
        if category == Category::Successful {
            let mut successful = self.successful_ids.lock().expect("ledger lock poisoned");
            successful.insert(id.to_string());
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(txt_path(&self.dir, category))?;
        writeln!(file, "{id}")?;
        Ok(())
    }

    /// Duplicate guard: true once `id` has ever landed in `successful`,
    /// this run or a previous one.
    pub fn is_successful(&self, id: &str) -> bool {
        let successful = self.successful_ids.lock().expect("ledger lock poisoned");
        successful.contains(id)
    }

    pub fn successful_ids(&self) -> HashSet<String> {
        self.successful_ids
            .lock()
            .expect("ledger lock poisoned")
            .clone()
    }

    /// Rewrite the JSON array form of every category.
    pub fn flush_json(&self) -> Result<(), HarvestError> {
        let entries = {
            let entries = self.entries.lock().expect("ledger lock poisoned");
            entries.clone()
        };
        for (category, ids) in entries {
            let path = self.dir.join(format!("{}.json", category.as_str()));
            std::fs::write(path, serde_json::to_vec_pretty(&ids)?)?;
        }
        Ok(())
    }

    pub fn count(&self, category: Category) -> usize {
        let entries = self.entries.lock().expect("ledger lock poisoned");
        entries.get(&category).map(Vec::len).unwrap_or(0)
    }

    pub fn ids(&self, category: Category) -> Vec<String> {
        let entries = self.entries.lock().expect("ledger lock poisoned");
        entries.get(&category).cloned().unwrap_or_default()
    }

    pub fn txt_path_for(&self, category: Category) -> PathBuf {
        txt_path(&self.dir, category)
    }
}

fn txt_path(dir: &Path, category: Category) -> PathBuf {
    dir.join(format!("{}.txt", category.as_str()))
}

/// Persist the offending body or exception text for one unit under
/// `raw/{id}_raw.txt`.
pub fn write_raw_dump(raw_dir: &Path, id: &str, text: &str) -> Result<(), HarvestError> {
    std::fs::create_dir_all(raw_dir)?;
    // Unit ids are page ordinals or API record ids; keep the name safe
    // anyway in case an id carries a path separator.
    let safe: String = id
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    std::fs::write(raw_dir.join(format!("{safe}_raw.txt")), text)?;
    Ok(())
}
