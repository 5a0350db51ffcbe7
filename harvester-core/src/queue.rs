use std::collections::HashSet;
use std::path::PathBuf;

/// One unit of work: a page ordinal or a record id, the URL that fetches
/// it, and (list stage) the page dump the payload is mirrored into.
#[derive(Debug, Clone)]
pub struct Unit {
    pub id: String,
    pub url: String,
    pub dump_path: Option<PathBuf>,
}

/// The finite pending set: requested range minus everything already
/// completed. Order-insensitive for correctness, but kept in the order
/// the caller supplied so runs are predictable.
pub struct WorkQueue {
    pending: Vec<Unit>,
    done: HashSet<String>,
}

impl WorkQueue {
    pub fn new(requested: Vec<Unit>, completed: HashSet<String>) -> Self {
        let pending = requested
            .into_iter()
            .filter(|unit| !completed.contains(&unit.id))
            .collect();
        Self {
            pending,
            done: completed,
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &Unit> {
        self.pending.iter().filter(|unit| !self.done.contains(&unit.id))
    }

    pub fn mark_done(&mut self, id: &str) {
        self.done.insert(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.pending().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the remaining units to the dispatcher.
    pub fn into_pending(self) -> Vec<Unit> {
        let done = self.done;
        self.pending
            .into_iter()
            .filter(|unit| !done.contains(&unit.id))
            .collect()
    }
}
