//! In-memory mock filesystem for testing collectors without real `/proc`.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// In-memory filesystem for testing.
///
/// A path holds either fixed content (`add_file`) or a sequence of contents
/// (`add_file_sequence`) where each read consumes one entry and the last entry
/// is returned forever after. Sequences model counters such as `/proc/stat`
/// that advance between two reads.
#[derive(Debug, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Map from path to successive contents.
    sequences: Mutex<HashMap<PathBuf, VecDeque<String>>>,
    /// Set of directories.
    directories: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds a file whose content changes on every read.
    pub fn add_file_sequence<I, S>(&mut self, path: impl AsRef<Path>, contents: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        let queue: VecDeque<String> = contents.into_iter().map(Into::into).collect();
        self.sequences
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path, queue);
    }

    /// Removes a file so subsequent reads fail with `NotFound`.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.files.remove(path);
        self.sequences
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(path);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    fn next_in_sequence(&self, path: &Path) -> Option<String> {
        let mut sequences = self
            .sequences
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let queue = sequences.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        if let Some(content) = self.next_in_sequence(path) {
            return Ok(content);
        }
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
            || self.directories.contains(path)
            || self
                .sequences
                .lock()
                .map(|s| s.contains_key(path))
                .unwrap_or(false)
    }
}
